// src/fs/mod.rs

//! Filesystem access used to check whether file products exist.

use std::fmt::Debug;
use std::io;
use std::path::Path;

pub mod mock;

/// The part of a filesystem the build needs: existence checks on absolute
/// product paths.
pub trait FileSystem: Send + Sync + Debug {
    /// `Ok(false)` for a path that is definitely absent; `Err` when it
    /// cannot be determined (e.g. permission denied on a parent).
    fn exists(&self, path: &Path) -> io::Result<bool>;
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn exists(&self, path: &Path) -> io::Result<bool> {
        path.try_exists()
    }
}
