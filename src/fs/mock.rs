// src/fs/mock.rs

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::FileSystem;

/// In-memory filesystem for tests.
///
/// Only tracks which files exist. Paths are compared verbatim, so tests
/// should register the same absolute paths the DAG resolves products to.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashSet<PathBuf>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl AsRef<Path>) {
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.insert(path.as_ref().to_path_buf());
    }

    pub fn remove_file(&self, path: impl AsRef<Path>) -> bool {
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.remove(path.as_ref())
    }
}

impl FileSystem for MockFileSystem {
    fn exists(&self, path: &Path) -> io::Result<bool> {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        Ok(files.contains(path) || files.iter().any(|f| f.starts_with(path)))
    }
}
