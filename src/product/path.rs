// src/product/path.rs

//! Lexical path normalization for file products.

use std::path::{Component, Path, PathBuf};

/// Resolve `path` against `root` and normalize it without touching the
/// filesystem.
///
/// Products usually do not exist yet at render time, so `canonicalize` is
/// not an option. `.` components are dropped and `..` pops the previous
/// component (never above the filesystem root).
pub fn absolutize(root: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
