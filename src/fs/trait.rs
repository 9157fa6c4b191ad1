//! FileSystem trait definition

use anyhow::Result;
use std::path::{Path, PathBuf};

/// Abstraction over the file reads the transformation performs.
///
/// Env files and bind-mounted sources are only ever read through this trait, so
/// tests can feed them from memory.
pub trait FileSystem: Send + Sync {
    /// Check if a path exists
    fn exists(&self, path: &Path) -> bool;

    /// Check if path is a regular file
    fn is_file(&self, path: &Path) -> bool;

    /// Read file contents as string
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Read the first line without its terminator; `None` for an empty file
    fn read_first_line(&self, path: &Path) -> Result<Option<String>>;

    /// Resolve `path` against `base` unless it is already absolute
    fn resolve(&self, base: &Path, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            base.join(candidate)
        }
    }
}
