//! Storage models.

use std::path::{Path, PathBuf};
use time::UtcDateTime;

/// File metadata returned by storage backends.
///
/// Used when listing a backend (e.g. sweeping the cache directory) and when
/// asking about a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Relative path from storage root
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub modified: UtcDateTime,
}
impl FileInfo {
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: UtcDateTime) -> Self {
        Self { path: path.into(), size, modified }
    }

    /// The final component of the path, which is what derived artifacts are
    /// named after.
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
