//! Storage backend trait and implementations.
//!
//! The catalog only ever needs a handful of operations from a backend: sweep
//! a directory, drop files, and write the occasional derived artifact. The
//! local filesystem is the only production backend; [`MockBackend`] exists
//! for tests in this and downstream crates.

mod local;
#[cfg(feature = "mock")]
mod mock;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
use crate::FileInfo;
use crate::error::Result;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::path::Path;
use std::pin::Pin;

pub(crate) type FileInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<FileInfo>> + Send + 'a>>;

/// Unified interface for storage backends.
///
/// # Path Handling
/// All paths are relative to the storage root and are validated with
/// [`validate_path`](crate::validate_path) by every implementation before use.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use addons_storage::{backend::StorageBackend, error::Result};
///
/// async fn cached_bytes(backend: &dyn StorageBackend) -> Result<u64> {
///     let mut total = 0;
///     for info in backend.list(None).await? {
///         total += info.size;
///     }
///     Ok(total)
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend, used for logging only.
    fn name(&self) -> &str;

    /// List all files matching an optional prefix.
    ///
    /// Collects [`list_stream()`](Self::list_stream) into a [`Vec`].
    async fn list(&self, prefix: Option<&Path>) -> Result<Vec<FileInfo>> {
        self.list_stream(prefix).try_collect().await
    }

    /// Stream file metadata matching an optional prefix.
    ///
    /// Only files are yielded, never directories. The prefix is matched
    /// component-wise, so `images/kart` matches `images/kart/tux.png` but not
    /// `images/karts/tux.png`. A prefix that doesn't exist yields nothing.
    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a>;

    /// Check if a file exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Write file contents, creating parent directories as needed and
    /// overwriting anything already there.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Delete a file.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn delete(&self, path: &Path) -> Result<()>;
}
