//! In-memory storage backend for testing.

use super::FileInfoStream;
use crate::error::{ErrorKind, Result};
use crate::path::validate as validate_path;
use crate::{FileInfo, StorageBackend};
use async_stream::stream;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use time::UtcDateTime;
use tokio::sync::RwLock;

/// In-memory storage backend for testing.
///
/// Files are kept in a `HashMap` behind a [`RwLock`]. Individual paths can be
/// marked as undeletable, and listing can be made to fail, so callers can
/// exercise their partial-failure handling.
///
/// # Examples
///
/// ```
/// use addons_storage::backend::{MockBackend, StorageBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([
///     ("100--tux.png", b"png"),
/// ]);
/// assert!(backend.exists(Path::new("100--tux.png")).await?);
///
/// backend.write(Path::new("cache_graph_downloads.json"), b"{}").await?;
/// assert!(backend.exists(Path::new("cache_graph_downloads.json")).await?);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    storage: RwLock<HashMap<PathBuf, (UtcDateTime, Vec<u8>)>>,
    undeletable: HashSet<PathBuf>,
    failing_list: bool,
}

impl MockBackend {
    /// Create a mock backend pre-populated with files.
    ///
    /// Panics if any path fails validation.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let now = UtcDateTime::now();
        let map = files.into_iter().map(|(path, data)| (Self::checked(path.into()), (now, data.into()))).collect();
        Self {
            name: "mock".to_string(),
            storage: RwLock::new(map),
            undeletable: HashSet::new(),
            failing_list: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Make deleting any of `paths` fail with a backend error. The files stay
    /// readable.
    ///
    /// ```
    /// use addons_storage::backend::{MockBackend, StorageBackend};
    /// use std::path::Path;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let backend = MockBackend::with_files([("75--tux.png", b"png")]).with_failing_deletes(["75--tux.png"]);
    /// assert!(backend.delete(Path::new("75--tux.png")).await.is_err());
    /// # }
    /// ```
    pub fn with_failing_deletes(mut self, paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.undeletable.extend(paths.into_iter().map(|path| Self::checked(path.into())));
        self
    }

    /// Make every listing fail, as an unreadable storage root would.
    pub fn with_failing_list(mut self) -> Self {
        self.failing_list = true;
        self
    }

    fn checked(path: PathBuf) -> PathBuf {
        match validate_path(&path) {
            Ok(validated) => validated,
            // Tests with a broken setup should not get as far as asserting.
            Err(_) => panic!("MockBackend: invalid path {}", path.display()),
        }
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        if self.failing_list {
            let err = exn::Exn::from(ErrorKind::BackendError(format!("{}: listing unavailable", self.name)));
            return Box::pin(futures::stream::once(async { Err(err) }));
        }
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };

        Box::pin(stream! {
            // Snapshot under the read lock; never hold it across a yield.
            let entries: Vec<FileInfo> = {
                let guard = self.storage.read().await;
                guard
                    .iter()
                    .filter(|(path, _)| validated_prefix.as_ref().is_none_or(|pfx| path.starts_with(pfx)))
                    .map(|(path, (inserted, data))| FileInfo::new(path.clone(), data.len() as u64, *inserted))
                    .collect()
            };
            for info in entries {
                yield Ok(info);
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        Ok(self.storage.read().await.contains_key(&path))
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let path = validate_path(path)?;
        self.storage.write().await.insert(path, (UtcDateTime::now(), data.to_vec()));
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let path = validate_path(path)?;
        if self.undeletable.contains(&path) {
            exn::bail!(ErrorKind::BackendError(format!("{}: refusing to delete {}", self.name, path.display())));
        }
        self.storage.write().await.remove(&path).map(|_| ()).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))
    }
}
