//! Local filesystem storage backend.
//!
//! Files live under a configured root directory and are accessed through
//! `tokio::fs`.

use crate::backend::FileInfoStream;
use crate::error::{ErrorKind, Result};
use crate::{FileInfo, StorageBackend, path::validate as validate_path};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use std::fs::{Metadata, create_dir_all as sync_create_dir};
use std::path::{Path, PathBuf};
use tokio::fs::{self, DirEntry};

enum WalkEntry {
    File(FileInfo),
    Descend(PathBuf),
    Skip,
}

/// Local filesystem storage backend.
///
/// # Examples
///
/// ```no_run
/// use addons_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let cache = LocalBackend::new("cache", "/srv/addons/cache")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalBackend {
    name: String,
    root: PathBuf,
}
impl LocalBackend {
    /// Create a new local filesystem backend rooted at `root`.
    ///
    /// The root must be absolute. It is created if it doesn't exist yet, and
    /// rejected if it exists but isn't a directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Runs once, at startup.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root))?;
        }
        Ok(Self { name: name.into(), root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(path.as_ref())?;
        Ok(self.root.join(validated))
    }

    fn relative_path(&self, absolute: impl AsRef<Path>) -> Result<PathBuf> {
        let absolute = absolute.as_ref();
        let relative = absolute.strip_prefix(&self.root).or_raise(|| {
            ErrorKind::BackendError(format!("path `{}` is not within root `{}`", absolute.display(), self.root.display()))
        })?;
        validate_path(relative)
    }

    fn metadata(path: &Path, metadata: Metadata) -> Result<FileInfo> {
        let modified = metadata.modified().map_err(ErrorKind::Io)?.into();
        Ok(FileInfo::new(path, metadata.len(), modified))
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    /// Pulled out of the stream loop below so that `?` can be used; inside
    /// `stream!` every error has to be converted and yielded by hand.
    async fn process_entry(&self, entry: DirEntry, prefix: Option<&Path>) -> Result<WalkEntry> {
        let path = entry.path();
        let metadata = entry.metadata().await.map_err(|e| Self::map_io_error(e, &path))?;
        let relative = self.relative_path(&path)?;
        if metadata.is_dir() {
            // Keep descending while the directory could still contain matches.
            return Ok(match prefix {
                Some(pfx) if !relative.starts_with(pfx) && !pfx.starts_with(&relative) => WalkEntry::Skip,
                _ => WalkEntry::Descend(path),
            });
        }
        if let Some(pfx) = prefix
            && !relative.starts_with(pfx)
        {
            return Ok(WalkEntry::Skip);
        }
        if metadata.is_file() {
            return Ok(WalkEntry::File(Self::metadata(&relative, metadata)?));
        }
        // Broken symlinks and other oddities are dropped.
        Ok(WalkEntry::Skip)
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };
        let mut stack = vec![self.root.clone()];

        Box::pin(stream! {
            'dirs: while let Some(current) = stack.pop() {
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    // A directory that vanished mid-walk (or a cache root
                    // nobody has written to yet) is just empty.
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(err) => {
                        yield Err(exn::Exn::from(Self::map_io_error(err, &current)));
                        continue 'dirs;
                    }
                };
                'entries: loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break 'entries,
                        Err(e) => { yield Err(exn::Exn::from(Self::map_io_error(e, &current))); continue 'entries; },
                    };
                    match self.process_entry(entry, validated_prefix.as_deref()).await {
                        Ok(WalkEntry::File(f)) => yield Ok(f),
                        Ok(WalkEntry::Descend(d)) => stack.push(d),
                        Ok(WalkEntry::Skip) => {},
                        Err(e) => yield Err(e),
                    };
                }
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::try_exists(&abs_path).await.map_err(ErrorKind::Io)?)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        if let Some(parent) = abs_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, path))?;
        }
        Ok(fs::write(&abs_path, data).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::remove_file(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> (tempfile::TempDir, LocalBackend) {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("cache", temp_dir.path()).unwrap();
        (temp_dir, backend)
    }

    #[test]
    fn test_new_requires_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalBackend::new("cache", temp_dir.path()).is_ok());
        assert!(LocalBackend::new("cache", "relative/cache").is_err());
    }

    #[test]
    fn test_new_creates_missing_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("nested/cache");
        let backend = LocalBackend::new("cache", &root).unwrap();
        assert!(root.is_dir());
        assert_eq!(backend.root(), root);
    }

    #[test]
    fn test_new_rejects_file_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();
        assert!(LocalBackend::new("cache", &file).is_err());
    }

    #[test]
    fn test_relative_path() {
        let (temp_dir, backend) = backend();
        let abs = temp_dir.path().join("images/100--tux.png");
        assert_eq!(backend.relative_path(&abs).unwrap(), Path::new("images/100--tux.png"));
        assert!(backend.relative_path("/somewhere/else.png").is_err());
    }

    #[tokio::test]
    async fn test_write_creates_parents() {
        let (temp_dir, backend) = backend();
        backend.write(Path::new("images/300--tux.png"), b"png bytes").await.unwrap();
        assert_eq!(std::fs::read(temp_dir.path().join("images/300--tux.png")).unwrap(), b"png bytes");
        assert!(backend.exists(Path::new("./images/300--tux.png")).await.unwrap());
        let files = backend.list(Some(Path::new("images"))).await.unwrap();
        assert_eq!(files[0].path, PathBuf::from("images/300--tux.png"));
        assert_eq!(files[0].size, 9);
    }

    #[tokio::test]
    async fn test_delete() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("25--tux.png"), b"data").await.unwrap();
        backend.delete(Path::new("25--tux.png")).await.unwrap();
        assert!(!backend.exists(Path::new("25--tux.png")).await.unwrap());
        let err = backend.delete(Path::new("25--tux.png")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_walks_subdirectories() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("100--tux.png"), b"a").await.unwrap();
        backend.write(Path::new("karts/75--tux.png"), b"b").await.unwrap();
        backend.write(Path::new("karts/deep/25--tux.png"), b"c").await.unwrap();
        let mut paths: Vec<_> = backend.list(None).await.unwrap().into_iter().map(|f| f.path).collect();
        paths.sort();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("100--tux.png"),
                PathBuf::from("karts/75--tux.png"),
                PathBuf::from("karts/deep/25--tux.png"),
            ]
        );
    }

    #[tokio::test]
    async fn test_list_with_prefix() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("karts/tux.png"), b"a").await.unwrap();
        backend.write(Path::new("kartsextra/tux.png"), b"b").await.unwrap();
        backend.write(Path::new("tracks/snow.png"), b"c").await.unwrap();
        let files = backend.list(Some(Path::new("karts"))).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, PathBuf::from("karts/tux.png"));
        assert!(backend.list(Some(Path::new("arenas"))).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_path_security() {
        let (_temp_dir, backend) = backend();
        assert!(backend.exists(Path::new("../etc/passwd")).await.is_err());
        assert!(backend.write(Path::new("../escape.png"), b"data").await.is_err());
        assert!(backend.delete(Path::new("images/../../file")).await.is_err());
    }
}
