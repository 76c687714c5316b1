//! Index of derived artifacts (resized preview images and the like).
//!
//! The index is advisory. A row asserts that a derived file *should* exist
//! under the cache root; the image-serving path regenerates anything that has
//! gone missing. Population and lookup therefore never fail loudly: storage
//! faults are logged and reported as "not recorded" or "not found".

mod path;

pub use self::path::{ImageSize, ImageSource, cache_path, cache_prefix};
use crate::Database;
use crate::addon::AddonId;
use crate::error::{ErrorKind, Result};
use crate::models::CacheRow;
use addons_storage::BackendHandle;
use exn::ResultExt;
use regex::Regex;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// One derived file known to the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Path relative to the cache root.
    pub file: String,
    /// Add-on the file was derived from, if any.
    pub addon: Option<AddonId>,
    /// Free-form generation parameters, e.g. `w=100,h=75`.
    pub props: Option<String>,
}

/// The cache table plus the storage backend holding the files it describes.
#[derive(Clone)]
pub struct CacheIndex {
    pool: SqlitePool,
    backend: BackendHandle,
}

impl CacheIndex {
    pub fn new(db: &Database, backend: BackendHandle) -> Self {
        Self { pool: db.pool().clone(), backend }
    }

    pub fn backend(&self) -> &BackendHandle {
        &self.backend
    }

    fn kept_on_disk(keep: &Regex, file: &Path) -> bool {
        file.file_name().is_some_and(|name| keep.is_match(&name.to_string_lossy()))
    }

    /// Record that `file` has been generated. Recording a file twice replaces
    /// the earlier entry; an owner that isn't a known add-on is stored as no
    /// owner at all.
    ///
    /// Returns `false` (and logs) if the entry could not be written.
    #[instrument(skip(self))]
    pub async fn record(&self, file: &str, addon: Option<&AddonId>, props: Option<&str>) -> bool {
        let result = sqlx::query(include_str!("../../queries/upsert_cache_entry.sql"))
            .bind(file)
            .bind(addon.map(AddonId::as_str))
            .bind(props)
            .execute(&self.pool)
            .await;
        match result {
            Ok(_) => true,
            Err(e) => {
                warn!(file, error = %e, "Could not record cache entry");
                false
            },
        }
    }

    /// Write a derived file to the cache root and record it.
    #[instrument(skip(self, data), fields(size = data.len()))]
    pub async fn store(&self, file: &str, data: &[u8], addon: Option<&AddonId>, props: Option<&str>) -> bool {
        if let Err(e) = self.backend.write(Path::new(file), data).await {
            warn!(backend = self.backend.name(), file, error = %e, "Could not write cached file");
            return false;
        }
        self.record(file, addon, props).await
    }

    /// The entry for `file`, or `None` if there is none *or* the lookup
    /// failed.
    pub async fn lookup(&self, file: &str) -> Option<CacheEntry> {
        let row: Option<CacheRow> = match sqlx::query_as(include_str!("../../queries/get_cache_entry.sql"))
            .bind(file)
            .fetch_optional(&self.pool)
            .await
        {
            Ok(row) => row,
            Err(e) => {
                warn!(file, error = %e, "Cache lookup failed; treating as a miss");
                return None;
            },
        };
        match row.map(CacheEntry::try_from).transpose() {
            Ok(entry) => entry,
            Err(e) => {
                warn!(file, error = %e, "Unreadable cache entry; treating as a miss");
                None
            },
        }
    }

    /// Entries derived from `addon`.
    pub async fn entries_for(&self, addon: &AddonId) -> Result<Vec<CacheEntry>> {
        let rows: Vec<CacheRow> = sqlx::query_as(include_str!("../../queries/get_cache_entries_for_addon.sql"))
            .bind(addon.as_str())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Persistence)?;
        rows.into_iter().map(CacheEntry::try_from).collect()
    }

    /// Every entry in the index.
    pub async fn entries(&self) -> Result<Vec<CacheEntry>> {
        let rows: Vec<CacheRow> = sqlx::query_as(include_str!("../../queries/list_cache_entries.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Persistence)?;
        rows.into_iter().map(CacheEntry::try_from).collect()
    }

    /// Delete `file` from disk (if it is still there) and from the index.
    #[instrument(skip(self))]
    pub async fn remove(&self, file: &str) -> bool {
        match self.backend.delete(Path::new(file)).await {
            Ok(()) => {},
            Err(e) if e.is_not_found() => debug!(file, "Cached file already gone"),
            Err(e) => {
                warn!(
                    backend = self.backend.name(),
                    file,
                    retryable = e.is_retryable(),
                    error = %e,
                    "Could not delete cached file"
                );
                return false;
            },
        }
        if let Err(e) = self.delete_row(file).await {
            warn!(file, error = %e, "Could not remove cache entry");
            return false;
        }
        true
    }

    async fn delete_row(&self, file: &str) -> Result<()> {
        sqlx::query(include_str!("../../queries/delete_cache_entry.sql"))
            .bind(file)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Persistence)?;
        Ok(())
    }

    /// Where to serve `image` at `size` from. An indexed file that is no
    /// longer on disk is generated again.
    pub async fn resolve(&self, image: &str, size: Option<ImageSize>) -> ImageSource {
        let target = cache_path(image, size);
        let Some(entry) = self.lookup(&target).await else {
            return ImageSource::Generate { source: image.to_string(), target };
        };
        match self.backend.exists(Path::new(&entry.file)).await {
            Ok(true) => ImageSource::Cached(entry.file),
            Ok(false) => {
                debug!(file = %entry.file, "Indexed file missing from disk");
                ImageSource::Generate { source: image.to_string(), target }
            },
            Err(e) => {
                warn!(backend = self.backend.name(), file = %entry.file, error = %e, "Could not check cached file");
                ImageSource::Generate { source: image.to_string(), target }
            },
        }
    }

    /// Delete every cached file whose name does not match `keep`, then every
    /// index row whose path does not match `keep`.
    ///
    /// If the filesystem step fails the index is left untouched and
    /// [`ErrorKind::CacheClear`] is returned; files deleted before the
    /// failure stay deleted.
    #[instrument(skip(self, keep), fields(keep = keep.as_str()))]
    pub async fn invalidate_all(&self, keep: &Regex) -> Result<()> {
        let files = self.backend.list(None).await.or_raise(|| ErrorKind::CacheClear)?;
        let mut removed_files = 0usize;
        for file in files {
            if Self::kept_on_disk(keep, file.path()) {
                continue;
            }
            match self.backend.delete(file.path()).await {
                Ok(()) => removed_files += 1,
                // Lost a race with another clear; the outcome is the same.
                Err(e) if e.is_not_found() => {},
                Err(e) => return Err(e).or_raise(|| ErrorKind::CacheClear),
            }
        }

        let entries = self.entries().await?;
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Persistence)?;
        let mut removed_rows = 0usize;
        for entry in entries.iter().filter(|entry| !keep.is_match(&entry.file)) {
            sqlx::query(include_str!("../../queries/delete_cache_entry.sql"))
                .bind(&entry.file)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Persistence)?;
            removed_rows += 1;
        }
        tx.commit().await.or_raise(|| ErrorKind::Persistence)?;
        info!(backend = self.backend.name(), removed_files, removed_rows, "Cleared cache");
        Ok(())
    }

    /// Delete every derived file of `addon`, each file before its index row.
    ///
    /// Returns `false` if the add-on is unknown, or if anything fails. On a
    /// failure the entry being processed keeps its row, and entries already
    /// processed stay removed. A file that is already missing counts as
    /// deleted.
    #[instrument(skip(self, addon), fields(addon = %addon))]
    pub async fn invalidate_addon(&self, addon: &AddonId) -> bool {
        match self.try_invalidate_addon(addon).await {
            Ok(done) => done,
            Err(e) => {
                warn!(error = %e, "Could not clear add-on cache");
                false
            },
        }
    }

    async fn try_invalidate_addon(&self, addon: &AddonId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(include_str!("../../queries/addon_exists.sql"))
            .bind(addon.as_str())
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Persistence)?;
        if !exists {
            debug!("Unknown add-on; nothing to clear");
            return Ok(false);
        }
        let entries = self.entries_for(addon).await?;
        for entry in &entries {
            match self.backend.delete(Path::new(&entry.file)).await {
                Ok(()) => {},
                Err(e) if e.is_not_found() => debug!(file = %entry.file, "Cached file already gone"),
                Err(e) => {
                    warn!(
                        backend = self.backend.name(),
                        file = %entry.file,
                        retryable = e.is_retryable(),
                        error = %e,
                        "Could not delete cached file"
                    );
                    return Ok(false);
                },
            }
            self.delete_row(&entry.file).await?;
        }
        info!(removed = entries.len(), "Cleared add-on cache");
        Ok(true)
    }
}
