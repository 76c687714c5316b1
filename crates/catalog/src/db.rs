//! Database connection and pool management.

use exn::ResultExt;
use sqlx::SqliteConnection;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

use crate::error::{ErrorKind, Result};

/// Embedded schema, applied on connect.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
// Moderation is low traffic; a handful of readers is plenty.
const MAX_CONNECTIONS: u32 = 4;

/// Connection pool for the catalog database.
///
/// Holds add-ons, their revisions and the cache index. Both [`Catalog`] and
/// [`CacheIndex`] are built from it and share the same pool.
///
/// [`Catalog`]: crate::Catalog
/// [`CacheIndex`]: crate::CacheIndex
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    async fn new(options: SqliteConnectOptions, max: Option<u32>) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            // Query-based PRAGMAs must be applied to every pooled connection,
            // not just the first one.
            .after_connect(|conn, meta| Box::pin(async move { Self::apply_pragmas(conn, meta).await }))
            .max_connections(max.unwrap_or(MAX_CONNECTIONS))
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Persistence)?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Connect to the catalog database at the given path.
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let options = Self::base_options().filename(path.as_ref()).create_if_missing(true);
        Self::new(options, None).await
    }

    /// Connect to an in-memory database.
    ///
    /// Not gated behind `#[cfg(test)]` so that downstream crates can use it in
    /// their own tests. Limited to a single connection, otherwise each pooled
    /// connection would see its own empty database.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = Self::base_options().filename(":memory:");
        Self::new(options, Some(1)).await
    }

    fn base_options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .journal_mode(SqliteJournalMode::Wal)
            // Cascading revision deletes and the cache's ON DELETE SET NULL
            // depend on this.
            .foreign_keys(true)
            .synchronous(SqliteSynchronous::Normal)
            // Status updates take the write lock for the length of a
            // transaction; give concurrent writers a moment before SQLITE_BUSY.
            .busy_timeout(Duration::from_millis(1500))
    }

    /// PRAGMAs that aren't exposed through `SqliteConnectOptions`.
    async fn apply_pragmas(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
        sqlx::query(
            r#"
                PRAGMA wal_autocheckpoint = 800;
                PRAGMA temp_store = MEMORY;
                PRAGMA analysis_limit = 1000;
            "#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Run database migrations. Called automatically on connect.
    #[instrument("performing database migrations", skip(self))]
    async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.or_raise(|| ErrorKind::Migration)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool, waiting for checked-out connections to come back.
    pub async fn close(&self) {
        // Let SQLite update query planner statistics.
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_in_memory() {
        let db = Database::connect_in_memory().await.unwrap();
        assert!(!db.pool().is_closed());
        db.close().await;
        assert!(db.pool().is_closed());
    }

    #[tokio::test]
    async fn test_connect_file_creates_database() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("catalog.sqlite");
        let db = Database::connect(&path).await.unwrap();
        assert!(path.exists());
        db.close().await;
        // Reconnecting re-runs the (already applied) migrations.
        let db = Database::connect(&path).await.unwrap();
        db.close().await;
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = Database::connect_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        db.close().await;
    }

    #[tokio::test]
    async fn test_pragmas_are_applied() {
        let db = Database::connect_in_memory().await.unwrap();
        let row: (i64,) = sqlx::query_as("PRAGMA foreign_keys").fetch_one(db.pool()).await.unwrap();
        assert_eq!(row.0, 1, "foreign_keys should be ON");
        let row: (i64,) = sqlx::query_as("PRAGMA wal_autocheckpoint").fetch_one(db.pool()).await.unwrap();
        assert_eq!(row.0, 800, "WAL checkpoint should be 800");
        db.close().await;
    }
}
