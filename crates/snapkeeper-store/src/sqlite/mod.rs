//! SQLite-backed backup history and dataset.
//!
//! - WAL mode and a small connection pool
//! - Versioned schema migrations
//! - `begin` runs inside `BEGIN IMMEDIATE`, backed by a partial unique index
//!   that admits a single `IN_PROGRESS` row
//!
//! rusqlite is synchronous, so every store call runs on the blocking pool.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use snapkeeper_core::StoreError;

mod dataset;
pub mod migration;
pub mod pool;
mod records;

pub use dataset::SqliteDataset;
pub use migration::{Migration, MigrationEngine};
pub use pool::{ConnectionConfig, PoolHealth, PooledConnection, SqlitePool};

/// SQLite backup record store.
#[derive(Clone)]
pub struct SqliteBackupStore {
    pub(crate) pool: Arc<SqlitePool>,
}

impl SqliteBackupStore {
    /// Open (or create) the database at `path` and run migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::with_pool_size(path, 4)
    }

    pub fn with_pool_size(path: impl AsRef<Path>, pool_size: usize) -> Result<Self, StoreError> {
        let pool = Arc::new(SqlitePool::new(path, pool_size)?);
        {
            let conn = pool.acquire()?;
            MigrationEngine::new().migrate(&conn)?;
        }
        tracing::info!(path = %pool.path().display(), pool_size, "Opened SQLite backup store");
        Ok(Self { pool })
    }

    /// The dataset table living in the same database.
    pub fn dataset(&self) -> SqliteDataset {
        SqliteDataset::new(Arc::clone(&self.pool))
    }

    pub fn health(&self) -> Result<PoolHealth, StoreError> {
        self.pool.health_check()
    }

    /// Run `f` with a pooled connection on the blocking thread pool.
    pub(crate) async fn with_connection<T, F>(
        pool: &Arc<SqlitePool>,
        f: F,
    ) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut PooledConnection) -> Result<T, StoreError> + Send + 'static,
    {
        let pool = Arc::clone(pool);
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.acquire()?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("Task join error: {}", e)))?
    }
}

impl std::fmt::Debug for SqliteBackupStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackupStore")
            .field("path", &self.pool.path())
            .finish()
    }
}

/// Fixed-width RFC 3339 text, so lexical order equals time order.
pub(crate) fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("invalid timestamp '{}': {}", text, e)))
}
