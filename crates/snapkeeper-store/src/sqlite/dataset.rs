//! Dataset rows stored next to the backup history

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};

use snapkeeper_core::{ArtifactError, ChangeOracle, OracleError, StoreError};

use super::pool::SqlitePool;
use super::{SqliteBackupStore, format_timestamp, parse_timestamp};
use crate::dataset::{DatasetRow, DatasetSource};

/// The `dataset_records` table.
#[derive(Clone)]
pub struct SqliteDataset {
    pool: Arc<SqlitePool>,
}

impl SqliteDataset {
    pub(crate) fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    /// Insert or replace a row.
    pub async fn upsert(&self, row: DatasetRow) -> Result<(), StoreError> {
        let payload = serde_json::to_string(&row.payload)
            .map_err(|e| StoreError::Corrupt(format!("unserializable payload: {}", e)))?;
        SqliteBackupStore::with_connection(&self.pool, move |conn| {
            conn.execute(
                "INSERT INTO dataset_records (key, payload, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE
                 SET payload = excluded.payload, updated_at = excluded.updated_at",
                params![row.key, payload, format_timestamp(row.updated_at)],
            )
            .map_err(|e| SqlitePool::store_error("Failed to upsert dataset row", &e))?;
            Ok(())
        })
        .await
    }

    /// Delete a row, returning whether it existed.
    pub async fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let key = key.to_string();
        SqliteBackupStore::with_connection(&self.pool, move |conn| {
            let deleted = conn
                .execute("DELETE FROM dataset_records WHERE key = ?1", params![key])
                .map_err(|e| SqlitePool::store_error("Failed to delete dataset row", &e))?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn load_rows(&self) -> Result<Vec<DatasetRow>, StoreError> {
        SqliteBackupStore::with_connection(&self.pool, |conn| {
            let mut stmt = conn
                .prepare("SELECT key, payload, updated_at FROM dataset_records ORDER BY key")
                .map_err(|e| SqlitePool::store_error("Failed to prepare dataset query", &e))?;
            let raw = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })
                .map_err(|e| SqlitePool::store_error("Failed to query dataset", &e))?;

            let mut rows = Vec::new();
            for item in raw {
                let (key, payload, updated_at) =
                    item.map_err(|e| SqlitePool::store_error("Failed to read dataset row", &e))?;
                let payload = serde_json::from_str(&payload).map_err(|e| {
                    StoreError::Corrupt(format!("invalid payload for '{}': {}", key, e))
                })?;
                rows.push(DatasetRow {
                    key,
                    payload,
                    updated_at: parse_timestamp(&updated_at)?,
                });
            }
            Ok(rows)
        })
        .await
    }
}

#[async_trait]
impl ChangeOracle for SqliteDataset {
    async fn exists_changed_after(&self, timestamp: DateTime<Utc>) -> Result<bool, OracleError> {
        SqliteBackupStore::with_connection(&self.pool, move |conn| {
            conn.query_row(
                "SELECT 1 FROM dataset_records WHERE updated_at > ?1 LIMIT 1",
                params![format_timestamp(timestamp)],
                |_| Ok(()),
            )
            .optional()
            .map(|hit| hit.is_some())
            .map_err(|e| SqlitePool::store_error("Failed to check dataset changes", &e))
        })
        .await
        .map_err(|e| OracleError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl DatasetSource for SqliteDataset {
    async fn rows(&self) -> Result<Vec<DatasetRow>, ArtifactError> {
        self.load_rows()
            .await
            .map_err(|e| ArtifactError::Source(e.to_string()))
    }
}

impl std::fmt::Debug for SqliteDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDataset")
            .field("path", &self.pool.path())
            .finish()
    }
}
