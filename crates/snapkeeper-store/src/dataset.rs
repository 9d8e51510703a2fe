//! The dataset being backed up.
//!
//! A dataset is a set of keyed JSON payloads with modification times. It is
//! both the [`ChangeOracle`] consulted before a backup and the
//! [`DatasetSource`] a [`FileArtifactWriter`](crate::FileArtifactWriter)
//! exports.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use snapkeeper_core::{ArtifactError, ChangeOracle, OracleError};

/// One row of the dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetRow {
    pub key: String,
    pub payload: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl DatasetRow {
    pub fn new(key: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            payload,
            updated_at: Utc::now(),
        }
    }

    pub fn updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = updated_at;
        self
    }
}

/// Full read access to the dataset for snapshot export.
#[async_trait]
pub trait DatasetSource: Send + Sync {
    /// Every row, ordered by key.
    async fn rows(&self) -> Result<Vec<DatasetRow>, ArtifactError>;
}

/// In-memory dataset for tests and development.
#[derive(Debug, Default)]
pub struct InMemoryDataset {
    rows: RwLock<HashMap<String, DatasetRow>>,
}

impl InMemoryDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Insert or replace a row.
    pub async fn upsert(&self, row: DatasetRow) {
        self.rows.write().await.insert(row.key.clone(), row);
    }

    pub async fn remove(&self, key: &str) -> Option<DatasetRow> {
        self.rows.write().await.remove(key)
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl ChangeOracle for InMemoryDataset {
    async fn exists_changed_after(&self, timestamp: DateTime<Utc>) -> Result<bool, OracleError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .any(|row| row.updated_at > timestamp))
    }
}

#[async_trait]
impl DatasetSource for InMemoryDataset {
    async fn rows(&self) -> Result<Vec<DatasetRow>, ArtifactError> {
        let mut rows: Vec<_> = self.rows.read().await.values().cloned().collect();
        rows.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[tokio::test]
    async fn test_change_detection_is_strict() {
        let dataset = InMemoryDataset::new();
        let t = Utc::now();
        dataset
            .upsert(DatasetRow::new("emp-1", json!({"name": "Ada"})).updated_at(t))
            .await;

        assert!(dataset.exists_changed_after(t - Duration::seconds(1)).await.unwrap());
        assert!(!dataset.exists_changed_after(t).await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_dataset_never_changed() {
        let dataset = InMemoryDataset::new();
        assert!(
            !dataset
                .exists_changed_after(DateTime::<Utc>::UNIX_EPOCH)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_rows_sorted_by_key() {
        let dataset = InMemoryDataset::new();
        dataset.upsert(DatasetRow::new("b", json!(2))).await;
        dataset.upsert(DatasetRow::new("a", json!(1))).await;
        dataset.upsert(DatasetRow::new("b", json!(3))).await;

        let rows = dataset.rows().await.unwrap();
        let keys: Vec<&str> = rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(rows[1].payload, json!(3));
    }
}
