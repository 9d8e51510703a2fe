use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use snapkeeper_core::store::newest_first;
use snapkeeper_core::{
    BackupFilter, BackupId, BackupRecord, BackupRecordStore, BackupStatus, SeekPosition,
    StoreError,
};

/// In-memory backup history for tests and development.
///
/// Records are lost when the process exits. The exclusivity check and the
/// insert in [`BackupRecordStore::begin`] run under one write lock.
#[derive(Debug, Default)]
pub struct InMemoryBackupStore {
    state: RwLock<State>,
}

#[derive(Debug, Default)]
struct State {
    records: BTreeMap<BackupId, BackupRecord>,
    last_id: i64,
}

impl State {
    fn in_progress(&self) -> Option<&BackupRecord> {
        self.records
            .values()
            .find(|r| r.status() == BackupStatus::InProgress)
    }
}

impl InMemoryBackupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store wrapped in Arc for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Insert an already-built record, keeping its id.
    ///
    /// Rejects a second `IN_PROGRESS` record like [`BackupRecordStore::begin`].
    pub async fn seed(&self, record: BackupRecord) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if record.status() == BackupStatus::InProgress
            && let Some(existing) = state.in_progress()
            && existing.id() != record.id()
        {
            return Err(StoreError::InProgressConflict {
                existing: existing.id(),
            });
        }
        state.last_id = state.last_id.max(record.id().get());
        state.records.insert(record.id(), record);
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.records.is_empty()
    }

    /// Every stored record, oldest id first.
    pub async fn all(&self) -> Vec<BackupRecord> {
        self.state.read().await.records.values().cloned().collect()
    }
}

#[async_trait]
impl BackupRecordStore for InMemoryBackupStore {
    async fn begin(
        &self,
        triggered_by: &str,
        started_at: DateTime<Utc>,
    ) -> Result<BackupRecord, StoreError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.in_progress() {
            return Err(StoreError::InProgressConflict {
                existing: existing.id(),
            });
        }

        state.last_id += 1;
        let record =
            BackupRecord::in_progress(BackupId::new(state.last_id), triggered_by, started_at);
        state.records.insert(record.id(), record.clone());
        debug!(backup_id = %record.id(), "Created in-progress backup record");
        Ok(record)
    }

    async fn save(&self, record: &BackupRecord) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let stored = state
            .records
            .get_mut(&record.id())
            .ok_or(StoreError::RecordNotFound(record.id()))?;
        if stored.status().is_terminal() {
            return Err(StoreError::AlreadyFinalized(record.id()));
        }
        *stored = record.clone();
        debug!(backup_id = %record.id(), status = %record.status(), "Saved backup record");
        Ok(())
    }

    async fn find_in_progress(&self) -> Result<Option<BackupRecord>, StoreError> {
        Ok(self.state.read().await.in_progress().cloned())
    }

    async fn find_latest_by_status(
        &self,
        status: BackupStatus,
    ) -> Result<Option<BackupRecord>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .records
            .values()
            .filter(|r| r.status() == status)
            .max_by(|a, b| {
                a.ended_at()
                    .cmp(&b.ended_at())
                    .then_with(|| a.id().cmp(&b.id()))
            })
            .cloned())
    }

    async fn search(
        &self,
        filter: &BackupFilter,
        position: Option<SeekPosition>,
        limit: usize,
    ) -> Result<Vec<BackupRecord>, StoreError> {
        let state = self.state.read().await;
        let mut results: Vec<_> = state
            .records
            .values()
            .filter(|r| filter.matches(r))
            .filter(|r| position.is_none_or(|p| p.admits(r)))
            .cloned()
            .collect();

        results.sort_by(newest_first);
        results.truncate(limit);
        Ok(results)
    }

    async fn count(&self, filter: &BackupFilter) -> Result<u64, StoreError> {
        let state = self.state.read().await;
        Ok(state.records.values().filter(|r| filter.matches(r)).count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_begin_assigns_ascending_ids() {
        let store = InMemoryBackupStore::new();
        let now = Utc::now();

        let mut first = store.begin("a", now).await.unwrap();
        assert_eq!(first.id(), BackupId::new(1));
        first.skip(now).unwrap();
        store.save(&first).await.unwrap();

        let second = store.begin("b", now).await.unwrap();
        assert_eq!(second.id(), BackupId::new(2));
    }

    #[tokio::test]
    async fn test_begin_rejects_second_in_progress() {
        let store = InMemoryBackupStore::new();
        let first = store.begin("a", Utc::now()).await.unwrap();

        let err = store.begin("b", Utc::now()).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::InProgressConflict { existing } if existing == first.id()
        ));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_save_is_one_way() {
        let store = InMemoryBackupStore::new();
        let now = Utc::now();
        let mut record = store.begin("a", now).await.unwrap();
        record.skip(now).unwrap();
        store.save(&record).await.unwrap();

        let err = store.save(&record).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyFinalized(_)));

        let ghost = BackupRecord::in_progress(BackupId::new(99), "x", now);
        assert!(matches!(
            store.save(&ghost).await,
            Err(StoreError::RecordNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_latest_by_status_orders_by_end_time() {
        let store = InMemoryBackupStore::new();
        let base = Utc::now() - Duration::hours(3);

        // Started later but ended earlier than record 1.
        let mut early_end =
            BackupRecord::in_progress(BackupId::new(2), "a", base + Duration::minutes(10));
        early_end.skip(base + Duration::minutes(20)).unwrap();
        let mut late_end = BackupRecord::in_progress(BackupId::new(1), "a", base);
        late_end.skip(base + Duration::hours(1)).unwrap();
        store.seed(early_end).await.unwrap();
        store.seed(late_end).await.unwrap();

        let latest = store
            .find_latest_by_status(BackupStatus::Skipped)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id(), BackupId::new(1));
        assert!(
            store
                .find_latest_by_status(BackupStatus::Completed)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_search_and_count() {
        let store = InMemoryBackupStore::new();
        let base = Utc::now() - Duration::hours(1);
        for i in 1..=5 {
            let mut r = BackupRecord::in_progress(
                BackupId::new(i),
                format!("10.0.0.{}", i),
                base + Duration::minutes(i),
            );
            r.skip(base + Duration::minutes(i)).unwrap();
            store.seed(r).await.unwrap();
        }

        let page = store.search(&BackupFilter::new(), None, 2).await.unwrap();
        let ids: Vec<i64> = page.iter().map(|r| r.id().get()).collect();
        assert_eq!(ids, vec![5, 4]);

        let position = SeekPosition::new(page[1].started_at());
        let next = store
            .search(&BackupFilter::new(), Some(position), 10)
            .await
            .unwrap();
        let ids: Vec<i64> = next.iter().map(|r| r.id().get()).collect();
        assert_eq!(ids, vec![3, 2, 1]);

        let filter = BackupFilter::new().with_triggered_by("10.0.0.3");
        assert_eq!(store.count(&filter).await.unwrap(), 1);
        assert_eq!(store.count(&BackupFilter::new()).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_seed_keeps_single_in_progress() {
        let store = InMemoryBackupStore::new();
        let now = Utc::now();
        store
            .seed(BackupRecord::in_progress(BackupId::new(1), "a", now))
            .await
            .unwrap();
        let err = store
            .seed(BackupRecord::in_progress(BackupId::new(2), "b", now))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InProgressConflict { .. }));

        // begin continues after the highest seeded id
        let mut seeded = store.find_in_progress().await.unwrap().unwrap();
        seeded.skip(now).unwrap();
        store.save(&seeded).await.unwrap();
        assert_eq!(store.begin("c", now).await.unwrap().id(), BackupId::new(2));
    }
}
