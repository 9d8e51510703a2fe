//! # Fault-injecting Record Store
//!
//! Wraps any [`BackupRecordStore`] and fails selected operations with
//! [`StoreError::Unavailable`]. Faults can be switched on and off while a
//! test runs.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use snapkeeper_core::{
    BackupFilter, BackupRecord, BackupRecordStore, BackupStatus, SeekPosition, StoreError,
};

/// A [`BackupRecordStore`] operation that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    Begin,
    Save,
    FindInProgress,
    FindLatest,
    Search,
    Count,
}

/// Record store delegating to `inner` unless a fault is armed.
pub struct FaultyStore {
    inner: Arc<dyn BackupRecordStore>,
    faults: Mutex<HashSet<StoreOperation>>,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn BackupRecordStore>) -> Self {
        Self {
            inner,
            faults: Mutex::new(HashSet::new()),
        }
    }

    /// Arm a fault at construction time
    pub fn failing_on(self, operation: StoreOperation) -> Self {
        self.set_fault(operation, true);
        self
    }

    /// Arm or disarm the fault for `operation`
    pub fn set_fault(&self, operation: StoreOperation, armed: bool) {
        let mut faults = self.faults.lock().unwrap();
        if armed {
            faults.insert(operation);
        } else {
            faults.remove(&operation);
        }
    }

    fn check(&self, operation: StoreOperation) -> Result<(), StoreError> {
        if self.faults.lock().unwrap().contains(&operation) {
            tracing::debug!(?operation, "Injecting store fault");
            return Err(StoreError::Unavailable(format!(
                "injected fault on {:?}",
                operation
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl BackupRecordStore for FaultyStore {
    async fn begin(
        &self,
        triggered_by: &str,
        started_at: DateTime<Utc>,
    ) -> Result<BackupRecord, StoreError> {
        self.check(StoreOperation::Begin)?;
        self.inner.begin(triggered_by, started_at).await
    }

    async fn save(&self, record: &BackupRecord) -> Result<(), StoreError> {
        self.check(StoreOperation::Save)?;
        self.inner.save(record).await
    }

    async fn find_in_progress(&self) -> Result<Option<BackupRecord>, StoreError> {
        self.check(StoreOperation::FindInProgress)?;
        self.inner.find_in_progress().await
    }

    async fn find_latest_by_status(
        &self,
        status: BackupStatus,
    ) -> Result<Option<BackupRecord>, StoreError> {
        self.check(StoreOperation::FindLatest)?;
        self.inner.find_latest_by_status(status).await
    }

    async fn search(
        &self,
        filter: &BackupFilter,
        position: Option<SeekPosition>,
        limit: usize,
    ) -> Result<Vec<BackupRecord>, StoreError> {
        self.check(StoreOperation::Search)?;
        self.inner.search(filter, position, limit).await
    }

    async fn count(&self, filter: &BackupFilter) -> Result<u64, StoreError> {
        self.check(StoreOperation::Count)?;
        self.inner.count(filter).await
    }
}
