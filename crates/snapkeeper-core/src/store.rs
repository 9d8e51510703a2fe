//! Persistence contract for backup history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::record::{BackupId, BackupRecord, BackupStatus};

/// Filter predicates for history searches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupFilter {
    /// Substring of the requester identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<BackupStatus>,
    /// Inclusive lower bound on `started_at`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `started_at`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_to: Option<DateTime<Utc>>,
}

impl BackupFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_triggered_by(mut self, requester: impl Into<String>) -> Self {
        self.triggered_by = Some(requester.into());
        self
    }

    pub fn with_status(mut self, status: BackupStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn started_between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.started_from = Some(from);
        self.started_to = Some(to);
        self
    }

    /// Check if a record matches this filter.
    pub fn matches(&self, record: &BackupRecord) -> bool {
        if self
            .triggered_by
            .as_ref()
            .is_some_and(|needle| !record.triggered_by().contains(needle.as_str()))
        {
            return false;
        }

        if let Some(status) = self.status
            && record.status() != status
        {
            return false;
        }

        if let Some(from) = self.started_from
            && record.started_at() < from
        {
            return false;
        }

        if let Some(to) = self.started_to
            && record.started_at() > to
        {
            return false;
        }

        true
    }
}

/// Continuation point of a paged search.
///
/// Records are ordered by `started_at` descending, then `id` descending. A
/// record lies after the position iff it starts strictly earlier, or starts at
/// the same instant with a smaller id when `id_before` is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekPosition {
    pub started_before: DateTime<Utc>,
    pub id_before: Option<BackupId>,
}

impl SeekPosition {
    pub fn new(started_before: DateTime<Utc>) -> Self {
        Self {
            started_before,
            id_before: None,
        }
    }

    pub fn with_id(mut self, id: BackupId) -> Self {
        self.id_before = Some(id);
        self
    }

    pub fn admits(&self, record: &BackupRecord) -> bool {
        let started = record.started_at();
        if started < self.started_before {
            return true;
        }
        started == self.started_before && self.id_before.is_some_and(|id| record.id() < id)
    }
}

/// Sort comparator shared by store implementations: newest start first,
/// larger id first on ties.
pub fn newest_first(a: &BackupRecord, b: &BackupRecord) -> std::cmp::Ordering {
    b.started_at()
        .cmp(&a.started_at())
        .then_with(|| b.id().cmp(&a.id()))
}

/// Async persistence contract for backup records.
#[async_trait]
pub trait BackupRecordStore: Send + Sync {
    /// Atomically create an `IN_PROGRESS` record unless one already exists.
    ///
    /// The existence check and the insert form a single unit: of two racing
    /// callers exactly one gets the record, the other
    /// [`StoreError::InProgressConflict`].
    async fn begin(
        &self,
        triggered_by: &str,
        started_at: DateTime<Utc>,
    ) -> Result<BackupRecord, StoreError>;

    /// Persist a finalized record.
    async fn save(&self, record: &BackupRecord) -> Result<(), StoreError>;

    async fn find_in_progress(&self) -> Result<Option<BackupRecord>, StoreError>;

    /// Most recently ended record with the given status.
    async fn find_latest_by_status(
        &self,
        status: BackupStatus,
    ) -> Result<Option<BackupRecord>, StoreError>;

    /// Up to `limit` records matching `filter` after `position`, newest first.
    async fn search(
        &self,
        filter: &BackupFilter,
        position: Option<SeekPosition>,
        limit: usize,
    ) -> Result<Vec<BackupRecord>, StoreError>;

    /// Number of records matching `filter`, regardless of position.
    async fn count(&self, filter: &BackupFilter) -> Result<u64, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(id: i64, requester: &str, started_at: DateTime<Utc>) -> BackupRecord {
        BackupRecord::in_progress(BackupId::new(id), requester, started_at)
    }

    #[test]
    fn test_filter_builder() {
        let now = Utc::now();
        let filter = BackupFilter::new()
            .with_status(BackupStatus::Completed)
            .with_triggered_by("10.0.")
            .started_between(now - Duration::days(1), now);

        assert_eq!(filter.status, Some(BackupStatus::Completed));
        assert_eq!(filter.triggered_by.as_deref(), Some("10.0."));
        assert_eq!(filter.started_to, Some(now));
    }

    #[test]
    fn test_filter_matches() {
        let now = Utc::now();
        let rec = record(1, "10.0.0.1", now);

        assert!(BackupFilter::new().matches(&rec));
        assert!(BackupFilter::new().with_triggered_by("0.0.1").matches(&rec));
        assert!(!BackupFilter::new().with_triggered_by("192.").matches(&rec));
        assert!(
            BackupFilter::new()
                .with_status(BackupStatus::InProgress)
                .matches(&rec)
        );
        assert!(
            !BackupFilter::new()
                .with_status(BackupStatus::Failed)
                .matches(&rec)
        );
        assert!(
            BackupFilter::new()
                .started_between(now, now)
                .matches(&rec)
        );
        assert!(
            !BackupFilter::new()
                .started_between(now + Duration::seconds(1), now + Duration::hours(1))
                .matches(&rec)
        );
    }

    #[test]
    fn test_seek_position_tie_break() {
        let t = Utc::now();
        let earlier = record(1, "a", t - Duration::seconds(1));
        let same_low = record(2, "a", t);
        let same_high = record(5, "a", t);

        let by_time = SeekPosition::new(t);
        assert!(by_time.admits(&earlier));
        assert!(!by_time.admits(&same_low));

        let with_id = SeekPosition::new(t).with_id(BackupId::new(5));
        assert!(with_id.admits(&same_low));
        assert!(!with_id.admits(&same_high));
    }

    #[test]
    fn test_newest_first_ordering() {
        let t = Utc::now();
        let mut records = vec![
            record(1, "a", t - Duration::seconds(5)),
            record(3, "a", t),
            record(2, "a", t),
        ];
        records.sort_by(newest_first);
        let ids: Vec<i64> = records.iter().map(|r| r.id().get()).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }
}
