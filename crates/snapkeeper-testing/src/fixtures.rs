//! # Record Fixtures
//!
//! Builds [`BackupRecord`]s directly, for seeding stores with history.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use snapkeeper_core::{BackupId, BackupRecord, BackupStatus, StoredFile};
use uuid::Uuid;

/// A file handle that points nowhere.
pub fn stored_file(name: &str) -> StoredFile {
    StoredFile {
        id: Uuid::new_v4(),
        name: name.to_string(),
        content_type: "application/octet-stream".to_string(),
        size: 0,
        path: PathBuf::from(name),
    }
}

/// Builder for a single record.
///
/// ```rust
/// use chrono::Utc;
/// use snapkeeper_testing::RecordFixture;
///
/// let record = RecordFixture::new(7).triggered_by("10.0.0.1").completed(Utc::now());
/// assert_eq!(record.id().get(), 7);
/// ```
#[derive(Debug, Clone)]
pub struct RecordFixture {
    id: BackupId,
    triggered_by: String,
    started_at: DateTime<Utc>,
}

impl RecordFixture {
    pub fn new(id: i64) -> Self {
        Self {
            id: BackupId::new(id),
            triggered_by: "fixture".to_string(),
            started_at: Utc::now(),
        }
    }

    pub fn triggered_by(mut self, requester: impl Into<String>) -> Self {
        self.triggered_by = requester.into();
        self
    }

    pub fn started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    pub fn in_progress(self) -> BackupRecord {
        BackupRecord::in_progress(self.id, self.triggered_by, self.started_at)
    }

    pub fn completed(self, ended_at: DateTime<Utc>) -> BackupRecord {
        let name = format!("backup-{}.jsonl", self.id);
        self.finish(BackupStatus::Completed, ended_at, Some(stored_file(&name)))
    }

    pub fn failed(self, ended_at: DateTime<Utc>) -> BackupRecord {
        let name = format!("backup-error-{}.log", self.id);
        self.finish(BackupStatus::Failed, ended_at, Some(stored_file(&name)))
    }

    pub fn skipped(self, ended_at: DateTime<Utc>) -> BackupRecord {
        self.finish(BackupStatus::Skipped, ended_at, None)
    }

    /// Terminal record in `status`, ended one second after it started.
    pub fn finished(self, status: BackupStatus) -> BackupRecord {
        let ended_at = self.started_at + Duration::seconds(1);
        match status {
            BackupStatus::InProgress => self.in_progress(),
            BackupStatus::Completed => self.completed(ended_at),
            BackupStatus::Failed => self.failed(ended_at),
            BackupStatus::Skipped => self.skipped(ended_at),
        }
    }

    fn finish(
        self,
        status: BackupStatus,
        ended_at: DateTime<Utc>,
        result_file: Option<StoredFile>,
    ) -> BackupRecord {
        BackupRecord::restore(
            self.id,
            self.triggered_by,
            status,
            self.started_at,
            Some(ended_at.max(self.started_at)),
            result_file,
        )
        .expect("fixture records satisfy the lifecycle invariants")
    }

    /// `count` completed records, ids 1.., started one minute apart from `base`.
    pub fn history(count: usize, base: DateTime<Utc>) -> Vec<BackupRecord> {
        (0..count)
            .map(|i| {
                let started_at = base + Duration::minutes(i as i64);
                RecordFixture::new(i as i64 + 1)
                    .started_at(started_at)
                    .finished(BackupStatus::Completed)
            })
            .collect()
    }
}
