//! Backup history records and their lifecycle.
//!
//! A [`BackupRecord`] is created `IN_PROGRESS` and moves exactly once to a
//! terminal status. Its fields are private so the only ways to change one are
//! [`BackupRecord::skip`], [`BackupRecord::complete`] and
//! [`BackupRecord::fail`].

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TransitionError;

/// Store-assigned identifier of a backup record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackupId(i64);

impl BackupId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for BackupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a backup attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackupStatus {
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl BackupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupStatus::InProgress => "IN_PROGRESS",
            BackupStatus::Completed => "COMPLETED",
            BackupStatus::Failed => "FAILED",
            BackupStatus::Skipped => "SKIPPED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, BackupStatus::InProgress)
    }
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "IN_PROGRESS" => Ok(BackupStatus::InProgress),
            "COMPLETED" => Ok(BackupStatus::Completed),
            "FAILED" => Ok(BackupStatus::Failed),
            "SKIPPED" => Ok(BackupStatus::Skipped),
            other => Err(format!("unknown backup status '{}'", other)),
        }
    }
}

/// Handle to a durable artifact produced by a backup attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub id: Uuid,
    pub name: String,
    pub content_type: String,
    pub size: u64,
    pub path: PathBuf,
}

/// One auditable attempt to back up the dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    id: BackupId,
    triggered_by: String,
    status: BackupStatus,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    result_file: Option<StoredFile>,
}

impl BackupRecord {
    /// A freshly started attempt.
    pub fn in_progress(
        id: BackupId,
        triggered_by: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            triggered_by: triggered_by.into(),
            status: BackupStatus::InProgress,
            started_at,
            ended_at: None,
            result_file: None,
        }
    }

    /// Rebuild a record from persisted parts, checking the lifecycle invariants.
    pub fn restore(
        id: BackupId,
        triggered_by: String,
        status: BackupStatus,
        started_at: DateTime<Utc>,
        ended_at: Option<DateTime<Utc>>,
        result_file: Option<StoredFile>,
    ) -> Result<Self, TransitionError> {
        let invariant = |reason: &str| TransitionError::Invariant {
            id,
            reason: reason.to_string(),
        };

        if ended_at.is_some() != status.is_terminal() {
            return Err(invariant("ended_at must be set iff the status is terminal"));
        }
        let needs_file = matches!(status, BackupStatus::Completed | BackupStatus::Failed);
        if result_file.is_some() != needs_file {
            return Err(invariant(
                "result_file must be set iff the status is COMPLETED or FAILED",
            ));
        }
        if ended_at.is_some_and(|ended| ended < started_at) {
            return Err(invariant("ended_at precedes started_at"));
        }

        Ok(Self {
            id,
            triggered_by,
            status,
            started_at,
            ended_at,
            result_file,
        })
    }

    pub fn id(&self) -> BackupId {
        self.id
    }

    pub fn triggered_by(&self) -> &str {
        &self.triggered_by
    }

    pub fn status(&self) -> BackupStatus {
        self.status
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn result_file(&self) -> Option<&StoredFile> {
        self.result_file.as_ref()
    }

    /// The dataset did not change; nothing was exported.
    pub fn skip(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.finish(BackupStatus::Skipped, None, now)
    }

    /// The snapshot was written to `file`.
    pub fn complete(
        &mut self,
        file: StoredFile,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.finish(BackupStatus::Completed, Some(file), now)
    }

    /// The export failed; `error_trace` describes why.
    pub fn fail(
        &mut self,
        error_trace: StoredFile,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.finish(BackupStatus::Failed, Some(error_trace), now)
    }

    fn finish(
        &mut self,
        status: BackupStatus,
        file: Option<StoredFile>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::AlreadyFinished {
                id: self.id,
                status: self.status,
            });
        }
        self.status = status;
        self.result_file = file;
        // Clock skew must not produce an end before the start.
        self.ended_at = Some(now.max(self.started_at));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rstest::rstest;

    fn file(name: &str) -> StoredFile {
        StoredFile {
            id: Uuid::new_v4(),
            name: name.to_string(),
            content_type: "text/plain".to_string(),
            size: 12,
            path: PathBuf::from(name),
        }
    }

    #[rstest]
    #[case("IN_PROGRESS", BackupStatus::InProgress)]
    #[case("completed", BackupStatus::Completed)]
    #[case(" Failed ", BackupStatus::Failed)]
    #[case("skipped", BackupStatus::Skipped)]
    #[case("in-progress", BackupStatus::InProgress)]
    fn test_status_parsing(#[case] input: &str, #[case] expected: BackupStatus) {
        assert_eq!(input.parse::<BackupStatus>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_status_rejected() {
        assert!("PAUSED".parse::<BackupStatus>().is_err());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&BackupStatus::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
    }

    #[test]
    fn test_skip_sets_end_without_file() {
        let start = Utc::now();
        let mut record = BackupRecord::in_progress(BackupId::new(1), "10.0.0.1", start);
        record.skip(start + Duration::seconds(1)).unwrap();

        assert_eq!(record.status(), BackupStatus::Skipped);
        assert_eq!(record.ended_at(), Some(start + Duration::seconds(1)));
        assert!(record.result_file().is_none());
    }

    #[test]
    fn test_complete_and_fail_attach_file() {
        let start = Utc::now();
        let mut completed = BackupRecord::in_progress(BackupId::new(1), "a", start);
        completed.complete(file("snapshot.jsonl"), start).unwrap();
        assert_eq!(completed.status(), BackupStatus::Completed);
        assert_eq!(completed.result_file().unwrap().name, "snapshot.jsonl");

        let mut failed = BackupRecord::in_progress(BackupId::new(2), "a", start);
        failed.fail(file("error.log"), start).unwrap();
        assert_eq!(failed.status(), BackupStatus::Failed);
        assert_eq!(failed.result_file().unwrap().name, "error.log");
    }

    #[test]
    fn test_terminal_record_cannot_transition_again() {
        let start = Utc::now();
        let mut record = BackupRecord::in_progress(BackupId::new(4), "a", start);
        record.skip(start).unwrap();
        let ended = record.ended_at();

        let err = record.complete(file("late.jsonl"), start + Duration::hours(1));
        assert!(matches!(
            err,
            Err(TransitionError::AlreadyFinished {
                status: BackupStatus::Skipped,
                ..
            })
        ));
        assert_eq!(record.ended_at(), ended);
        assert!(record.result_file().is_none());
    }

    #[test]
    fn test_end_never_precedes_start() {
        let start = Utc::now();
        let mut record = BackupRecord::in_progress(BackupId::new(5), "a", start);
        record.skip(start - Duration::seconds(30)).unwrap();
        assert_eq!(record.ended_at(), Some(start));
    }

    #[test]
    fn test_restore_validates_invariants() {
        let start = Utc::now();
        let id = BackupId::new(9);

        assert!(
            BackupRecord::restore(id, "a".into(), BackupStatus::InProgress, start, None, None)
                .is_ok()
        );
        assert!(
            BackupRecord::restore(
                id,
                "a".into(),
                BackupStatus::InProgress,
                start,
                Some(start),
                None
            )
            .is_err()
        );
        assert!(
            BackupRecord::restore(id, "a".into(), BackupStatus::Completed, start, Some(start), None)
                .is_err()
        );
        assert!(
            BackupRecord::restore(
                id,
                "a".into(),
                BackupStatus::Skipped,
                start,
                Some(start),
                Some(file("x"))
            )
            .is_err()
        );
        assert!(
            BackupRecord::restore(
                id,
                "a".into(),
                BackupStatus::Failed,
                start,
                Some(start),
                Some(file("x"))
            )
            .is_ok()
        );
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = BackupRecord::in_progress(BackupId::new(11), "10.0.0.1", Utc::now());
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["id"], 11);
        assert_eq!(value["triggeredBy"], "10.0.0.1");
        assert_eq!(value["status"], "IN_PROGRESS");
        assert!(value["endedAt"].is_null());
    }
}
