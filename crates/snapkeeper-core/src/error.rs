//! Error types for backup orchestration and history queries.
//!
//! Collaborator contracts each carry their own error (`StoreError`,
//! `OracleError`, `ArtifactError`). The orchestrator and query service
//! translate them into [`BackupError`], the only error callers of the core
//! ever see.

use thiserror::Error;

use crate::record::{BackupId, BackupStatus};

/// Errors raised by a [`BackupRecordStore`](crate::store::BackupRecordStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another record already holds the `IN_PROGRESS` marker.
    #[error("a backup is already in progress (record {existing})")]
    InProgressConflict { existing: BackupId },

    /// The record to update does not exist.
    #[error("backup record {0} not found")]
    RecordNotFound(BackupId),

    /// The stored record already left `IN_PROGRESS`.
    #[error("backup record {0} is already finalized")]
    AlreadyFinalized(BackupId),

    /// The backing storage could not be reached or failed mid-operation.
    #[error("record store unavailable: {0}")]
    Unavailable(String),

    /// A persisted row could not be turned back into a valid record.
    #[error("corrupt backup record: {0}")]
    Corrupt(String),
}

/// Errors raised by a [`ChangeOracle`](crate::change::ChangeOracle).
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("dataset unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by an [`ArtifactWriter`](crate::artifact::ArtifactWriter).
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifact serialization failed: {0}")]
    Serialization(String),

    /// Reading the dataset to export failed.
    #[error("dataset read failed: {0}")]
    Source(String),
}

impl From<serde_json::Error> for ArtifactError {
    fn from(err: serde_json::Error) -> Self {
        ArtifactError::Serialization(err.to_string())
    }
}

/// Malformed or tampered pagination token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    #[error("cursor is not valid base64")]
    Encoding,

    #[error("cursor checksum mismatch")]
    Checksum,

    #[error("cursor does not hold a timestamp: {0}")]
    Timestamp(String),
}

/// Illegal change to a record's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("backup {id} already finished with status {status}")]
    AlreadyFinished { id: BackupId, status: BackupStatus },

    #[error("backup {id} violates record invariants: {reason}")]
    Invariant { id: BackupId, reason: String },
}

/// The reason a started backup attempt could not produce a snapshot.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("could not resolve the last completed backup: {0}")]
    Baseline(#[source] StoreError),

    #[error("change detection failed: {0}")]
    ChangeDetection(#[source] OracleError),

    #[error("snapshot export failed: {0}")]
    Export(#[source] ArtifactError),

    /// Operator reconciliation of a record abandoned mid-export.
    #[error("backup abandoned in progress since {started_at}")]
    Abandoned {
        started_at: chrono::DateTime<chrono::Utc>,
    },
}

/// Errors surfaced by the backup orchestrator and query service.
#[derive(Debug, Error)]
pub enum BackupError {
    /// Another backup holds the exclusivity marker. Retry later.
    #[error("a backup is already in progress")]
    InProgress,

    /// No record matches a latest-by-status lookup.
    #[error("no backup found with status {status}")]
    NotFound { status: BackupStatus },

    /// The export failed; the record was finalized as `FAILED` first.
    #[error("backup {backup_id} failed: {source}")]
    Failure {
        backup_id: BackupId,
        #[source]
        source: AttemptError,
    },

    /// The error trace for a failed export could not be written. The record
    /// stays `IN_PROGRESS` and needs an operator.
    #[error(
        "backup {backup_id} failed ({cause}) and its error trace could not be stored: {source}"
    )]
    LogStorage {
        backup_id: BackupId,
        cause: AttemptError,
        #[source]
        source: ArtifactError,
    },

    #[error("invalid cursor: {0}")]
    InvalidCursor(#[from] CursorError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Record store failure inside the trigger flow. `cause` is set when
    /// the record being saved was the `FAILED` finalization of an attempt.
    #[error("failed to persist backup record: {source}")]
    Persistence {
        #[source]
        source: StoreError,
        cause: Option<AttemptError>,
    },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Record store failure on the query path, propagated unchanged.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl BackupError {
    /// Check if the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackupError::InProgress => true,
            BackupError::Storage(StoreError::Unavailable(_))
            | BackupError::Persistence {
                source: StoreError::Unavailable(_),
                ..
            } => true,
            _ => false,
        }
    }

    /// Failures that leave the record history inconsistent.
    pub fn is_operational(&self) -> bool {
        matches!(self, BackupError::LogStorage { .. })
    }

    /// Get the error code suitable for logging or reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            BackupError::InProgress => "BACKUP_IN_PROGRESS",
            BackupError::NotFound { .. } => "BACKUP_NOT_FOUND",
            BackupError::Failure { .. } => "BACKUP_FAILED",
            BackupError::LogStorage { .. } => "BACKUP_LOG_STORAGE_FAILED",
            BackupError::InvalidCursor(_) => "INVALID_CURSOR",
            BackupError::InvalidRequest(_) => "INVALID_REQUEST",
            BackupError::Persistence { .. } => "BACKUP_PERSISTENCE_FAILED",
            BackupError::Transition(_) => "INVALID_TRANSITION",
            BackupError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

/// Result type for backup operations.
pub type BackupResult<T> = Result<T, BackupError>;
