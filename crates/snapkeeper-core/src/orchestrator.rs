//! The backup state machine.
//!
//! [`BackupOrchestrator::trigger`] claims the exclusivity marker through the
//! store, decides whether the dataset changed since the last completed
//! backup, runs the export, and finalizes the record exactly once. Every
//! collaborator failure is translated into a [`BackupError`] here.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::artifact::ArtifactWriter;
use crate::change::ChangeDetector;
use crate::error::{AttemptError, BackupError, BackupResult, StoreError};
use crate::record::{BackupRecord, BackupStatus, StoredFile};
use crate::store::BackupRecordStore;

/// Baseline used when no backup has ever completed.
pub const BEGINNING_OF_TIME: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

/// What a started attempt produced.
enum Outcome {
    Unchanged,
    Exported(StoredFile),
}

/// Runs backups and answers latest-by-status lookups.
#[derive(Clone)]
pub struct BackupOrchestrator {
    store: Arc<dyn BackupRecordStore>,
    detector: ChangeDetector,
    writer: Arc<dyn ArtifactWriter>,
}

impl BackupOrchestrator {
    pub fn new(
        store: Arc<dyn BackupRecordStore>,
        detector: ChangeDetector,
        writer: Arc<dyn ArtifactWriter>,
    ) -> Self {
        Self {
            store,
            detector,
            writer,
        }
    }

    /// Run one backup on behalf of `requester`.
    ///
    /// Returns the finalized (`COMPLETED` or `SKIPPED`) record. A failed
    /// export is finalized as `FAILED` and then reported as
    /// [`BackupError::Failure`].
    pub async fn trigger(&self, requester: &str) -> BackupResult<BackupRecord> {
        let requester = requester.trim();
        if requester.is_empty() {
            return Err(BackupError::InvalidRequest(
                "requester identifier cannot be empty".to_string(),
            ));
        }

        let mut record = match self.store.begin(requester, Utc::now()).await {
            Ok(record) => record,
            Err(StoreError::InProgressConflict { existing }) => {
                warn!(
                    requester,
                    existing = %existing,
                    "Backup rejected: another backup is in progress"
                );
                return Err(BackupError::InProgress);
            }
            Err(source) => return Err(BackupError::Persistence { source, cause: None }),
        };
        info!(backup_id = %record.id(), requester, "Backup started");

        match self.attempt().await {
            Ok(Outcome::Unchanged) => {
                record.skip(Utc::now())?;
                self.persist(&record).await?;
                info!(backup_id = %record.id(), "Dataset unchanged since last backup, skipped");
                Ok(record)
            }
            Ok(Outcome::Exported(file)) => {
                let file_name = file.name.clone();
                record.complete(file, Utc::now())?;
                self.persist(&record).await?;
                info!(backup_id = %record.id(), file = %file_name, "Backup completed");
                Ok(record)
            }
            Err(cause) => {
                error!(backup_id = %record.id(), error = %cause, "Backup export failed");
                self.finalize_failure(record, cause).await
            }
        }
    }

    /// Most recently ended record with `status` (default `COMPLETED`).
    pub async fn find_latest(&self, status: Option<BackupStatus>) -> BackupResult<BackupRecord> {
        let status = status.unwrap_or(BackupStatus::Completed);
        self.store
            .find_latest_by_status(status)
            .await?
            .ok_or(BackupError::NotFound { status })
    }

    /// Finalize an `IN_PROGRESS` record older than `older_than` as `FAILED`.
    ///
    /// Operator action for attempts abandoned by a crashed process. Returns
    /// `None` when there is nothing stale to reconcile.
    pub async fn reconcile_stale(
        &self,
        older_than: Duration,
    ) -> BackupResult<Option<BackupRecord>> {
        let Some(mut record) = self.store.find_in_progress().await? else {
            return Ok(None);
        };

        let age = Utc::now() - record.started_at();
        let limit = chrono::Duration::from_std(older_than)
            .map_err(|e| BackupError::InvalidRequest(format!("stale threshold: {}", e)))?;
        if age <= limit {
            return Ok(None);
        }

        let cause = AttemptError::Abandoned {
            started_at: record.started_at(),
        };
        let trace = match self.writer.write_error_trace(&cause).await {
            Ok(trace) => trace,
            Err(source) => {
                error!(
                    backup_id = %record.id(),
                    error = %source,
                    "Failed to store error trace for stale backup"
                );
                return Err(BackupError::LogStorage {
                    backup_id: record.id(),
                    cause,
                    source,
                });
            }
        };
        record.fail(trace, Utc::now())?;
        self.persist(&record).await?;
        warn!(
            backup_id = %record.id(),
            started_at = %record.started_at(),
            "Stale in-progress backup marked as failed"
        );
        Ok(Some(record))
    }

    async fn attempt(&self) -> Result<Outcome, AttemptError> {
        let baseline = self
            .store
            .find_latest_by_status(BackupStatus::Completed)
            .await
            .map_err(AttemptError::Baseline)?
            .and_then(|last| last.ended_at())
            .unwrap_or(BEGINNING_OF_TIME);

        let changed = self
            .detector
            .has_changed_since(baseline)
            .await
            .map_err(AttemptError::ChangeDetection)?;
        if !changed {
            return Ok(Outcome::Unchanged);
        }

        let file = self
            .writer
            .write_snapshot()
            .await
            .map_err(AttemptError::Export)?;
        Ok(Outcome::Exported(file))
    }

    async fn finalize_failure(
        &self,
        mut record: BackupRecord,
        cause: AttemptError,
    ) -> BackupResult<BackupRecord> {
        let trace = match self.writer.write_error_trace(&cause).await {
            Ok(trace) => trace,
            Err(source) => {
                // The record stays IN_PROGRESS; this needs an operator.
                error!(
                    backup_id = %record.id(),
                    error = %source,
                    cause = %cause,
                    "Failed to store backup error trace, record left in progress"
                );
                return Err(BackupError::LogStorage {
                    backup_id: record.id(),
                    cause,
                    source,
                });
            }
        };

        record.fail(trace, Utc::now())?;
        if let Err(source) = self.store.save(&record).await {
            error!(
                backup_id = %record.id(),
                status = %record.status(),
                error = %source,
                cause = %cause,
                "Failed to persist failed backup record"
            );
            return Err(BackupError::Persistence {
                source,
                cause: Some(cause),
            });
        }
        Err(BackupError::Failure {
            backup_id: record.id(),
            source: cause,
        })
    }

    async fn persist(&self, record: &BackupRecord) -> BackupResult<()> {
        self.store.save(record).await.map_err(|source| {
            error!(
                backup_id = %record.id(),
                status = %record.status(),
                error = %source,
                "Failed to persist backup record"
            );
            BackupError::Persistence {
                source,
                cause: None,
            }
        })
    }
}

impl std::fmt::Debug for BackupOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupOrchestrator").finish_non_exhaustive()
    }
}
