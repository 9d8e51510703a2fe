use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use snapkeeper_core::{
    ArtifactError, BackupError, BackupFilter, BackupId, BackupOrchestrator, BackupQueryService,
    BackupStatus, ChangeDetector, SearchRequest, StoreError,
};
use snapkeeper_store::{DatasetRow, FileArtifactWriter, SqliteBackupStore, SqliteDataset};

use crate::config::{AppConfig, ConfigError};

/// Anything that can end a CLI invocation early.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("artifact directory unusable: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

impl CliError {
    pub fn error_code(&self) -> &'static str {
        match self {
            CliError::Config(_) => "CONFIG_ERROR",
            CliError::Backup(e) => e.error_code(),
            CliError::Store(_) => "STORAGE_ERROR",
            CliError::Artifact(_) => "ARTIFACT_ERROR",
            CliError::InvalidArgument(_) => "INVALID_ARGUMENT",
            CliError::Output(_) => "OUTPUT_ERROR",
        }
    }
}

/// Search flags as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct SearchArgs {
    pub requester: Option<String>,
    pub status: Option<BackupStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub cursor: Option<String>,
    pub id_after: Option<i64>,
    pub size: Option<usize>,
}

impl SearchArgs {
    fn into_request(self) -> SearchRequest {
        let mut filter = BackupFilter::new();
        if let Some(requester) = self.requester {
            filter = filter.with_triggered_by(requester);
        }
        if let Some(status) = self.status {
            filter = filter.with_status(status);
        }
        filter.started_from = self.from;
        filter.started_to = self.to;

        SearchRequest {
            filter,
            cursor: self.cursor,
            id_after: self.id_after.map(BackupId::new),
            size: self.size,
        }
    }
}

/// Services wired against the configured database and artifact directory.
pub struct App {
    orchestrator: BackupOrchestrator,
    query: BackupQueryService,
    dataset: Arc<SqliteDataset>,
    stale_after: Duration,
}

impl App {
    pub fn open(config: &AppConfig) -> Result<Self, CliError> {
        let store = Arc::new(SqliteBackupStore::open(&config.database_path)?);
        let dataset = Arc::new(store.dataset());
        let writer = FileArtifactWriter::new(&config.artifact_dir, dataset.clone())?;

        Ok(Self {
            orchestrator: BackupOrchestrator::new(
                store.clone(),
                ChangeDetector::new(dataset.clone()),
                Arc::new(writer),
            ),
            query: BackupQueryService::with_config(store, config.query),
            dataset,
            stale_after: config.stale_after,
        })
    }

    pub async fn trigger(&self, requester: &str) -> Result<Value, CliError> {
        let record = self.orchestrator.trigger(requester).await?;
        Ok(serde_json::to_value(record)?)
    }

    pub async fn latest(&self, status: Option<BackupStatus>) -> Result<Value, CliError> {
        let record = self.orchestrator.find_latest(status).await?;
        Ok(serde_json::to_value(record)?)
    }

    pub async fn search(&self, args: SearchArgs) -> Result<Value, CliError> {
        let page = self.query.search(&args.into_request()).await?;
        Ok(serde_json::to_value(page)?)
    }

    pub async fn reconcile(&self, older_than: Option<Duration>) -> Result<Value, CliError> {
        let reconciled = self
            .orchestrator
            .reconcile_stale(older_than.unwrap_or(self.stale_after))
            .await?;
        Ok(json!({ "reconciled": reconciled }))
    }

    pub async fn dataset_put(&self, key: &str, payload: &str) -> Result<Value, CliError> {
        let payload: Value = serde_json::from_str(payload)
            .map_err(|e| CliError::InvalidArgument(format!("payload is not valid JSON: {}", e)))?;
        let row = DatasetRow::new(key, payload);
        let updated_at = row.updated_at;
        self.dataset.upsert(row).await?;
        tracing::info!(key, %updated_at, "Dataset row updated");
        Ok(json!({ "key": key, "updatedAt": updated_at }))
    }
}
