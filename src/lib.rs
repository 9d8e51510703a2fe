//! # Snapkeeper
//!
//! Facade over the Snapkeeper workspace crates.
//!
//! - [`core`]: the backup state machine, history queries and collaborator contracts
//! - [`store`]: in-memory and SQLite record stores, datasets, file artifacts

pub use snapkeeper_core as core;
pub use snapkeeper_store as store;

pub use snapkeeper_core::{
    BackupError, BackupFilter, BackupId, BackupOrchestrator, BackupPage, BackupQueryService,
    BackupRecord, BackupRecordStore, BackupResult, BackupStatus, ChangeDetector, CursorCodec,
    QueryConfig, SearchRequest,
};
pub use snapkeeper_store::{FileArtifactWriter, InMemoryBackupStore, InMemoryDataset};

#[cfg(feature = "sqlite")]
pub use snapkeeper_store::{SqliteBackupStore, SqliteDataset};
