//! # Snapkeeper Core
//!
//! Backup orchestration for a mutable dataset: one backup at a time, skipped
//! when nothing changed, every attempt recorded as an auditable history entry
//! and served back through cursor-paginated queries.
//!
//! ## Components
//!
//! - [`BackupOrchestrator`]: runs backups and finalizes their records
//! - [`BackupQueryService`]: paged history search
//! - [`CursorCodec`]: opaque, tamper-checked pagination tokens
//! - [`ChangeDetector`]: asks a [`ChangeOracle`] whether the dataset changed
//! - [`BackupRecordStore`], [`ArtifactWriter`]: collaborator contracts
//!
//! Concrete stores and writers live in `snapkeeper-store`.

pub mod artifact;
pub mod change;
pub mod cursor;
pub mod error;
pub mod orchestrator;
pub mod query;
pub mod record;
pub mod store;

pub use artifact::{ArtifactWriter, render_error_chain};
pub use change::{ChangeDetector, ChangeOracle};
pub use cursor::CursorCodec;
pub use error::{
    ArtifactError, AttemptError, BackupError, BackupResult, CursorError, OracleError, StoreError,
    TransitionError,
};
pub use orchestrator::{BEGINNING_OF_TIME, BackupOrchestrator};
pub use query::{BackupPage, BackupQueryService, QueryConfig, SearchRequest};
pub use record::{BackupId, BackupRecord, BackupStatus, StoredFile};
pub use store::{BackupFilter, BackupRecordStore, SeekPosition, newest_first};
