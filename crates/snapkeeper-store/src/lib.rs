//! # Snapkeeper Store
//!
//! Concrete collaborators for the backup workflow in `snapkeeper-core`.
//!
//! ## Record stores
//!
//! - **[InMemoryBackupStore]**: transient history for tests and development
//! - **[SqliteBackupStore]**: durable history with WAL mode and migrations
//!   (requires `sqlite` feature)
//!
//! ## Datasets and artifacts
//!
//! - **[InMemoryDataset]** / **[SqliteDataset]**: the data being backed up,
//!   usable both as a [`ChangeOracle`](snapkeeper_core::ChangeOracle) and a [`DatasetSource`]
//! - **[FileArtifactWriter]**: writes JSON Lines snapshots and error traces to a directory
//!
//! ## Feature Flags
//!
//! - `sqlite` (default): enable the SQLite backend
//!
//! ## Example
//!
//! ```rust
//! use snapkeeper_store::{InMemoryBackupStore, InMemoryDataset};
//!
//! let store = InMemoryBackupStore::shared();
//! let dataset = InMemoryDataset::shared();
//! ```

mod dataset;
pub use dataset::{DatasetRow, DatasetSource, InMemoryDataset};

mod file_artifacts;
pub use file_artifacts::{ERROR_TRACE_CONTENT_TYPE, FileArtifactWriter, SNAPSHOT_CONTENT_TYPE};

mod in_memory;
pub use in_memory::InMemoryBackupStore;

#[cfg(feature = "sqlite")]
pub mod sqlite;
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteBackupStore, SqliteDataset};
