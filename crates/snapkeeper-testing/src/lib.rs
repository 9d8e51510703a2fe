//! # Snapkeeper Testing
//!
//! Predictable collaborators for exercising the backup workflow.
//!
//! ## Components
//!
//! - **[ScriptedArtifactWriter]**: artifact writer with scripted failures, delays and call counts
//! - **[ScriptedOracle]**: change oracle with a switchable answer
//! - **[FaultyStore]**: record store wrapper that injects storage faults per operation
//! - **[RecordFixture]**: builds records in any status without going through a store
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use snapkeeper_core::{BackupOrchestrator, ChangeDetector};
//! use snapkeeper_store::InMemoryBackupStore;
//! use snapkeeper_testing::{ScriptedArtifactWriter, ScriptedOracle};
//!
//! let writer = ScriptedArtifactWriter::new();
//! let orchestrator = BackupOrchestrator::new(
//!     InMemoryBackupStore::shared(),
//!     ChangeDetector::new(Arc::new(ScriptedOracle::changed())),
//!     Arc::new(writer.clone()),
//! );
//! ```

/// Store wrapper injecting faults
pub mod faulty_store;
/// Record builders
pub mod fixtures;
/// Scripted artifact writer
pub mod mock_artifacts;
/// Scripted change oracle
pub mod mock_oracle;

pub use faulty_store::{FaultyStore, StoreOperation};
pub use fixtures::{RecordFixture, stored_file};
pub use mock_artifacts::ScriptedArtifactWriter;
pub use mock_oracle::ScriptedOracle;
