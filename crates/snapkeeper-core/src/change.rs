//! Change detection against the source dataset.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::OracleError;

/// External authority on whether the dataset was modified.
#[async_trait]
pub trait ChangeOracle: Send + Sync {
    /// True if any dataset record was modified strictly after `timestamp`.
    async fn exists_changed_after(&self, timestamp: DateTime<Utc>) -> Result<bool, OracleError>;
}

/// Answers "has the dataset changed since T?" by asking the oracle.
#[derive(Clone)]
pub struct ChangeDetector {
    oracle: Arc<dyn ChangeOracle>,
}

impl ChangeDetector {
    pub fn new(oracle: Arc<dyn ChangeOracle>) -> Self {
        Self { oracle }
    }

    pub async fn has_changed_since(&self, timestamp: DateTime<Utc>) -> Result<bool, OracleError> {
        self.oracle.exists_changed_after(timestamp).await
    }
}

impl std::fmt::Debug for ChangeDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeDetector").finish_non_exhaustive()
    }
}
