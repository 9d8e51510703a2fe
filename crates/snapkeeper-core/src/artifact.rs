//! Contract for writing backup artifacts.

use async_trait::async_trait;

use crate::error::ArtifactError;
use crate::record::StoredFile;

/// Serializes dataset snapshots and error traces to durable files.
#[async_trait]
pub trait ArtifactWriter: Send + Sync {
    /// Export the full dataset.
    async fn write_snapshot(&self) -> Result<StoredFile, ArtifactError>;

    /// Persist a description of `error`, including its source chain.
    async fn write_error_trace(
        &self,
        error: &(dyn std::error::Error + Send + Sync),
    ) -> Result<StoredFile, ArtifactError>;
}

/// Render an error and every `source()` below it, one per line.
pub fn render_error_chain(error: &(dyn std::error::Error + Send + Sync)) -> String {
    let mut out = error.to_string();
    let mut current = error.source();
    while let Some(cause) = current {
        out.push_str("\ncaused by: ");
        out.push_str(&cause.to_string());
        current = cause.source();
    }
    out
}
