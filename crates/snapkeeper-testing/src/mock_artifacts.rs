//! # Scripted Artifact Writer
//!
//! An [`ArtifactWriter`] that never touches the file system. Snapshot and
//! error-trace writes can be scripted to fail, snapshots can be delayed to
//! widen race windows, and every call is counted.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use snapkeeper_core::{ArtifactError, ArtifactWriter, StoredFile, render_error_chain};

use crate::fixtures::stored_file;

#[derive(Debug, Default)]
struct WriterState {
    snapshot_calls: usize,
    trace_calls: usize,
    snapshot_failure: Option<String>,
    trace_failure: Option<String>,
    traces: Vec<String>,
}

/// Artifact writer returning in-memory file handles.
///
/// Clones share state, so a test can keep one handle for assertions and
/// hand another to the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct ScriptedArtifactWriter {
    state: Arc<Mutex<WriterState>>,
    snapshot_delay: Option<Duration>,
}

impl ScriptedArtifactWriter {
    /// Create a writer whose writes all succeed
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every snapshot export fail with `message`
    pub fn failing_snapshot(self, message: impl Into<String>) -> Self {
        self.state.lock().unwrap().snapshot_failure = Some(message.into());
        self
    }

    /// Make every error-trace write fail with `message`
    pub fn failing_trace(self, message: impl Into<String>) -> Self {
        self.state.lock().unwrap().trace_failure = Some(message.into());
        self
    }

    /// Sleep this long inside each snapshot export
    pub fn with_snapshot_delay(mut self, delay: Duration) -> Self {
        self.snapshot_delay = Some(delay);
        self
    }

    /// Number of snapshot exports requested
    pub fn snapshot_calls(&self) -> usize {
        self.state.lock().unwrap().snapshot_calls
    }

    /// Number of error-trace writes requested
    pub fn trace_calls(&self) -> usize {
        self.state.lock().unwrap().trace_calls
    }

    /// Rendered error chains of every successfully stored trace
    pub fn recorded_traces(&self) -> Vec<String> {
        self.state.lock().unwrap().traces.clone()
    }
}

#[async_trait]
impl ArtifactWriter for ScriptedArtifactWriter {
    async fn write_snapshot(&self) -> Result<StoredFile, ArtifactError> {
        let (call, failure) = {
            let mut state = self.state.lock().unwrap();
            state.snapshot_calls += 1;
            (state.snapshot_calls, state.snapshot_failure.clone())
        };

        if let Some(delay) = self.snapshot_delay {
            tokio::time::sleep(delay).await;
        }

        match failure {
            Some(message) => Err(ArtifactError::Source(message)),
            None => Ok(stored_file(&format!("snapshot-{}.jsonl", call))),
        }
    }

    async fn write_error_trace(
        &self,
        error: &(dyn std::error::Error + Send + Sync),
    ) -> Result<StoredFile, ArtifactError> {
        let mut state = self.state.lock().unwrap();
        state.trace_calls += 1;
        if let Some(message) = &state.trace_failure {
            return Err(ArtifactError::Io(std::io::Error::other(message.clone())));
        }
        state.traces.push(render_error_chain(error));
        Ok(stored_file(&format!("error-{}.log", state.trace_calls)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counts_and_names() {
        let writer = ScriptedArtifactWriter::new();
        let first = writer.write_snapshot().await.unwrap();
        let second = writer.write_snapshot().await.unwrap();

        assert_eq!(writer.snapshot_calls(), 2);
        assert_eq!(first.name, "snapshot-1.jsonl");
        assert_eq!(second.name, "snapshot-2.jsonl");
    }

    #[tokio::test]
    async fn test_scripted_failures_are_shared_across_clones() {
        let writer = ScriptedArtifactWriter::new()
            .failing_snapshot("export broke")
            .failing_trace("log broke");
        let handle = writer.clone();

        assert!(handle.write_snapshot().await.is_err());
        let err = ArtifactError::Source("boom".into());
        assert!(handle.write_error_trace(&err).await.is_err());

        assert_eq!(writer.snapshot_calls(), 1);
        assert_eq!(writer.trace_calls(), 1);
        assert!(writer.recorded_traces().is_empty());
    }
}
