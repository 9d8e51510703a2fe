//! File-system artifact writer.
//!
//! Snapshots are JSON Lines, one [`DatasetRow`] per line. Error traces are
//! plain text holding the error and its source chain. Both are written to a
//! temporary name and renamed into place.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use snapkeeper_core::{ArtifactError, ArtifactWriter, StoredFile, render_error_chain};

use crate::dataset::DatasetSource;

pub const SNAPSHOT_CONTENT_TYPE: &str = "application/x-ndjson";
pub const ERROR_TRACE_CONTENT_TYPE: &str = "text/plain";

/// Writes artifacts into a directory.
pub struct FileArtifactWriter {
    directory: PathBuf,
    source: Arc<dyn DatasetSource>,
}

impl FileArtifactWriter {
    /// Create a writer, creating `directory` if it doesn't exist.
    pub fn new(
        directory: impl Into<PathBuf>,
        source: Arc<dyn DatasetSource>,
    ) -> Result<Self, ArtifactError> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)?;
        info!(directory = %directory.display(), "Created file artifact writer");
        Ok(Self { directory, source })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn file_name(prefix: &str, extension: &str) -> (Uuid, String) {
        let id = Uuid::new_v4();
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let short = id.simple().to_string();
        (id, format!("{}-{}-{}.{}", prefix, stamp, &short[..8], extension))
    }

    async fn write(
        &self,
        id: Uuid,
        name: String,
        content_type: &str,
        content: Vec<u8>,
    ) -> Result<StoredFile, ArtifactError> {
        let path = self.directory.join(&name);
        let size = content.len() as u64;

        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&target, &content))
            .await
            .map_err(|e| ArtifactError::Io(std::io::Error::other(format!("join error: {}", e))))??;

        debug!(path = %path.display(), size, "Wrote artifact");
        Ok(StoredFile {
            id,
            name,
            content_type: content_type.to_string(),
            size,
            path,
        })
    }
}

/// Write `content` to a sibling temp file, then rename it onto `target`.
/// The temp file is removed if either step fails.
fn write_atomically(target: &Path, content: &[u8]) -> std::io::Result<()> {
    let temp_path = target.with_extension("tmp");
    let result = std::fs::write(&temp_path, content)
        .and_then(|()| std::fs::rename(&temp_path, target));
    if result.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }
    result
}

#[async_trait]
impl ArtifactWriter for FileArtifactWriter {
    async fn write_snapshot(&self) -> Result<StoredFile, ArtifactError> {
        let rows = self.source.rows().await?;
        let mut content = Vec::new();
        for row in &rows {
            serde_json::to_writer(&mut content, row)?;
            content.push(b'\n');
        }

        let (id, name) = Self::file_name("backup", "jsonl");
        let file = self.write(id, name, SNAPSHOT_CONTENT_TYPE, content).await?;
        info!(file = %file.name, rows = rows.len(), "Dataset snapshot written");
        Ok(file)
    }

    async fn write_error_trace(
        &self,
        error: &(dyn std::error::Error + Send + Sync),
    ) -> Result<StoredFile, ArtifactError> {
        let content = format!(
            "recorded_at: {}\n{}\n",
            Utc::now().to_rfc3339(),
            render_error_chain(error)
        );
        let (id, name) = Self::file_name("backup-error", "log");
        self.write(id, name, ERROR_TRACE_CONTENT_TYPE, content.into_bytes())
            .await
    }
}

impl std::fmt::Debug for FileArtifactWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileArtifactWriter")
            .field("directory", &self.directory)
            .finish_non_exhaustive()
    }
}
