//! Cursor-paginated views over backup history.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cursor::CursorCodec;
use crate::error::{BackupError, BackupResult};
use crate::record::{BackupId, BackupRecord};
use crate::store::{BackupFilter, BackupRecordStore, SeekPosition};

/// Page size limits applied to searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryConfig {
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_page_size: 10,
            max_page_size: 100,
        }
    }
}

/// One history search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(flatten)]
    pub filter: BackupFilter,
    /// Token from a previous page's `next_cursor`
    pub cursor: Option<String>,
    /// Tie-break from a previous page's `next_id_after`
    pub id_after: Option<BackupId>,
    pub size: Option<usize>,
}

impl SearchRequest {
    pub fn new(filter: BackupFilter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    pub fn with_id_after(mut self, id: BackupId) -> Self {
        self.id_after = Some(id);
        self
    }

    /// Request for the page following `page`, same filter and size.
    pub fn next_page(&self, page: &BackupPage) -> Option<Self> {
        if !page.has_next {
            return None;
        }
        Some(Self {
            filter: self.filter.clone(),
            cursor: page.next_cursor.clone(),
            id_after: page.next_id_after,
            size: self.size,
        })
    }
}

/// A page of backup history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupPage {
    pub content: Vec<BackupRecord>,
    pub next_cursor: Option<String>,
    pub next_id_after: Option<BackupId>,
    /// Number of records in `content`
    pub size: usize,
    pub total_elements: u64,
    /// True iff the page is full; the last full page reports a phantom next.
    pub has_next: bool,
}

/// Builds cursor-paginated pages over a [`BackupRecordStore`].
#[derive(Clone)]
pub struct BackupQueryService {
    store: Arc<dyn BackupRecordStore>,
    config: QueryConfig,
}

impl BackupQueryService {
    pub fn new(store: Arc<dyn BackupRecordStore>) -> Self {
        Self::with_config(store, QueryConfig::default())
    }

    pub fn with_config(store: Arc<dyn BackupRecordStore>, config: QueryConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> QueryConfig {
        self.config
    }

    pub async fn search(&self, request: &SearchRequest) -> BackupResult<BackupPage> {
        let page_size = self.page_size(request.size)?;
        let position = Self::position(request)?;

        let content = self
            .store
            .search(&request.filter, position, page_size)
            .await?;
        let total_elements = self.store.count(&request.filter).await?;

        let last = content.last();
        let next_cursor = last.map(|r| CursorCodec::encode(r.started_at()));
        let next_id_after = last.map(|r| r.id());
        let size = content.len();
        debug!(size, total_elements, "Backup history page built");

        Ok(BackupPage {
            has_next: size == page_size,
            content,
            next_cursor,
            next_id_after,
            size,
            total_elements,
        })
    }

    fn page_size(&self, requested: Option<usize>) -> BackupResult<usize> {
        let size = requested.unwrap_or(self.config.default_page_size);
        if size == 0 || size > self.config.max_page_size {
            return Err(BackupError::InvalidRequest(format!(
                "page size must be between 1 and {}, got {}",
                self.config.max_page_size, size
            )));
        }
        Ok(size)
    }

    fn position(request: &SearchRequest) -> BackupResult<Option<SeekPosition>> {
        match (&request.cursor, request.id_after) {
            (None, None) => Ok(None),
            (None, Some(_)) => Err(BackupError::InvalidRequest(
                "id_after requires a cursor".to_string(),
            )),
            (Some(token), id_after) => {
                let position = SeekPosition::new(CursorCodec::decode(token)?);
                Ok(Some(match id_after {
                    Some(id) => position.with_id(id),
                    None => position,
                }))
            }
        }
    }
}

impl std::fmt::Debug for BackupQueryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupQueryService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
