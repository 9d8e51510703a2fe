//! History search and cursor pagination
//!
//! Every scenario runs against both record stores so the SQL and in-memory
//! seek semantics stay identical.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rstest::rstest;
use snapkeeper_core::{
    BackupError, BackupFilter, BackupId, BackupQueryService, BackupRecord, BackupRecordStore,
    BackupStatus, CursorCodec, QueryConfig, SearchRequest,
};
use snapkeeper_store::{InMemoryBackupStore, SqliteBackupStore};
use snapkeeper_testing::stored_file;
use tempfile::TempDir;

#[derive(Debug, Clone, Copy)]
enum Backend {
    InMemory,
    Sqlite,
}

/// Keeps the SQLite directory alive for the duration of a test.
struct Fixture {
    _dir: Option<TempDir>,
    store: Arc<dyn BackupRecordStore>,
}

fn open(backend: Backend) -> Fixture {
    match backend {
        Backend::InMemory => Fixture {
            _dir: None,
            store: InMemoryBackupStore::shared(),
        },
        Backend::Sqlite => {
            let dir = TempDir::new().expect("Failed to create temp directory");
            let store = SqliteBackupStore::open(dir.path().join("history.db"))
                .expect("Failed to open SQLite store");
            Fixture {
                _dir: Some(dir),
                store: Arc::new(store),
            }
        }
    }
}

/// Record one finished backup through the store contract.
async fn record(
    store: &Arc<dyn BackupRecordStore>,
    requester: &str,
    started_at: DateTime<Utc>,
    status: BackupStatus,
) -> BackupRecord {
    let mut record = store.begin(requester, started_at).await.unwrap();
    let ended_at = started_at + Duration::seconds(1);
    match status {
        BackupStatus::Completed => record.complete(stored_file("snapshot.jsonl"), ended_at),
        BackupStatus::Failed => record.fail(stored_file("error.log"), ended_at),
        BackupStatus::Skipped => record.skip(ended_at),
        BackupStatus::InProgress => return record,
    }
    .unwrap();
    store.save(&record).await.unwrap();
    record
}

/// `count` completed backups started one minute apart, oldest first.
async fn history(store: &Arc<dyn BackupRecordStore>, count: usize) -> Vec<BackupRecord> {
    let base = Utc::now() - Duration::days(1);
    let mut records = Vec::new();
    for i in 0..count {
        let started_at = base + Duration::minutes(i as i64);
        records.push(record(store, "10.0.0.1", started_at, BackupStatus::Completed).await);
    }
    records
}

fn ids(records: &[BackupRecord]) -> Vec<i64> {
    records.iter().map(|r| r.id().get()).collect()
}

#[rstest]
#[case::in_memory(Backend::InMemory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test(flavor = "multi_thread")]
async fn test_first_page_is_newest_first(#[case] backend: Backend) {
    let fx = open(backend);
    let records = history(&fx.store, 5).await;
    let service = BackupQueryService::new(fx.store.clone());

    let page = service
        .search(&SearchRequest::default().with_size(2))
        .await
        .unwrap();

    assert_eq!(ids(&page.content), vec![5, 4]);
    assert_eq!(page.size, 2);
    assert_eq!(page.total_elements, 5);
    assert!(page.has_next);
    assert_eq!(
        page.next_cursor,
        Some(CursorCodec::encode(records[3].started_at()))
    );
    assert_eq!(page.next_id_after, Some(records[3].id()));
}

#[rstest]
#[case::in_memory(Backend::InMemory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test(flavor = "multi_thread")]
async fn test_walking_pages_visits_every_record_once(#[case] backend: Backend) {
    let fx = open(backend);
    history(&fx.store, 5).await;
    let service = BackupQueryService::new(fx.store.clone());

    let mut request = SearchRequest::default().with_size(2);
    let mut seen = Vec::new();
    let mut pages = 0;
    loop {
        let page = service.search(&request).await.unwrap();
        pages += 1;
        seen.extend(ids(&page.content));
        match request.next_page(&page) {
            Some(next) => request = next,
            None => break,
        }
    }

    assert_eq!(seen, vec![5, 4, 3, 2, 1]);
    assert_eq!(pages, 3);
}

#[rstest]
#[case::in_memory(Backend::InMemory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test(flavor = "multi_thread")]
async fn test_exact_multiple_reports_phantom_next_page(#[case] backend: Backend) {
    let fx = open(backend);
    history(&fx.store, 4).await;
    let service = BackupQueryService::new(fx.store.clone());

    let first = service
        .search(&SearchRequest::default().with_size(2))
        .await
        .unwrap();
    let second = service
        .search(&SearchRequest::default().with_size(2).next_page(&first).unwrap())
        .await
        .unwrap();
    assert!(second.has_next);

    let third = service
        .search(&SearchRequest::default().with_size(2).next_page(&second).unwrap())
        .await
        .unwrap();
    assert!(third.content.is_empty());
    assert!(!third.has_next);
    assert_eq!(third.next_cursor, None);
    assert_eq!(third.next_id_after, None);
    assert_eq!(third.total_elements, 4);
}

#[rstest]
#[case::in_memory(Backend::InMemory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test(flavor = "multi_thread")]
async fn test_identical_start_times_need_id_tie_break(#[case] backend: Backend) {
    let fx = open(backend);
    let started_at = Utc::now() - Duration::hours(1);
    for _ in 0..4 {
        record(&fx.store, "batch", started_at, BackupStatus::Skipped).await;
    }
    let service = BackupQueryService::new(fx.store.clone());

    let first = service
        .search(&SearchRequest::default().with_size(2))
        .await
        .unwrap();
    assert_eq!(ids(&first.content), vec![4, 3]);

    // Timestamp alone skips the records sharing it.
    let cursor_only = SearchRequest::default()
        .with_size(2)
        .with_cursor(first.next_cursor.clone().unwrap());
    assert!(service.search(&cursor_only).await.unwrap().content.is_empty());

    let with_tie_break = cursor_only.with_id_after(first.next_id_after.unwrap());
    let second = service.search(&with_tie_break).await.unwrap();
    assert_eq!(ids(&second.content), vec![2, 1]);
}

#[rstest]
#[case::in_memory(Backend::InMemory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test(flavor = "multi_thread")]
async fn test_filters_apply_to_content_and_total(#[case] backend: Backend) {
    let fx = open(backend);
    let base = Utc::now() - Duration::hours(10);
    record(&fx.store, "10.0.0.1", base, BackupStatus::Completed).await;
    record(&fx.store, "10.0.0.2", base + Duration::hours(1), BackupStatus::Skipped).await;
    record(&fx.store, "192.168.0.9", base + Duration::hours(2), BackupStatus::Completed).await;
    record(&fx.store, "10.0.0.1", base + Duration::hours(3), BackupStatus::Failed).await;
    let service = BackupQueryService::new(fx.store.clone());

    let by_requester = service
        .search(&SearchRequest::new(BackupFilter::new().with_triggered_by("10.0.0")))
        .await
        .unwrap();
    assert_eq!(ids(&by_requester.content), vec![4, 2, 1]);
    assert_eq!(by_requester.total_elements, 3);
    assert!(!by_requester.has_next);

    let completed = service
        .search(&SearchRequest::new(
            BackupFilter::new().with_status(BackupStatus::Completed),
        ))
        .await
        .unwrap();
    assert_eq!(ids(&completed.content), vec![3, 1]);

    let window = service
        .search(&SearchRequest::new(BackupFilter::new().started_between(
            base + Duration::hours(1),
            base + Duration::hours(2),
        )))
        .await
        .unwrap();
    assert_eq!(ids(&window.content), vec![3, 2]);
    assert_eq!(window.total_elements, 2);
}

#[rstest]
#[case::in_memory(Backend::InMemory)]
#[case::sqlite(Backend::Sqlite)]
#[tokio::test(flavor = "multi_thread")]
async fn test_in_progress_records_are_listed(#[case] backend: Backend) {
    let fx = open(backend);
    history(&fx.store, 2).await;
    record(&fx.store, "runner", Utc::now(), BackupStatus::InProgress).await;
    let service = BackupQueryService::new(fx.store.clone());

    let page = service.search(&SearchRequest::default()).await.unwrap();

    assert_eq!(page.content[0].status(), BackupStatus::InProgress);
    assert_eq!(page.total_elements, 3);
}

mod validation_tests {
    use super::*;

    fn service() -> BackupQueryService {
        BackupQueryService::with_config(
            InMemoryBackupStore::shared(),
            QueryConfig {
                default_page_size: 10,
                max_page_size: 50,
            },
        )
    }

    #[tokio::test]
    async fn test_tampered_cursor_rejected() {
        let mut cursor = CursorCodec::encode(Utc::now());
        let flipped = if cursor.ends_with('A') { 'B' } else { 'A' };
        cursor.pop();
        cursor.push(flipped);

        let err = service()
            .search(&SearchRequest::default().with_cursor(cursor))
            .await
            .unwrap_err();

        assert!(matches!(err, BackupError::InvalidCursor(_)));
        assert_eq!(err.error_code(), "INVALID_CURSOR");
    }

    #[tokio::test]
    async fn test_garbage_cursor_rejected() {
        let err = service()
            .search(&SearchRequest::default().with_cursor("not a cursor!"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::InvalidCursor(_)));
    }

    #[tokio::test]
    async fn test_id_after_requires_cursor() {
        let err = service()
            .search(&SearchRequest::default().with_id_after(BackupId::new(3)))
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::InvalidRequest(_)));
    }

    #[rstest]
    #[case(0)]
    #[case(51)]
    #[tokio::test]
    async fn test_page_size_out_of_range(#[case] size: usize) {
        let err = service()
            .search(&SearchRequest::default().with_size(size))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn test_empty_history_page() {
        let page = service().search(&SearchRequest::default()).await.unwrap();

        assert!(page.content.is_empty());
        assert_eq!(page.size, 0);
        assert_eq!(page.total_elements, 0);
        assert!(!page.has_next);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn test_page_serializes_camel_case() {
        let page = snapkeeper_core::BackupPage {
            content: Vec::new(),
            next_cursor: None,
            next_id_after: None,
            size: 0,
            total_elements: 0,
            has_next: false,
        };
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["totalElements"], 0);
        assert_eq!(json["hasNext"], false);
        assert!(json["nextCursor"].is_null());
    }
}
