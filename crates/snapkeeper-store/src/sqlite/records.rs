//! BackupRecordStore implementation for SqliteBackupStore

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{
    Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior, params, params_from_iter,
};

use snapkeeper_core::{
    BackupFilter, BackupId, BackupRecord, BackupRecordStore, BackupStatus, SeekPosition,
    StoreError, StoredFile,
};

use super::pool::SqlitePool;
use super::{SqliteBackupStore, format_timestamp, parse_timestamp};

const COLUMNS: &str = "id, triggered_by, status, started_at, ended_at, result_file";

/// Columns exactly as stored, before validation.
struct RawRecord {
    id: i64,
    triggered_by: String,
    status: String,
    started_at: String,
    ended_at: Option<String>,
    result_file: Option<String>,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            triggered_by: row.get(1)?,
            status: row.get(2)?,
            started_at: row.get(3)?,
            ended_at: row.get(4)?,
            result_file: row.get(5)?,
        })
    }

    fn into_record(self) -> Result<BackupRecord, StoreError> {
        let status: BackupStatus = self.status.parse().map_err(StoreError::Corrupt)?;
        let ended_at = self.ended_at.as_deref().map(parse_timestamp).transpose()?;
        let result_file = self
            .result_file
            .as_deref()
            .map(serde_json::from_str::<StoredFile>)
            .transpose()
            .map_err(|e| StoreError::Corrupt(format!("invalid result file: {}", e)))?;

        BackupRecord::restore(
            BackupId::new(self.id),
            self.triggered_by,
            status,
            parse_timestamp(&self.started_at)?,
            ended_at,
            result_file,
        )
        .map_err(|e| StoreError::Corrupt(e.to_string()))
    }
}

fn query_records(
    conn: &Connection,
    sql: &str,
    values: &[Value],
) -> Result<Vec<BackupRecord>, StoreError> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| SqlitePool::store_error("Failed to prepare backup query", &e))?;
    let rows = stmt
        .query_map(params_from_iter(values.iter()), RawRecord::from_row)
        .map_err(|e| SqlitePool::store_error("Failed to query backups", &e))?;

    let mut records = Vec::new();
    for row in rows {
        let raw = row.map_err(|e| SqlitePool::store_error("Failed to read backup row", &e))?;
        records.push(raw.into_record()?);
    }
    Ok(records)
}

fn in_progress_id(conn: &Connection) -> Result<Option<BackupId>, StoreError> {
    conn.query_row(
        "SELECT id FROM backups WHERE status = 'IN_PROGRESS' LIMIT 1",
        [],
        |row| row.get::<_, i64>(0),
    )
    .optional()
    .map(|id| id.map(BackupId::new))
    .map_err(|e| SqlitePool::store_error("Failed to look up in-progress backup", &e))
}

/// WHERE clause and bound values for a filter plus optional seek position.
fn where_clause(filter: &BackupFilter, position: Option<SeekPosition>) -> (String, Vec<Value>) {
    let mut conditions: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(requester) = &filter.triggered_by {
        values.push(Value::Text(requester.clone()));
        conditions.push(format!("instr(triggered_by, ?{}) > 0", values.len()));
    }
    if let Some(status) = filter.status {
        values.push(Value::Text(status.as_str().to_string()));
        conditions.push(format!("status = ?{}", values.len()));
    }
    if let Some(from) = filter.started_from {
        values.push(Value::Text(format_timestamp(from)));
        conditions.push(format!("started_at >= ?{}", values.len()));
    }
    if let Some(to) = filter.started_to {
        values.push(Value::Text(format_timestamp(to)));
        conditions.push(format!("started_at <= ?{}", values.len()));
    }
    if let Some(position) = position {
        values.push(Value::Text(format_timestamp(position.started_before)));
        let ts = values.len();
        match position.id_before {
            Some(id) => {
                values.push(Value::Integer(id.get()));
                conditions.push(format!(
                    "(started_at < ?{ts} OR (started_at = ?{ts} AND id < ?{}))",
                    values.len()
                ));
            }
            None => conditions.push(format!("started_at < ?{ts}")),
        }
    }

    if conditions.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), values)
    }
}

#[async_trait]
impl BackupRecordStore for SqliteBackupStore {
    async fn begin(
        &self,
        triggered_by: &str,
        started_at: DateTime<Utc>,
    ) -> Result<BackupRecord, StoreError> {
        let triggered_by = triggered_by.to_string();
        Self::with_connection(&self.pool, move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| SqlitePool::store_error("Failed to begin transaction", &e))?;

            if let Some(existing) = in_progress_id(&tx)? {
                return Err(StoreError::InProgressConflict { existing });
            }

            let inserted = tx.execute(
                "INSERT INTO backups (triggered_by, status, started_at)
                 VALUES (?1, 'IN_PROGRESS', ?2)",
                params![triggered_by, format_timestamp(started_at)],
            );
            match inserted {
                Ok(_) => {}
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    let existing = in_progress_id(&tx)?.unwrap_or(BackupId::new(0));
                    return Err(StoreError::InProgressConflict { existing });
                }
                Err(e) => return Err(SqlitePool::store_error("Failed to insert backup", &e)),
            }

            let id = BackupId::new(tx.last_insert_rowid());
            tx.commit()
                .map_err(|e| SqlitePool::store_error("Failed to commit backup insert", &e))?;

            tracing::debug!(backup_id = %id, "Created in-progress backup record");
            Ok(BackupRecord::in_progress(id, triggered_by, started_at))
        })
        .await
    }

    async fn save(&self, record: &BackupRecord) -> Result<(), StoreError> {
        let id = record.id();
        let status = record.status().as_str();
        let ended_at = record.ended_at().map(format_timestamp);
        let result_file = record
            .result_file()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Corrupt(format!("unserializable result file: {}", e)))?;

        Self::with_connection(&self.pool, move |conn| {
            let updated = conn
                .execute(
                    "UPDATE backups SET status = ?1, ended_at = ?2, result_file = ?3
                     WHERE id = ?4 AND status = 'IN_PROGRESS'",
                    params![status, ended_at, result_file, id.get()],
                )
                .map_err(|e| SqlitePool::store_error("Failed to update backup", &e))?;
            if updated == 1 {
                return Ok(());
            }

            let exists = conn
                .query_row("SELECT 1 FROM backups WHERE id = ?1", params![id.get()], |_| Ok(()))
                .optional()
                .map_err(|e| SqlitePool::store_error("Failed to look up backup", &e))?
                .is_some();
            if exists {
                Err(StoreError::AlreadyFinalized(id))
            } else {
                Err(StoreError::RecordNotFound(id))
            }
        })
        .await
    }

    async fn find_in_progress(&self) -> Result<Option<BackupRecord>, StoreError> {
        Self::with_connection(&self.pool, |conn| {
            let sql = format!(
                "SELECT {} FROM backups WHERE status = 'IN_PROGRESS' LIMIT 1",
                COLUMNS
            );
            Ok(query_records(conn, &sql, &[])?.into_iter().next())
        })
        .await
    }

    async fn find_latest_by_status(
        &self,
        status: BackupStatus,
    ) -> Result<Option<BackupRecord>, StoreError> {
        Self::with_connection(&self.pool, move |conn| {
            let sql = format!(
                "SELECT {} FROM backups WHERE status = ?1 ORDER BY ended_at DESC, id DESC LIMIT 1",
                COLUMNS
            );
            let values = [Value::Text(status.as_str().to_string())];
            Ok(query_records(conn, &sql, &values)?.into_iter().next())
        })
        .await
    }

    async fn search(
        &self,
        filter: &BackupFilter,
        position: Option<SeekPosition>,
        limit: usize,
    ) -> Result<Vec<BackupRecord>, StoreError> {
        let (clause, mut values) = where_clause(filter, position);
        Self::with_connection(&self.pool, move |conn| {
            values.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
            let sql = format!(
                "SELECT {} FROM backups{} ORDER BY started_at DESC, id DESC LIMIT ?{}",
                COLUMNS,
                clause,
                values.len()
            );
            query_records(conn, &sql, &values)
        })
        .await
    }

    async fn count(&self, filter: &BackupFilter) -> Result<u64, StoreError> {
        let (clause, values) = where_clause(filter, None);
        Self::with_connection(&self.pool, move |conn| {
            let sql = format!("SELECT COUNT(*) FROM backups{}", clause);
            let count: i64 = conn
                .query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))
                .map_err(|e| SqlitePool::store_error("Failed to count backups", &e))?;
            Ok(count.max(0) as u64)
        })
        .await
    }
}
