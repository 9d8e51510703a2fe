//! Schema migration engine for SQLite

use rusqlite::{Connection, params};

use snapkeeper_core::StoreError;

use super::pool::SqlitePool;

/// Migration engine for SQLite
pub struct MigrationEngine {
    migrations: Vec<Migration>,
}

/// Individual migration definition
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub description: String,
    pub up: String,
}

impl Default for MigrationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationEngine {
    pub fn new() -> Self {
        Self {
            migrations: Self::default_migrations(),
        }
    }

    fn default_migrations() -> Vec<Migration> {
        vec![
            Migration {
                version: 1,
                description: "Create backup history table".to_string(),
                up: r#"
                    CREATE TABLE IF NOT EXISTS backups (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        triggered_by TEXT NOT NULL,
                        status TEXT NOT NULL
                            CHECK (status IN ('IN_PROGRESS', 'COMPLETED', 'FAILED', 'SKIPPED')),
                        started_at TEXT NOT NULL,
                        ended_at TEXT,
                        result_file TEXT
                    );

                    -- At most one backup may hold the in-progress marker.
                    CREATE UNIQUE INDEX IF NOT EXISTS idx_backups_single_in_progress
                        ON backups(status) WHERE status = 'IN_PROGRESS';
                    CREATE INDEX IF NOT EXISTS idx_backups_started
                        ON backups(started_at DESC, id DESC);
                    CREATE INDEX IF NOT EXISTS idx_backups_status_ended
                        ON backups(status, ended_at);
                "#
                .to_string(),
            },
            Migration {
                version: 2,
                description: "Create dataset table".to_string(),
                up: r#"
                    CREATE TABLE IF NOT EXISTS dataset_records (
                        key TEXT PRIMARY KEY,
                        payload TEXT NOT NULL,
                        updated_at TEXT NOT NULL
                    );

                    CREATE INDEX IF NOT EXISTS idx_dataset_updated_at
                        ON dataset_records(updated_at);
                "#
                .to_string(),
            },
        ]
    }

    pub fn latest_version(&self) -> u32 {
        self.migrations.iter().map(|m| m.version).max().unwrap_or(0)
    }

    /// Version recorded in `schema_migrations`, 0 for a fresh database.
    pub fn current_version(&self, conn: &Connection) -> Result<u32, StoreError> {
        conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| SqlitePool::store_error("Failed to read schema version", &e))
    }

    /// Apply every pending migration.
    pub fn migrate(&self, conn: &Connection) -> Result<(), StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            )",
            [],
        )
        .map_err(|e| SqlitePool::store_error("Failed to create migrations table", &e))?;

        let current_version = self.current_version(conn)?;
        for migration in &self.migrations {
            if migration.version > current_version {
                self.apply_migration(conn, migration)?;
            }
        }

        Ok(())
    }

    fn apply_migration(&self, conn: &Connection, migration: &Migration) -> Result<(), StoreError> {
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| SqlitePool::store_error("Failed to start migration transaction", &e))?;

        tx.execute_batch(&migration.up).map_err(|e| {
            SqlitePool::store_error(&format!("Migration {} failed", migration.version), &e)
        })?;

        tx.execute(
            "INSERT INTO schema_migrations (version, description) VALUES (?1, ?2)",
            params![migration.version, migration.description],
        )
        .map_err(|e| {
            SqlitePool::store_error(
                &format!("Failed to record migration {}", migration.version),
                &e,
            )
        })?;

        tx.commit().map_err(|e| {
            SqlitePool::store_error(
                &format!("Failed to commit migration {}", migration.version),
                &e,
            )
        })?;

        tracing::info!(
            version = migration.version,
            description = %migration.description,
            "Applied schema migration"
        );
        Ok(())
    }
}
