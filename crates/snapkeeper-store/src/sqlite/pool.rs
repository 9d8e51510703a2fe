//! Connection pool for SQLite with thread-safe resource management

use rusqlite::Connection;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use snapkeeper_core::StoreError;

/// Connection pool for SQLite with configurable size and thread safety
pub struct SqlitePool {
    available_connections: Arc<Mutex<Vec<Connection>>>,
    connection_returned: Arc<Condvar>,
    path: PathBuf,
    pool_size: usize,
    config: ConnectionConfig,
    active_connections: Arc<Mutex<usize>>,
}

/// Configuration for SQLite connections
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub wal_mode: bool,
    pub cache_size_kb: i32,
    pub busy_timeout_ms: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            wal_mode: true,
            cache_size_kb: 16 * 1024,
            busy_timeout_ms: 5000,
        }
    }
}

impl SqlitePool {
    /// Only `.db`, `.sqlite` and `.sqlite3` files are accepted.
    fn validate_database_path(path: &Path) -> Result<PathBuf, StoreError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("db" | "sqlite" | "sqlite3") => Ok(path.to_path_buf()),
            Some(_) => Err(StoreError::Unavailable(
                "Invalid database path: only .db, .sqlite, and .sqlite3 files allowed".to_string(),
            )),
            None => Err(StoreError::Unavailable(
                "Invalid database path: file extension required".to_string(),
            )),
        }
    }

    /// Sanitize error messages to prevent information disclosure
    pub(crate) fn sanitize_error(error: &rusqlite::Error) -> String {
        match error {
            rusqlite::Error::QueryReturnedNoRows => "No rows returned".to_string(),
            rusqlite::Error::InvalidColumnIndex(_) => "Invalid column index".to_string(),
            rusqlite::Error::InvalidColumnName(_) => "Invalid column name".to_string(),
            rusqlite::Error::InvalidPath(_) => "Invalid database path".to_string(),
            rusqlite::Error::InvalidColumnType(_, _, _) => "Invalid column type".to_string(),
            rusqlite::Error::SqliteFailure(err, _) => format!("SQLite failure ({:?})", err.code),
            _ => "Database operation failed".to_string(),
        }
    }

    /// Map a rusqlite error into a store error with context.
    pub(crate) fn store_error(context: &str, error: &rusqlite::Error) -> StoreError {
        StoreError::Unavailable(format!("{}: {}", context, Self::sanitize_error(error)))
    }

    /// Create a new connection pool with the specified size
    pub fn new(path: impl AsRef<Path>, pool_size: usize) -> Result<Self, StoreError> {
        Self::with_config(path, pool_size, ConnectionConfig::default())
    }

    pub fn with_config(
        path: impl AsRef<Path>,
        pool_size: usize,
        config: ConnectionConfig,
    ) -> Result<Self, StoreError> {
        let path = Self::validate_database_path(path.as_ref())?;
        let pool_size = pool_size.max(1);

        let mut available = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            available.push(Self::create_connection(&path, &config)?);
        }

        Ok(Self {
            available_connections: Arc::new(Mutex::new(available)),
            connection_returned: Arc::new(Condvar::new()),
            path,
            pool_size,
            config,
            active_connections: Arc::new(Mutex::new(0)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create a new SQLite connection with WAL mode and optimizations
    fn create_connection(path: &Path, config: &ConnectionConfig) -> Result<Connection, StoreError> {
        let conn = Connection::open(path)
            .map_err(|e| Self::store_error("Failed to open database", &e))?;

        let cache_pragma = format!("PRAGMA cache_size = -{};", config.cache_size_kb);
        let timeout_pragma = format!("PRAGMA busy_timeout = {};", config.busy_timeout_ms);

        let mut pragmas = Vec::new();
        if config.wal_mode {
            pragmas.push("PRAGMA journal_mode = WAL;");
        }
        pragmas.push("PRAGMA synchronous = NORMAL;");
        pragmas.push(&cache_pragma);
        pragmas.push(&timeout_pragma);
        pragmas.push("PRAGMA foreign_keys = ON;");

        conn.execute_batch(&pragmas.join("\n"))
            .map_err(|e| Self::store_error("Failed to configure SQLite", &e))?;

        Ok(conn)
    }

    fn lock_error<T>(what: &str, e: std::sync::PoisonError<T>) -> StoreError {
        StoreError::Unavailable(format!("Failed to lock {}: {}", what, e))
    }

    /// Get a connection from the pool, opening a new one while under the size limit.
    ///
    /// When every connection is checked out, waits up to `busy_timeout_ms`
    /// for one to be returned.
    pub fn acquire(&self) -> Result<PooledConnection, StoreError> {
        let wait = Duration::from_millis(u64::from(self.config.busy_timeout_ms));
        let deadline = Instant::now() + wait;
        let mut available = self
            .available_connections
            .lock()
            .map_err(|e| Self::lock_error("connection pool", e))?;

        let conn = loop {
            if let Some(conn) = available.pop() {
                break conn;
            }

            let active_count = *self
                .active_connections
                .lock()
                .map_err(|e| Self::lock_error("active connection counter", e))?;
            if active_count < self.pool_size {
                break Self::create_connection(&self.path, &self.config)?;
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(StoreError::Unavailable(format!(
                    "connection pool exhausted: {} active connections (max: {})",
                    active_count, self.pool_size
                )));
            }
            available = self
                .connection_returned
                .wait_timeout(available, deadline - now)
                .map_err(|e| Self::lock_error("connection pool", e))?
                .0;
        };

        *self
            .active_connections
            .lock()
            .map_err(|e| Self::lock_error("active connection counter", e))? += 1;

        Ok(PooledConnection {
            connection: Some(conn),
            pool: Arc::clone(&self.available_connections),
            returned: Arc::clone(&self.connection_returned),
            pool_size: self.pool_size,
            active_connections: Arc::clone(&self.active_connections),
        })
    }

    /// Number of idle and total connections.
    pub fn health_check(&self) -> Result<PoolHealth, StoreError> {
        let idle = self
            .available_connections
            .lock()
            .map_err(|e| Self::lock_error("pool for health check", e))?
            .len();
        let active = *self
            .active_connections
            .lock()
            .map_err(|e| Self::lock_error("active connection counter", e))?;

        Ok(PoolHealth {
            idle_connections: idle,
            active_connections: active,
            pool_size: self.pool_size,
        })
    }
}

/// Snapshot of pool usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolHealth {
    pub idle_connections: usize,
    pub active_connections: usize,
    pub pool_size: usize,
}

/// RAII wrapper for pooled connections that returns connection to pool on drop
#[derive(Debug)]
pub struct PooledConnection {
    connection: Option<Connection>,
    pool: Arc<Mutex<Vec<Connection>>>,
    returned: Arc<Condvar>,
    pool_size: usize,
    active_connections: Arc<Mutex<usize>>,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        self.connection
            .as_ref()
            .expect("BUG: PooledConnection has None connection (this should never happen)")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection
            .as_mut()
            .expect("BUG: PooledConnection has None connection (this should never happen)")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.connection.take() {
            if let (Ok(mut available), Ok(mut active_count)) =
                (self.pool.lock(), self.active_connections.lock())
            {
                *active_count = active_count.saturating_sub(1);
                if available.len() < self.pool_size {
                    available.push(conn);
                    self.returned.notify_one();
                } else {
                    tracing::warn!(
                        "Pool is full when returning connection. Available: {}, Pool size: {}",
                        available.len(),
                        self.pool_size
                    );
                }
            } else {
                tracing::error!("Failed to lock pool for connection return, connection dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unknown_extension() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(SqlitePool::new(temp_dir.path().join("history.txt"), 1).is_err());
        assert!(SqlitePool::new(temp_dir.path().join("history"), 1).is_err());
    }

    #[test]
    fn test_connections_return_to_pool() {
        let temp_dir = tempfile::tempdir().unwrap();
        let pool = SqlitePool::new(temp_dir.path().join("pool.db"), 2).unwrap();

        {
            let _a = pool.acquire().unwrap();
            let _b = pool.acquire().unwrap();
            let health = pool.health_check().unwrap();
            assert_eq!(health.active_connections, 2);
            assert_eq!(health.idle_connections, 0);
        }

        let health = pool.health_check().unwrap();
        assert_eq!(health.active_connections, 0);
        assert_eq!(health.idle_connections, 2);
    }

    fn short_wait_pool(dir: &tempfile::TempDir, size: usize) -> SqlitePool {
        let config = ConnectionConfig {
            busy_timeout_ms: 100,
            ..ConnectionConfig::default()
        };
        SqlitePool::with_config(dir.path().join("pool.db"), size, config).unwrap()
    }

    #[test]
    fn test_exhausted_pool_times_out() {
        let temp_dir = tempfile::tempdir().unwrap();
        let pool = short_wait_pool(&temp_dir, 1);

        let _held = pool.acquire().unwrap();
        let started = Instant::now();
        let err = pool.acquire().unwrap_err();

        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(err.to_string().contains("connection pool exhausted"));
    }

    #[test]
    fn test_acquire_waits_for_returned_connection() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = ConnectionConfig {
            busy_timeout_ms: 5_000,
            ..ConnectionConfig::default()
        };
        let pool = SqlitePool::with_config(temp_dir.path().join("pool.db"), 1, config).unwrap();

        let held = pool.acquire().unwrap();
        let releaser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            drop(held);
        });

        let conn = pool.acquire().unwrap();
        let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0)).unwrap();
        assert_eq!(one, 1);
        releaser.join().unwrap();
        assert_eq!(pool.health_check().unwrap().active_connections, 1);
    }
}
