//! # Environment-Based Configuration
//!
//! - `SNAPKEEPER_DATABASE_PATH` - SQLite database file (default: `snapkeeper.db`)
//! - `SNAPKEEPER_ARTIFACT_DIR` - Directory for snapshots and error traces (default: `artifacts`)
//! - `SNAPKEEPER_DEFAULT_PAGE_SIZE` - Page size when a search omits one (default: 10)
//! - `SNAPKEEPER_MAX_PAGE_SIZE` - Largest accepted page size (default: 100)
//! - `SNAPKEEPER_LOG_FORMAT` - `json` or `pretty` (default: `json`)
//! - `SNAPKEEPER_LOG_LEVEL` - Default tracing directive (default: `info`)
//! - `SNAPKEEPER_STALE_AFTER` - Age after which an in-progress backup may be
//!   reconciled (default: `6h`)

use std::str::FromStr;
use std::{env, path::PathBuf, time::Duration};

use snapkeeper_core::QueryConfig;

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid environment variable '{key}': {message}")]
    InvalidEnvVar { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(format!("expected 'json' or 'pretty', got '{}'", other)),
        }
    }
}

/// Resolved CLI configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub artifact_dir: PathBuf,
    pub query: QueryConfig,
    pub log_format: LogFormat,
    pub log_level: String,
    pub stale_after: Duration,
}

/// Builder for [`AppConfig`] with environment variable support
#[derive(Debug, Clone)]
pub struct AppConfigBuilder {
    database_path: PathBuf,
    artifact_dir: PathBuf,
    default_page_size: usize,
    max_page_size: usize,
    log_format: LogFormat,
    log_level: String,
    stale_after: Duration,
}

impl Default for AppConfigBuilder {
    fn default() -> Self {
        let query = QueryConfig::default();
        Self {
            database_path: PathBuf::from("snapkeeper.db"),
            artifact_dir: PathBuf::from("artifacts"),
            default_page_size: query.default_page_size,
            max_page_size: query.max_page_size,
            log_format: LogFormat::Json,
            log_level: "info".to_string(),
            stale_after: Duration::from_secs(6 * 60 * 60),
        }
    }
}

impl AppConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any environment variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut builder = Self::default();

        if let Some(path) = get_env_string("SNAPKEEPER_DATABASE_PATH") {
            builder = builder.database_path(path);
        }
        if let Some(dir) = get_env_string("SNAPKEEPER_ARTIFACT_DIR") {
            builder = builder.artifact_dir(dir);
        }
        if let Some(size) = get_env_usize("SNAPKEEPER_DEFAULT_PAGE_SIZE")? {
            builder = builder.default_page_size(size);
        }
        if let Some(size) = get_env_usize("SNAPKEEPER_MAX_PAGE_SIZE")? {
            builder = builder.max_page_size(size);
        }
        if let Some(format) = get_env_parsed::<LogFormat>("SNAPKEEPER_LOG_FORMAT")? {
            builder = builder.log_format(format);
        }
        if let Some(level) = get_env_string("SNAPKEEPER_LOG_LEVEL") {
            builder = builder.log_level(level);
        }
        if let Some(stale_after) = get_env_duration("SNAPKEEPER_STALE_AFTER")? {
            builder = builder.stale_after(stale_after);
        }

        Ok(builder)
    }

    #[must_use]
    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    #[must_use]
    pub fn artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = dir.into();
        self
    }

    #[must_use]
    pub fn default_page_size(mut self, size: usize) -> Self {
        self.default_page_size = size;
        self
    }

    #[must_use]
    pub fn max_page_size(mut self, size: usize) -> Self {
        self.max_page_size = size;
        self
    }

    #[must_use]
    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    #[must_use]
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    #[must_use]
    pub fn stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Validate configuration and build [`AppConfig`]
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if the configuration is invalid.
    pub fn build(self) -> Result<AppConfig, ConfigError> {
        self.validate()?;

        Ok(AppConfig {
            database_path: self.database_path,
            artifact_dir: self.artifact_dir,
            query: QueryConfig {
                default_page_size: self.default_page_size,
                max_page_size: self.max_page_size,
            },
            log_format: self.log_format,
            log_level: self.log_level,
            stale_after: self.stale_after,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_page_size == 0 {
            return Err(ConfigError::ValidationError(
                "default_page_size must be greater than 0".to_string(),
            ));
        }
        if self.max_page_size == 0 {
            return Err(ConfigError::ValidationError(
                "max_page_size must be greater than 0".to_string(),
            ));
        }
        if self.default_page_size > self.max_page_size {
            return Err(ConfigError::ValidationError(format!(
                "default_page_size ({}) must be <= max_page_size ({})",
                self.default_page_size, self.max_page_size
            )));
        }
        if self.stale_after.is_zero() {
            return Err(ConfigError::ValidationError(
                "stale_after must be greater than 0".to_string(),
            ));
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "database_path cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// Environment variable helper functions

fn get_env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn get_env_usize(key: &str) -> Result<Option<usize>, ConfigError> {
    match env::var(key) {
        Ok(val) => val
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("invalid usize value '{val}': {e}"),
            }),
        Err(_) => Ok(None),
    }
}

fn get_env_duration(key: &str) -> Result<Option<Duration>, ConfigError> {
    match env::var(key) {
        Ok(val) => humantime::parse_duration(val.trim())
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("invalid duration '{val}': {e}"),
            }),
        Err(_) => Ok(None),
    }
}

fn get_env_parsed<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr<Err = String>,
{
    match env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map(Some)
            .map_err(|message| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message,
            }),
        Err(_) => Ok(None),
    }
}
