use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde_json::json;
use snapkeeper_core::BackupStatus;

mod commands;
mod config;

use commands::{App, CliError, SearchArgs};
use config::{AppConfig, AppConfigBuilder, LogFormat};

#[derive(Parser, Debug)]
#[command(name = "snapkeeper", version)]
#[command(about = "Snapkeeper CLI - dataset backups with auditable history")]
struct Cli {
    /// SQLite database file (overrides SNAPKEEPER_DATABASE_PATH)
    #[arg(long, global = true)]
    database: Option<PathBuf>,
    /// Artifact directory (overrides SNAPKEEPER_ARTIFACT_DIR)
    #[arg(long, global = true)]
    artifact_dir: Option<PathBuf>,
    /// Log output format (overrides SNAPKEEPER_LOG_FORMAT)
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,
    /// Default log directive (overrides SNAPKEEPER_LOG_LEVEL)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a backup now
    Trigger {
        /// Identifier of whoever requested the backup
        #[arg(long)]
        requester: String,
    },
    /// Show the most recently finished backup with a status
    Latest {
        /// Status to look up (default: completed)
        #[arg(long)]
        status: Option<BackupStatus>,
    },
    /// Page through backup history, newest first
    Search {
        /// Substring of the requester identifier
        #[arg(long)]
        requester: Option<String>,
        #[arg(long)]
        status: Option<BackupStatus>,
        /// Inclusive lower bound on start time (RFC 3339)
        #[arg(long)]
        from: Option<DateTime<Utc>>,
        /// Inclusive upper bound on start time (RFC 3339)
        #[arg(long)]
        to: Option<DateTime<Utc>>,
        /// Cursor from a previous page
        #[arg(long)]
        cursor: Option<String>,
        /// Id tie-break from a previous page
        #[arg(long)]
        id_after: Option<i64>,
        /// Page size
        #[arg(long)]
        size: Option<usize>,
    },
    /// Mark an abandoned in-progress backup as failed
    Reconcile {
        /// Minimum age of the in-progress backup, e.g. "30m" (overrides SNAPKEEPER_STALE_AFTER)
        #[arg(long)]
        older_than: Option<humantime::Duration>,
    },
    /// Manage the dataset being backed up
    Dataset {
        #[command(subcommand)]
        dataset_command: DatasetCommands,
    },
}

#[derive(Subcommand, Debug)]
enum DatasetCommands {
    /// Insert or replace a row, touching its modification time
    Put {
        #[arg(long)]
        key: String,
        /// Row payload as JSON
        #[arg(long)]
        payload: String,
    },
}

fn load_config(cli: &Cli) -> Result<AppConfig, CliError> {
    let mut builder = AppConfigBuilder::from_env()?;
    if let Some(path) = &cli.database {
        builder = builder.database_path(path);
    }
    if let Some(dir) = &cli.artifact_dir {
        builder = builder.artifact_dir(dir);
    }
    if let Some(format) = cli.log_format {
        builder = builder.log_format(format);
    }
    if let Some(level) = &cli.log_level {
        builder = builder.log_level(level);
    }
    Ok(builder.build()?)
}

fn init_logging(config: &AppConfig) {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let env_filter = match config.log_level.parse() {
        Ok(directive) => env_filter.add_directive(directive),
        Err(_) => env_filter,
    };

    // Logs go to stderr; stdout carries command output.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    let _ = match config.log_format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
}

async fn run(cli: Cli, config: AppConfig) -> Result<serde_json::Value, CliError> {
    let app = App::open(&config)?;

    match cli.command {
        Commands::Trigger { requester } => app.trigger(&requester).await,
        Commands::Latest { status } => app.latest(status).await,
        Commands::Search {
            requester,
            status,
            from,
            to,
            cursor,
            id_after,
            size,
        } => {
            app.search(SearchArgs {
                requester,
                status,
                from,
                to,
                cursor,
                id_after,
                size,
            })
            .await
        }
        Commands::Reconcile { older_than } => app.reconcile(older_than.map(Into::into)).await,
        Commands::Dataset { dataset_command } => match dataset_command {
            DatasetCommands::Put { key, payload } => app.dataset_put(&key, &payload).await,
        },
    }
}

fn report(err: &CliError) -> ExitCode {
    let body = json!({ "error": err.error_code(), "message": err.to_string() });
    eprintln!("{}", body);
    ExitCode::FAILURE
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => return report(&err),
    };
    init_logging(&config);

    match run(cli, config).await {
        Ok(output) => match serde_json::to_string_pretty(&output) {
            Ok(text) => {
                println!("{}", text);
                ExitCode::SUCCESS
            }
            Err(err) => report(&CliError::Output(err)),
        },
        Err(err) => {
            tracing::error!(code = err.error_code(), error = %err, "Command failed");
            report(&err)
        }
    }
}
