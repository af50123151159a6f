//! jobq - single-node, file-backed job queue
//!
//! Main entry point for the jobq CLI and worker.

mod cli;
mod cmd_job;
mod cmd_worker;
mod report;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{debug, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use jobq_config::{Config, ConfigLoader, ConfigValidator, LoggingConfig, ValidationWarning};
use jobq_workqueue::{JobQueue, SqliteJobStore};

use crate::cli::{Cli, Commands};
use crate::cmd_job::{status, submit};
use crate::cmd_worker::run_worker;

/// Initialize tracing with console and optional file output.
///
/// Console output goes to stderr so command output on stdout stays clean.
fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);

    let file = if logging.file {
        std::fs::create_dir_all(&logging.dir)?;

        let file_appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("jobq")
            .filename_suffix("log")
            .max_log_files(30)
            .build(&logging.dir)?;

        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        // The guard flushes on drop; keep it for the process lifetime.
        static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
            std::sync::OnceLock::new();
        let _ = GUARD.set(guard);

        Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file)
        .init();

    Ok(())
}

/// Load, validate and anchor configuration. Returns validation warnings for
/// logging once tracing is up.
fn load_config(
    cli: &Cli,
    work_dir: &Path,
) -> Result<(Config, Vec<ValidationWarning>), Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => ConfigLoader::load_or_default(&work_dir.join(path), true)?,
        None => ConfigLoader::load_or_default(&work_dir.join("config").join("default.toml"), false)?,
    };

    if let Some(db) = &cli.db {
        config.database.path = db.clone();
    }
    let warnings = ConfigValidator::validate(&config).into_result()?;
    ConfigLoader::resolve_paths(&mut config, work_dir);

    Ok((config, warnings))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let work_dir = match &cli.work_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };

    let (config, warnings) = load_config(&cli, &work_dir)?;
    init_tracing(&config.logging)?;

    for warning in warnings {
        warn!("Config {}: {}", warning.path, warning.message);
    }
    debug!("Working directory: {}", work_dir.display());

    let db_path: PathBuf = config.database.path.clone();
    let store = SqliteJobStore::open(
        &db_path,
        Duration::from_millis(config.database.busy_timeout_ms),
    )
    .await?;
    let queue = JobQueue::new(Arc::new(store));

    match cli.command {
        Commands::Submit {
            text,
            image,
            context_dir,
        } => submit(&queue, &db_path, text, image, context_dir).await,
        Commands::Status { job_id } => status(&queue, &db_path, &job_id).await,
        Commands::Worker => run_worker(queue, &db_path, &config).await,
    }
}
