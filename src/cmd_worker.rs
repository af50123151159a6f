//! Worker subcommand.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use jobq_config::Config;
use jobq_workqueue::{JobQueue, ShutdownSignal, Worker, WorkerConfig};

use crate::report::ReportHandler;

fn worker_config(config: &Config) -> WorkerConfig {
    WorkerConfig {
        poll_interval_ms: config.worker.poll_interval_ms,
        error_backoff_ms: config.worker.error_backoff_ms,
        record_attempts: config.worker.record_attempts,
    }
}

/// Run a worker in the foreground until SIGINT or SIGTERM.
pub(crate) async fn run_worker(
    queue: JobQueue,
    db_path: &Path,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let shutdown = ShutdownSignal::new();
    shutdown.install_os_handlers()?;

    let handler = Arc::new(ReportHandler::new(&config.outputs.dir));
    let worker = Worker::new(queue, handler, worker_config(config), shutdown.clone());

    println!("Using DB: {}", db_path.display());
    println!("Worker {} started. Press Ctrl+C to stop.", worker.id());
    info!("Reports will be written to {}", config.outputs.dir.display());

    let notice = shutdown.clone();
    tokio::spawn(async move {
        notice.cancelled().await;
        println!("\nShutdown requested. Finishing current job...");
    });

    worker.run().await?;

    println!("Worker {} stopped.", worker.id());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_defaults_match_worker_defaults() {
        let from_file = worker_config(&Config::default());
        let built_in = WorkerConfig::default();

        assert_eq!(from_file.poll_interval_ms, built_in.poll_interval_ms);
        assert_eq!(from_file.error_backoff_ms, built_in.error_backoff_ms);
        assert_eq!(from_file.record_attempts, built_in.record_attempts);
    }

    #[test]
    fn test_worker_config_from_file_config() {
        let config = jobq_config::ConfigLoader::load_str(
            r#"
            [worker]
            poll_interval_ms = 250
            record_attempts = 2
            "#,
        )
        .unwrap();

        let worker = worker_config(&config);
        assert_eq!(worker.poll_interval_ms, 250);
        assert_eq!(worker.error_backoff_ms, 1000);
        assert_eq!(worker.record_attempts, 2);
    }
}
