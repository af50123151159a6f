//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub worker: WorkerSection,

    #[serde(default)]
    pub outputs: OutputsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Job database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file holding the job table. Relative paths resolve against the working directory.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// How long a writer waits for a competing lock before giving up.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data").join("jobs.db")
}

fn default_busy_timeout() -> u64 {
    5000
}

/// Worker loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSection {
    /// Wait between polls of an empty queue.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Wait after a storage error before the next attempt.
    #[serde(default = "default_error_backoff")]
    pub error_backoff_ms: u64,

    /// Attempts at recording a job's terminal state before the worker gives up.
    #[serde(default = "default_record_attempts")]
    pub record_attempts: u32,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            error_backoff_ms: default_error_backoff(),
            record_attempts: default_record_attempts(),
        }
    }
}

fn default_poll_interval() -> u64 {
    2000
}

fn default_error_backoff() -> u64 {
    1000
}

fn default_record_attempts() -> u32 {
    5
}

/// Report output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputsConfig {
    #[serde(default = "default_outputs_dir")]
    pub dir: PathBuf,
}

impl Default for OutputsConfig {
    fn default() -> Self {
        Self {
            dir: default_outputs_dir(),
        }
    }
}

fn default_outputs_dir() -> PathBuf {
    PathBuf::from("outputs")
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for rolling log files.
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,

    /// Write logs to files in addition to the console.
    #[serde(default = "default_true")]
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: default_log_dir(),
            file: true,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".jobq").join("logs"))
        .unwrap_or_else(|| PathBuf::from(".jobq/logs"))
}

fn default_true() -> bool {
    true
}
