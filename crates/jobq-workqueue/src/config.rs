//! Worker configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Worker loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Wait between polls of an empty queue, in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Wait after a storage error, in milliseconds.
    #[serde(default = "default_error_backoff")]
    pub error_backoff_ms: u64,

    /// Attempts at recording a terminal state before the loop gives up.
    #[serde(default = "default_record_attempts")]
    pub record_attempts: u32,
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

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            error_backoff_ms: default_error_backoff(),
            record_attempts: default_record_attempts(),
        }
    }
}
