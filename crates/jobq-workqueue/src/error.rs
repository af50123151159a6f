//! Queue errors.

use thiserror::Error;

use crate::job::JobStatus;

/// Queue error types.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Job not found.
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Payload rejected before it reached the store.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Transition not permitted by the job state machine.
    #[error("Job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: JobStatus,
        to: JobStatus,
    },

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// OS signal handlers could not be installed.
    #[error("Signal setup failed: {0}")]
    SignalSetup(String),
}

impl From<tokio_rusqlite::Error> for QueueError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        QueueError::Database(err.to_string())
    }
}

impl From<rusqlite::Error> for QueueError {
    fn from(err: rusqlite::Error) -> Self {
        QueueError::Database(err.to_string())
    }
}
