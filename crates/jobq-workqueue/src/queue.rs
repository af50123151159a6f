//! Queue facade over a [`JobStore`].

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::QueueError;
use crate::job::{Job, JobStatus, Payload};
use crate::store::JobStore;

const MISSING_FAILURE_DESCRIPTION: &str = "job failed without a description";

/// Caller-facing view of a job's progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub id: Uuid,
    pub status: JobStatus,
    pub result_location: Option<String>,
    pub error: Option<String>,
}

impl From<Job> for StatusReport {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            status: job.status,
            result_location: job.result_location,
            error: job.error,
        }
    }
}

/// FIFO job queue.
///
/// Validates producer input and translates store results; ordering and
/// exclusivity come from the store.
#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn JobStore>,
}

impl JobQueue {
    /// Create a queue over a store.
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Enqueue a job and return its ID.
    pub async fn enqueue(&self, payload: Payload) -> Result<Uuid, QueueError> {
        if payload.keys().any(|k| k.trim().is_empty()) {
            return Err(QueueError::InvalidPayload(
                "payload keys must be non-empty".to_string(),
            ));
        }

        let id = self.store.insert(payload).await?;
        info!("Enqueued job {}", id);
        Ok(id)
    }

    /// Enqueue a job from raw JSON, which must be an object.
    pub async fn enqueue_json(&self, raw: &str) -> Result<Uuid, QueueError> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| QueueError::InvalidPayload(e.to_string()))?;

        match value {
            serde_json::Value::Object(payload) => self.enqueue(payload).await,
            other => Err(QueueError::InvalidPayload(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Fetch the full job record.
    pub async fn fetch(&self, id: &Uuid) -> Result<Job, QueueError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))
    }

    /// Current status of a job.
    pub async fn status(&self, id: &Uuid) -> Result<StatusReport, QueueError> {
        self.fetch(id).await.map(StatusReport::from)
    }

    /// Claim the oldest pending job, if any.
    pub async fn claim_next(&self) -> Result<Option<Job>, QueueError> {
        self.store.claim_oldest_pending().await
    }

    /// Mark a running job done.
    pub async fn complete(&self, id: &Uuid, result_location: &str) -> Result<(), QueueError> {
        self.store.mark_done(id, result_location).await?;
        debug!("Job {} done: {}", id, result_location);
        Ok(())
    }

    /// Mark a running job failed. An empty description is replaced so the
    /// stored error is never blank.
    pub async fn fail(&self, id: &Uuid, error: &str) -> Result<(), QueueError> {
        let error = if error.trim().is_empty() {
            MISSING_FAILURE_DESCRIPTION
        } else {
            error
        };
        self.store.mark_failed(id, error).await?;
        debug!("Job {} failed: {}", id, error);
        Ok(())
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
