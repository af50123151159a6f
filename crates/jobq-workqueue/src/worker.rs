//! Sequential worker loop.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::FutureExt;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::error::QueueError;
use crate::job::Job;
use crate::queue::JobQueue;
use crate::shutdown::ShutdownSignal;

/// Description of why a handler could not complete a job.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct JobFailure {
    message: String,
}

impl JobFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<std::io::Error> for JobFailure {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Job handler trait.
///
/// Returns the location of the persisted result on success. Handlers must
/// terminate; the loop imposes no timeout and never retries a job.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<String, JobFailure>;
}

/// A single sequential worker.
pub struct Worker {
    id: String,
    queue: JobQueue,
    handler: Arc<dyn JobHandler>,
    config: WorkerConfig,
    shutdown: ShutdownSignal,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
}

impl Worker {
    /// Create a new worker with a random short ID.
    pub fn new(
        queue: JobQueue,
        handler: Arc<dyn JobHandler>,
        config: WorkerConfig,
        shutdown: ShutdownSignal,
    ) -> Self {
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(8);

        Self {
            id,
            queue,
            handler,
            config,
            shutdown,
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
        }
    }

    /// Get worker ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Signal that stops this worker.
    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Jobs recorded as done.
    pub fn jobs_completed(&self) -> u64 {
        self.jobs_completed.load(Ordering::SeqCst)
    }

    /// Jobs recorded as failed.
    pub fn jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::SeqCst)
    }

    /// Run until shutdown is requested.
    ///
    /// Returns an error only when storage kept failing while recording a job's
    /// outcome for `record_attempts` tries; that job is left `RUNNING`.
    pub async fn run(&self) -> Result<(), QueueError> {
        info!("Worker {} started", self.id);

        while !self.shutdown.is_shutdown_requested() {
            match self.queue.claim_next().await {
                Ok(Some(job)) => self.process(job).await?,
                Ok(None) => {
                    if self.shutdown.wait(self.config.poll_interval()).await {
                        break;
                    }
                }
                Err(e) => {
                    error!("Worker {} failed to claim a job: {}", self.id, e);
                    if self.shutdown.wait(self.config.error_backoff()).await {
                        break;
                    }
                }
            }
        }

        info!(
            "Worker {} stopped (completed: {}, failed: {})",
            self.id,
            self.jobs_completed(),
            self.jobs_failed()
        );
        Ok(())
    }

    /// Claim and process at most one job.
    ///
    /// Returns `false` when the queue had nothing pending.
    pub async fn run_once(&self) -> Result<bool, QueueError> {
        match self.queue.claim_next().await? {
            Some(job) => {
                self.process(job).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn process(&self, job: Job) -> Result<(), QueueError> {
        info!("Worker {} processing job {}", self.id, job.id);

        let outcome = self.execute(&job).await;
        if !self.record(&job.id, &outcome).await? {
            return Ok(());
        }

        match outcome {
            Ok(location) => {
                self.jobs_completed.fetch_add(1, Ordering::SeqCst);
                info!("Worker {} completed job {}: {}", self.id, job.id, location);
            }
            Err(failure) => {
                self.jobs_failed.fetch_add(1, Ordering::SeqCst);
                warn!("Worker {} failed job {}: {}", self.id, job.id, failure);
            }
        }
        Ok(())
    }

    async fn execute(&self, job: &Job) -> Result<String, JobFailure> {
        match AssertUnwindSafe(self.handler.handle(job)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => Err(JobFailure::new(format!(
                "handler panicked: {}",
                panic_message(panic.as_ref())
            ))),
        }
    }

    /// Record the outcome, retrying storage errors.
    ///
    /// Returns `false` when the job was moved out of `RUNNING` by someone else
    /// (or removed) while the handler ran; the outcome is dropped and the loop
    /// carries on. The backoff here ignores shutdown: the in-flight job must be
    /// recorded.
    async fn record(
        &self,
        id: &Uuid,
        outcome: &Result<String, JobFailure>,
    ) -> Result<bool, QueueError> {
        let attempts = self.config.record_attempts.max(1);
        let mut attempt = 1;

        loop {
            let result = match outcome {
                Ok(location) => self.queue.complete(id, location).await,
                Err(failure) => self.queue.fail(id, failure.message()).await,
            };

            match result {
                Ok(()) => return Ok(true),
                Err(e @ QueueError::Database(_)) if attempt < attempts => {
                    warn!(
                        "Worker {} could not record job {} (attempt {}/{}): {}",
                        self.id, id, attempt, attempts, e
                    );
                    tokio::time::sleep(self.config.error_backoff()).await;
                    attempt += 1;
                }
                Err(e @ QueueError::Database(_)) => {
                    error!("Worker {} giving up on recording job {}: {}", self.id, id, e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("Worker {} discarding outcome of job {}: {}", self.id, id, e);
                    return Ok(false);
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        debug!("Handler panicked with a non-string payload");
        "unknown panic"
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
