//! Job persistence store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::QueueError;
use crate::job::{Job, JobStatus, Payload};

/// Time source for record timestamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Wall clock.
pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Job store trait for persistence.
///
/// The transition methods form a closed set: a job can only be claimed
/// (`PENDING -> RUNNING`) or finished (`RUNNING -> DONE | FAILED`).
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new pending job and return its ID.
    async fn insert(&self, payload: Payload) -> Result<Uuid, QueueError>;

    /// Load a job by ID.
    async fn get(&self, id: &Uuid) -> Result<Option<Job>, QueueError>;

    /// Atomically move the oldest pending job to `RUNNING` and return it.
    ///
    /// Two concurrent callers never receive the same job.
    async fn claim_oldest_pending(&self) -> Result<Option<Job>, QueueError>;

    /// Record success. Repeating the write on a `DONE` job is a no-op.
    async fn mark_done(&self, id: &Uuid, result_location: &str) -> Result<(), QueueError>;

    /// Record failure. Repeating the write on a `FAILED` job is a no-op.
    async fn mark_failed(&self, id: &Uuid, error: &str) -> Result<(), QueueError>;
}

struct MemoryEntry {
    seq: u64,
    job: Job,
}

#[derive(Default)]
struct MemoryState {
    next_seq: u64,
    jobs: HashMap<Uuid, MemoryEntry>,
}

/// In-memory job store for testing.
pub struct MemoryJobStore {
    state: Mutex<MemoryState>,
    clock: Clock,
}

impl MemoryJobStore {
    /// Create a new memory store.
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// Create a memory store with a custom time source.
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            clock,
        }
    }

    async fn finish(
        &self,
        id: &Uuid,
        target: JobStatus,
        result_location: Option<&str>,
        error: Option<&str>,
    ) -> Result<(), QueueError> {
        let now = (self.clock)();
        let mut state = self.state.lock().await;
        let entry = state
            .jobs
            .get_mut(id)
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;

        if !entry.job.check_terminal(target)? {
            debug!("Job {} already {}, ignoring repeated write", id, target);
            return Ok(());
        }

        let job = &mut entry.job;
        job.updated_at = job.next_update(now);
        job.status = target;
        job.result_location = result_location.map(str::to_string);
        job.error = error.map(str::to_string);
        Ok(())
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, payload: Payload) -> Result<Uuid, QueueError> {
        let job = Job::new(payload, (self.clock)());
        let id = job.id;

        let mut state = self.state.lock().await;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.jobs.insert(id, MemoryEntry { seq, job });
        Ok(id)
    }

    async fn get(&self, id: &Uuid) -> Result<Option<Job>, QueueError> {
        let state = self.state.lock().await;
        Ok(state.jobs.get(id).map(|e| e.job.clone()))
    }

    async fn claim_oldest_pending(&self) -> Result<Option<Job>, QueueError> {
        let now = (self.clock)();
        let mut state = self.state.lock().await;

        let Some(entry) = state
            .jobs
            .values_mut()
            .filter(|e| e.job.status == JobStatus::Pending)
            .min_by_key(|e| (e.job.created_at, e.seq))
        else {
            return Ok(None);
        };

        entry.job.updated_at = entry.job.next_update(now);
        entry.job.status = JobStatus::Running;
        Ok(Some(entry.job.clone()))
    }

    async fn mark_done(&self, id: &Uuid, result_location: &str) -> Result<(), QueueError> {
        self.finish(id, JobStatus::Done, Some(result_location), None).await
    }

    async fn mark_failed(&self, id: &Uuid, error: &str) -> Result<(), QueueError> {
        self.finish(id, JobStatus::Failed, None, Some(error)).await
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
