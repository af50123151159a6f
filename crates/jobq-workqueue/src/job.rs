//! Job definition and status.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::QueueError;

/// Producer-supplied job input. Opaque to the store and the worker loop.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Waiting to be claimed.
    Pending,
    /// Claimed by a worker.
    Running,
    /// Handler succeeded.
    Done,
    /// Handler failed.
    Failed,
}

impl JobStatus {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Done => "DONE",
            JobStatus::Failed => "FAILED",
        }
    }

    /// DONE and FAILED admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

impl Default for JobStatus {
    fn default() -> Self {
        JobStatus::Pending
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobStatus::Pending),
            "RUNNING" => Ok(JobStatus::Running),
            "DONE" => Ok(JobStatus::Done),
            "FAILED" => Ok(JobStatus::Failed),
            other => Err(QueueError::Database(format!("Unknown job status '{}'", other))),
        }
    }
}

/// A job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID.
    pub id: Uuid,
    /// Current status.
    pub status: JobStatus,
    /// Handler input.
    pub payload: Payload,
    /// Where the handler's output lives. Set only when `Done`.
    pub result_location: Option<String>,
    /// Failure description. Set only when `Failed`.
    pub error: Option<String>,
    /// Creation time; fixes FIFO order.
    pub created_at: DateTime<Utc>,
    /// Last transition time.
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(payload: Payload, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Pending,
            payload,
            result_location: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Decide whether a terminal write to `target` applies.
    ///
    /// Returns `Ok(true)` when the job is `Running` and the write must be applied,
    /// `Ok(false)` when the job already sits in `target` (a repeated write is a no-op).
    pub fn check_terminal(&self, target: JobStatus) -> Result<bool, QueueError> {
        debug_assert!(target.is_terminal());
        match self.status {
            JobStatus::Running => Ok(true),
            current if current == target => Ok(false),
            current => Err(QueueError::InvalidTransition {
                id: self.id.to_string(),
                from: current,
                to: target,
            }),
        }
    }

    /// `updated_at` for the next transition; never moves backwards.
    pub fn next_update(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.max(self.updated_at)
    }
}

/// Fixed-width RFC 3339 text; lexicographic order equals chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a timestamp written by [`format_timestamp`].
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}
