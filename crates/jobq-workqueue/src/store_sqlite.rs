//! SQLite job store.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{OptionalExtension, Row, TransactionBehavior, params};
use tokio_rusqlite::Connection;
use tracing::debug;
use uuid::Uuid;

use crate::error::QueueError;
use crate::job::{Job, JobStatus, Payload, format_timestamp, parse_timestamp};
use crate::schema::init_schema;
use crate::store::{Clock, JobStore, system_clock};

const SELECT_JOB: &str =
    "SELECT id, status, payload_json, result_path, error, created_at, updated_at FROM jobs";

/// SQLite-based job store.
///
/// Each instance owns one connection. Processes sharing a database file each open
/// their own store; claims are serialized by SQLite's write lock, not by anything
/// in-process.
pub struct SqliteJobStore {
    conn: Connection,
    path: Option<PathBuf>,
    clock: Clock,
}

impl SqliteJobStore {
    /// Open (creating if needed) a file-backed job database.
    ///
    /// `busy_timeout` bounds how long a writer waits for another connection's lock.
    pub async fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, QueueError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                QueueError::Database(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let conn = Connection::open(path.clone()).await?;
        conn.call(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            let _mode: String =
                conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
            init_schema(conn)?;
            Ok(())
        })
        .await?;

        debug!("SqliteJobStore opened at {:?}", path);

        Ok(Self {
            conn,
            path: Some(path),
            clock: system_clock(),
        })
    }

    /// Create a new in-memory database.
    pub async fn in_memory() -> Result<Self, QueueError> {
        let conn = Connection::open_in_memory().await?;
        conn.call(|conn| Ok(init_schema(conn)?)).await?;

        Ok(Self {
            conn,
            path: None,
            clock: system_clock(),
        })
    }

    /// Replace the time source used for record timestamps.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Current time at the precision the table stores.
    fn now(&self) -> DateTime<Utc> {
        (self.clock)().trunc_subsecs(6)
    }

    /// Database file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn finish(
        &self,
        id: &Uuid,
        target: JobStatus,
        result_location: Option<String>,
        error: Option<String>,
    ) -> Result<(), QueueError> {
        let now = self.now();
        let id_text = id.to_string();

        let applied = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let current = tx
                    .query_row(&format!("{SELECT_JOB} WHERE id = ?1"), [&id_text], row_to_job)
                    .optional()?;

                let Some(current) = current else {
                    return Ok(Err(QueueError::JobNotFound(id_text)));
                };
                match current.check_terminal(target) {
                    Ok(true) => {}
                    Ok(false) => return Ok(Ok(false)),
                    Err(e) => return Ok(Err(e)),
                }

                tx.execute(
                    "UPDATE jobs SET status = ?1, result_path = ?2, error = ?3, updated_at = ?4
                     WHERE id = ?5",
                    params![
                        target.as_str(),
                        result_location,
                        error,
                        format_timestamp(&current.next_update(now)),
                        id_text
                    ],
                )?;
                tx.commit()?;
                Ok(Ok(true))
            })
            .await??;

        if applied {
            debug!("Job {} -> {}", id, target);
        } else {
            debug!("Job {} already {}, ignoring repeated write", id, target);
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn insert(&self, payload: Payload) -> Result<Uuid, QueueError> {
        let job = Job::new(payload, self.now());
        let id = job.id;
        let payload_json = serde_json::to_string(&job.payload)
            .map_err(|e| QueueError::InvalidPayload(e.to_string()))?;
        let created = format_timestamp(&job.created_at);

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO jobs (id, status, payload_json, created_at, updated_at)
                     VALUES (?1, 'PENDING', ?2, ?3, ?3)",
                    params![id.to_string(), payload_json, created],
                )?;
                Ok(())
            })
            .await?;

        debug!("Inserted job {}", id);
        Ok(id)
    }

    async fn get(&self, id: &Uuid) -> Result<Option<Job>, QueueError> {
        let id_text = id.to_string();
        let job = self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row(&format!("{SELECT_JOB} WHERE id = ?1"), [&id_text], row_to_job)
                    .optional()?)
            })
            .await?;
        Ok(job)
    }

    async fn claim_oldest_pending(&self) -> Result<Option<Job>, QueueError> {
        let now = self.now();

        // The write lock is taken before the read, so a competing claimer blocks
        // here and then selects again after this transaction commits.
        let claimed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let candidate = tx
                    .query_row(
                        &format!(
                            "{SELECT_JOB} WHERE status = 'PENDING'
                             ORDER BY created_at ASC, rowid ASC LIMIT 1"
                        ),
                        [],
                        row_to_job,
                    )
                    .optional()?;

                let Some(mut job) = candidate else {
                    return Ok(None);
                };

                job.updated_at = job.next_update(now);
                job.status = JobStatus::Running;
                tx.execute(
                    "UPDATE jobs SET status = 'RUNNING', updated_at = ?1
                     WHERE id = ?2 AND status = 'PENDING'",
                    params![format_timestamp(&job.updated_at), job.id.to_string()],
                )?;
                tx.commit()?;
                Ok(Some(job))
            })
            .await?;

        if let Some(ref job) = claimed {
            debug!("Claimed job {}", job.id);
        }
        Ok(claimed)
    }

    async fn mark_done(&self, id: &Uuid, result_location: &str) -> Result<(), QueueError> {
        self.finish(id, JobStatus::Done, Some(result_location.to_string()), None)
            .await
    }

    async fn mark_failed(&self, id: &Uuid, error: &str) -> Result<(), QueueError> {
        self.finish(id, JobStatus::Failed, None, Some(error.to_string()))
            .await
    }
}

fn row_to_job(row: &Row<'_>) -> rusqlite::Result<Job> {
    let id: String = row.get(0)?;
    let status: String = row.get(1)?;
    let payload_json: String = row.get(2)?;
    let created_at: String = row.get(5)?;
    let updated_at: String = row.get(6)?;

    Ok(Job {
        id: Uuid::parse_str(&id).map_err(|e| conversion_error(0, e))?,
        status: status.parse::<JobStatus>().map_err(|e| conversion_error(1, e))?,
        payload: serde_json::from_str::<Payload>(&payload_json).map_err(|e| conversion_error(2, e))?,
        result_location: row.get(3)?,
        error: row.get(4)?,
        created_at: parse_timestamp(&created_at).map_err(|e| conversion_error(5, e))?,
        updated_at: parse_timestamp(&updated_at).map_err(|e| conversion_error(6, e))?,
    })
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

#[cfg(test)]
#[path = "store_sqlite_tests.rs"]
mod tests;
