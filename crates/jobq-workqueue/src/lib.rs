//! # jobq Work Queue
//!
//! Single-node, file-backed job queue.
//!
//! ## Features
//!
//! - Durable job table (SQLite) with an atomic claim of the oldest pending job
//! - Forward-only state machine: `PENDING -> RUNNING -> DONE | FAILED`
//! - Sequential worker loop with cooperative shutdown
//!
//! Jobs orphaned in `RUNNING` by a crashed worker are never reclaimed; there is no
//! lease or heartbeat.

pub mod config;
pub mod error;
pub mod job;
pub mod queue;
pub mod schema;
pub mod shutdown;
pub mod store;
pub mod store_sqlite;
pub mod worker;

pub use config::WorkerConfig;
pub use error::QueueError;
pub use job::{Job, JobStatus, Payload, format_timestamp};
pub use queue::{JobQueue, StatusReport};
pub use shutdown::ShutdownSignal;
pub use store::{Clock, JobStore, MemoryJobStore, system_clock};
pub use store_sqlite::SqliteJobStore;
pub use worker::{JobFailure, JobHandler, Worker};
