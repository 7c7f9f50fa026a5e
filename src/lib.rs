//! Persistent, priority-aware job queue.
//!
//! Jobs are stored as one serialized list behind a [`Backend`]. Each cycle the [`selector`]
//! picks a batch of jobs sharing one name, highest priority and oldest first, capped by that
//! name's worker concurrency. The [`JobExecutor`] runs each job with its timeout and retry
//! backoff, and the [`Queue`] persists the outcome.

mod config;
mod error;
mod executor;
mod job;
mod queue;
mod registry;
pub mod selector;
pub mod storage;
mod store;
pub mod telemetry;

pub use config::QueueConfig;
pub use error::{QueueError, Result};
pub use executor::{CallbackFailure, ErrorSink, JobExecutor};
pub use job::{Job, JobData, JobId, JobOptions, DEFAULT_TIMEOUT_MS};
pub use queue::Queue;
pub use registry::{JobContext, Lifecycle, WorkerOptions, WorkerRegistry, WorkerResult};
pub use storage::{Backend, MemoryBackend, SqliteBackend, StorageError};
pub use store::JobStore;
