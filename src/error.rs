use std::time::Duration;

use crate::job::JobId;
use crate::storage::StorageError;

/// Errors surfaced by the queue engine
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Job {0} does not have a worker assigned to it")]
    NotFound(String),

    #[error("Job {id} timed out after {timeout:?}")]
    Timeout { id: JobId, timeout: Duration },

    #[error("Worker failed: {0}")]
    WorkerFailure(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl QueueError {
    /// Whether this error counts as a failed execution attempt of a job
    pub fn is_execution_failure(&self) -> bool {
        matches!(self, QueueError::Timeout { .. } | QueueError::WorkerFailure(_))
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;
