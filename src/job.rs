use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{QueueError, Result};

/// Timeout applied to jobs that don't set one explicitly
pub const DEFAULT_TIMEOUT_MS: u64 = 25_000;

/// Unique identifier for a job
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Scheduling options supplied when a job is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    pub priority: i32,
    /// Milliseconds, `0` disables timeout enforcement
    pub timeout: u64,
    pub attempts: u32,
    /// Milliseconds to wait before retrying a job that failed before
    pub wait_before_retry: u64,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            priority: 0,
            timeout: DEFAULT_TIMEOUT_MS,
            attempts: 1,
            wait_before_retry: 0,
        }
    }
}

impl JobOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.as_millis() as u64;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_wait_before_retry(mut self, wait: Duration) -> Self {
        self.wait_before_retry = wait.as_millis() as u64;
        self
    }
}

/// Engine bookkeeping stored alongside a job, kept apart from the caller's payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobData {
    pub failed_attempts: u32,
    pub errors: Vec<String>,
    pub last_failed: Option<DateTime<Utc>>,
}

impl JobData {
    pub fn has_failed_before(&self) -> bool {
        self.failed_attempts > 0
    }
}

/// A persisted unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    /// JSON-encoded caller payload
    pub payload: String,
    /// JSON-encoded [`JobData`]
    pub data: String,
    pub timeout: u64,
    pub priority: i32,
    pub attempts: u32,
    #[serde(default)]
    pub wait_before_retry: u64,
    pub active: bool,
    pub failed: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
}

impl Job {
    /// Build a pending job. Fails if `name` is empty.
    pub fn new<S: Into<String>>(name: S, payload: String, options: JobOptions) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(QueueError::InvalidArgument(
                "Job name must be supplied".to_string(),
            ));
        }

        Ok(Self {
            id: JobId::new(),
            name,
            payload,
            data: serde_json::to_string(&JobData::default())?,
            timeout: options.timeout,
            priority: options.priority,
            attempts: options.attempts.max(1),
            wait_before_retry: options.wait_before_retry,
            active: false,
            failed: None,
            created: Utc::now(),
        })
    }

    pub fn with_id(mut self, id: JobId) -> Self {
        self.id = id;
        self
    }

    pub fn created_at(mut self, created: DateTime<Utc>) -> Self {
        self.created = created;
        self
    }

    pub fn is_failed(&self) -> bool {
        self.failed.is_some()
    }

    pub fn timeout_duration(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_millis(self.timeout))
    }

    pub fn wait_before_retry_duration(&self) -> Option<Duration> {
        (self.wait_before_retry > 0).then(|| Duration::from_millis(self.wait_before_retry))
    }

    pub fn job_data(&self) -> Result<JobData> {
        Ok(serde_json::from_str(&self.data)?)
    }

    pub fn payload_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.payload)?)
    }

    /// Record a failed execution and release the job.
    ///
    /// Returns `true` when the job has run out of attempts and is now terminal.
    pub fn record_failure(&mut self, error: &str, now: DateTime<Utc>) -> Result<bool> {
        // undecodable bookkeeping restarts from zero so the failure is still recorded
        let mut data = self.job_data().unwrap_or_default();
        data.failed_attempts += 1;
        data.errors.push(error.to_string());
        data.last_failed = Some(now);

        self.data = serde_json::to_string(&data)?;
        self.attempts = self.attempts.saturating_sub(1);
        self.active = false;

        let terminal = self.attempts == 0;
        if terminal {
            self.failed = Some(now);
        }

        Ok(terminal)
    }
}
