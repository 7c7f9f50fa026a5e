use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::error::{QueueError, Result};
use crate::job::{Job, JobId};

/// Outcome reported by a worker or lifecycle callback
pub type WorkerResult = std::result::Result<(), String>;

pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = WorkerResult> + Send>>;
pub(crate) type WorkerFn = Arc<dyn Fn(JobContext) -> BoxFuture + Send + Sync>;
pub(crate) type HookFn = Arc<dyn Fn(JobId, serde_json::Value) -> BoxFuture + Send + Sync>;

/// Everything a worker receives for one execution
#[derive(Debug, Clone)]
pub struct JobContext {
    pub id: JobId,
    pub payload: serde_json::Value,
    pub job: Job,
    /// Cancelled when the execution times out. Long-running workers should watch it.
    pub cancellation: CancellationToken,
}

impl JobContext {
    /// Decode the payload into a typed value
    pub fn payload_as<T: DeserializeOwned>(&self) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Job lifecycle callbacks a worker may attach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    OnStart,
    OnSuccess,
    /// A failed attempt that will be retried
    OnFailure,
    /// Attempts exhausted
    OnFailed,
    OnComplete,
}

impl Lifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::OnStart => "onStart",
            Lifecycle::OnSuccess => "onSuccess",
            Lifecycle::OnFailure => "onFailure",
            Lifecycle::OnFailed => "onFailed",
            Lifecycle::OnComplete => "onComplete",
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Lifecycle {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "onStart" => Ok(Lifecycle::OnStart),
            "onSuccess" => Ok(Lifecycle::OnSuccess),
            "onFailure" => Ok(Lifecycle::OnFailure),
            "onFailed" => Ok(Lifecycle::OnFailed),
            "onComplete" => Ok(Lifecycle::OnComplete),
            other => Err(QueueError::InvalidArgument(format!(
                "Invalid job lifecycle callback name: {other}"
            ))),
        }
    }
}

fn boxed_hook<F, Fut>(hook: F) -> HookFn
where
    F: Fn(JobId, serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = WorkerResult> + Send + 'static,
{
    Arc::new(move |id, payload| Box::pin(hook(id, payload)))
}

/// Per-worker options
///
/// # Example
/// ```ignore
/// let options = WorkerOptions::new()
///     .concurrency(4)
///     .on_failed(|id, _payload| async move {
///         tracing::warn!(job_id = %id, "gave up");
///         Ok(())
///     });
/// ```
#[derive(Clone, Default)]
pub struct WorkerOptions {
    concurrency: usize,
    on_start: Option<HookFn>,
    on_success: Option<HookFn>,
    on_failure: Option<HookFn>,
    on_failed: Option<HookFn>,
    on_complete: Option<HookFn>,
}

impl fmt::Debug for WorkerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerOptions")
            .field("concurrency", &self.concurrency)
            .field("on_start", &self.on_start.is_some())
            .field("on_success", &self.on_success.is_some())
            .field("on_failure", &self.on_failure.is_some())
            .field("on_failed", &self.on_failed.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

impl WorkerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum number of jobs of this name dispatched together. `0` falls back to `1`.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn on_start<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(JobId, serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = WorkerResult> + Send + 'static,
    {
        self.on_start = Some(boxed_hook(hook));
        self
    }

    pub fn on_success<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(JobId, serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = WorkerResult> + Send + 'static,
    {
        self.on_success = Some(boxed_hook(hook));
        self
    }

    pub fn on_failure<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(JobId, serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = WorkerResult> + Send + 'static,
    {
        self.on_failure = Some(boxed_hook(hook));
        self
    }

    pub fn on_failed<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(JobId, serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = WorkerResult> + Send + 'static,
    {
        self.on_failed = Some(boxed_hook(hook));
        self
    }

    pub fn on_complete<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(JobId, serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = WorkerResult> + Send + 'static,
    {
        self.on_complete = Some(boxed_hook(hook));
        self
    }

    fn normalized(mut self) -> Self {
        self.concurrency = self.concurrency.max(1);
        self
    }

    fn hook(&self, lifecycle: Lifecycle) -> Option<&HookFn> {
        match lifecycle {
            Lifecycle::OnStart => self.on_start.as_ref(),
            Lifecycle::OnSuccess => self.on_success.as_ref(),
            Lifecycle::OnFailure => self.on_failure.as_ref(),
            Lifecycle::OnFailed => self.on_failed.as_ref(),
            Lifecycle::OnComplete => self.on_complete.as_ref(),
        }
    }
}

#[derive(Clone)]
struct RegisteredWorker {
    worker: WorkerFn,
    options: WorkerOptions,
}

/// Maps job names to the worker that executes them
pub struct WorkerRegistry {
    workers: RwLock<HashMap<String, RegisteredWorker>>,
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self {
            workers: RwLock::new(HashMap::new()),
        }
    }

    /// Assign a worker to a job name, replacing any previous one
    pub fn register<F, Fut>(&self, name: &str, worker: F, options: WorkerOptions) -> Result<()>
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = WorkerResult> + Send + 'static,
    {
        if name.trim().is_empty() {
            return Err(QueueError::InvalidArgument(
                "Job name and associated worker function must be supplied".to_string(),
            ));
        }

        let worker: WorkerFn = Arc::new(move |ctx| Box::pin(worker(ctx)));

        let mut workers = self.workers.write().unwrap_or_else(|e| e.into_inner());
        workers.insert(
            name.to_string(),
            RegisteredWorker {
                worker,
                options: options.normalized(),
            },
        );

        Ok(())
    }

    pub fn unregister(&self, name: &str) {
        let mut workers = self.workers.write().unwrap_or_else(|e| e.into_inner());
        workers.remove(name);
    }

    pub fn concurrency_of(&self, name: &str) -> Result<usize> {
        let workers = self.workers.read().unwrap_or_else(|e| e.into_inner());
        workers
            .get(name)
            .map(|w| w.options.concurrency)
            .ok_or_else(|| QueueError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        let workers = self.workers.read().unwrap_or_else(|e| e.into_inner());
        workers.contains_key(name)
    }

    /// Names that currently have a worker
    pub fn names(&self) -> Vec<String> {
        let workers = self.workers.read().unwrap_or_else(|e| e.into_inner());
        workers.keys().cloned().collect()
    }

    pub(crate) fn worker(&self, name: &str) -> Result<WorkerFn> {
        let workers = self.workers.read().unwrap_or_else(|e| e.into_inner());
        workers
            .get(name)
            .map(|w| Arc::clone(&w.worker))
            .ok_or_else(|| QueueError::NotFound(name.to_string()))
    }

    pub(crate) fn hook(&self, name: &str, lifecycle: Lifecycle) -> Option<HookFn> {
        let workers = self.workers.read().unwrap_or_else(|e| e.into_inner());
        workers
            .get(name)
            .and_then(|w| w.options.hook(lifecycle))
            .cloned()
    }
}
