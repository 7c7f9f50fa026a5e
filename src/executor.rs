use std::sync::Arc;

use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{QueueError, Result};
use crate::job::{Job, JobId};
use crate::registry::{JobContext, Lifecycle, WorkerRegistry, WorkerResult};

/// A lifecycle callback that returned an error or panicked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackFailure {
    pub lifecycle: Lifecycle,
    pub job_id: JobId,
    pub job_name: String,
    pub error: String,
}

/// Receives lifecycle callback failures. They are never propagated to the caller.
pub type ErrorSink = Arc<dyn Fn(&CallbackFailure) + Send + Sync>;

fn log_callback_failure(failure: &CallbackFailure) {
    error!(
        job_id = %failure.job_id,
        job_name = %failure.job_name,
        lifecycle = %failure.lifecycle,
        error = %failure.error,
        "Job lifecycle callback failed"
    );
}

fn join_error_message(e: JoinError) -> String {
    if e.is_panic() {
        "panicked".to_string()
    } else {
        "cancelled".to_string()
    }
}

fn worker_outcome(res: std::result::Result<WorkerResult, JoinError>) -> Result<()> {
    match res {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(QueueError::WorkerFailure(e)),
        Err(e) => Err(QueueError::WorkerFailure(format!(
            "Worker {}",
            join_error_message(e)
        ))),
    }
}

/// Runs jobs through their registered workers
pub struct JobExecutor {
    registry: Arc<WorkerRegistry>,
    error_sink: ErrorSink,
}

impl JobExecutor {
    pub fn new(registry: Arc<WorkerRegistry>) -> Self {
        Self {
            registry,
            error_sink: Arc::new(log_callback_failure),
        }
    }

    /// Replace the default sink, which logs through `tracing`
    pub fn with_error_sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(&CallbackFailure) + Send + Sync + 'static,
    {
        self.error_sink = Arc::new(sink);
        self
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    /// Execute one job.
    ///
    /// A job that failed before waits `wait_before_retry` first. With a timeout the worker is
    /// raced against a timer started at invocation; on expiry the worker's cancellation token is
    /// signalled and its task is left to finish on its own, its result discarded.
    pub async fn execute(&self, job: &Job) -> Result<()> {
        let worker = self.registry.worker(&job.name)?;

        let payload = job
            .payload_value()
            .map_err(|e| QueueError::WorkerFailure(format!("Invalid job payload: {e}")))?;
        let data = job
            .job_data()
            .map_err(|e| QueueError::WorkerFailure(format!("Invalid job data: {e}")))?;

        if data.has_failed_before() {
            if let Some(wait) = job.wait_before_retry_duration() {
                debug!(job_id = %job.id, wait_ms = job.wait_before_retry, "Waiting before retry");
                tokio::time::sleep(wait).await;
            }
        }

        let cancellation = CancellationToken::new();
        let ctx = JobContext {
            id: job.id.clone(),
            payload,
            job: job.clone(),
            cancellation: cancellation.clone(),
        };

        let mut handle = tokio::spawn(worker(ctx));

        match job.timeout_duration() {
            Some(timeout) => {
                tokio::select! {
                    res = &mut handle => worker_outcome(res),
                    _ = tokio::time::sleep(timeout) => {
                        cancellation.cancel();
                        warn!(
                            job_id = %job.id,
                            job_name = %job.name,
                            timeout_ms = job.timeout,
                            "Job timed out"
                        );
                        Err(QueueError::Timeout {
                            id: job.id.clone(),
                            timeout,
                        })
                    }
                }
            }
            None => worker_outcome(handle.await),
        }
    }

    /// Fire a lifecycle callback if the job's worker has one. Failures go to the error sink.
    pub async fn run_lifecycle_callback(&self, lifecycle: Lifecycle, job: &Job) {
        let Some(hook) = self.registry.hook(&job.name, lifecycle) else {
            return;
        };

        let payload = job.payload_value().unwrap_or(serde_json::Value::Null);

        let error = match tokio::spawn(hook(job.id.clone(), payload)).await {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e,
            Err(e) => format!("Callback {}", join_error_message(e)),
        };

        (self.error_sink)(&CallbackFailure {
            lifecycle,
            job_id: job.id.clone(),
            job_name: job.name.clone(),
            error,
        });
    }

    /// Same as [`run_lifecycle_callback`](Self::run_lifecycle_callback), by callback name.
    ///
    /// Fails with `InvalidArgument` for anything but `onStart`, `onSuccess`, `onFailure`,
    /// `onFailed` and `onComplete`.
    pub async fn run_named_lifecycle_callback(&self, name: &str, job: &Job) -> Result<()> {
        let lifecycle: Lifecycle = name.parse()?;
        self.run_lifecycle_callback(lifecycle, job).await;
        Ok(())
    }
}
