use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::QueueConfig;
use crate::error::{QueueError, Result};
use crate::executor::{CallbackFailure, JobExecutor};
use crate::job::{Job, JobId, JobOptions};
use crate::registry::{JobContext, Lifecycle, WorkerOptions, WorkerRegistry, WorkerResult};
use crate::storage::{Backend, SqliteBackend, StorageError};
use crate::store::JobStore;

/// Job queue that owns the worker registry, the persisted job list and the run loop
#[derive(Clone)]
pub struct Queue {
    registry: Arc<WorkerRegistry>,
    store: Arc<JobStore>,
    executor: Arc<JobExecutor>,
    config: QueueConfig,
    running: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
    // set by `create_job(.., true)`; checked after the run loop winds down
    wakeup: Arc<AtomicBool>,
}

impl Queue {
    /// Open a queue over any backend.
    ///
    /// Jobs left `active` by a previous process are released so they can run again.
    pub async fn open(backend: Arc<dyn Backend>, config: QueueConfig) -> Result<Self> {
        let registry = Arc::new(WorkerRegistry::new());
        let store = Arc::new(JobStore::new(backend));

        let recovered = store.reset_active().await?;
        if recovered > 0 {
            warn!(count = recovered, "Recovered jobs left active by a previous run");
        }

        Ok(Self {
            executor: Arc::new(JobExecutor::new(Arc::clone(&registry))),
            registry,
            store,
            config,
            running: Arc::new(AtomicBool::new(false)),
            stop_requested: Arc::new(AtomicBool::new(false)),
            wakeup: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Open a queue stored in SQLite at `config.database_url`.
    ///
    /// # Example
    /// ```ignore
    /// let queue = Queue::connect(QueueConfig::load()?).await?;
    ///
    /// queue.add_worker("send_email", send_email, WorkerOptions::new().concurrency(2))?;
    /// queue.create_job("send_email", &args, JobOptions::new().with_attempts(3), true).await?;
    /// ```
    pub async fn connect(config: QueueConfig) -> Result<Self> {
        let backend = SqliteBackend::new(&config.database_url)
            .await
            .map_err(StorageError::from)?
            .with_key(config.storage_key.clone());

        Self::open(Arc::new(backend), config).await
    }

    /// Report lifecycle callback failures somewhere other than the log
    pub fn with_error_sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(&CallbackFailure) + Send + Sync + 'static,
    {
        self.executor =
            Arc::new(JobExecutor::new(Arc::clone(&self.registry)).with_error_sink(sink));
        self
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn add_worker<F, Fut>(&self, name: &str, worker: F, options: WorkerOptions) -> Result<()>
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = WorkerResult> + Send + 'static,
    {
        self.registry.register(name, worker, options)?;
        info!(job_name = name, "Worker added");
        Ok(())
    }

    pub fn remove_worker(&self, name: &str) {
        self.registry.unregister(name);
        info!(job_name = name, "Worker removed");
    }

    /// Persist a new job. With `start_queue` the queue is started in the background.
    pub async fn create_job<T: Serialize + ?Sized>(
        &self,
        name: &str,
        payload: &T,
        options: JobOptions,
        start_queue: bool,
    ) -> Result<JobId> {
        let payload = serde_json::to_string(payload)?;
        let job = Job::new(name, payload, options)?;
        let id = job.id.clone();

        self.store.add(job).await?;
        info!(job_id = %id, job_name = name, "Job created");

        if start_queue {
            self.wakeup.store(true, Ordering::SeqCst);
            self.spawn(None);
        }

        Ok(id)
    }

    pub async fn jobs(&self) -> Result<Vec<Job>> {
        self.store.jobs().await
    }

    pub async fn remove_job(&self, id: &JobId) -> Result<()> {
        self.store.remove(id).await?;
        Ok(())
    }

    /// Delete every job of `name`, or every job when `name` is `None`
    pub async fn flush_queue(&self, name: Option<&str>) -> Result<()> {
        match name {
            Some(name) => {
                self.store.remove_by_name(name).await?;
            }
            None => self.store.set_jobs(Vec::new()).await?,
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask a running queue to stop once its current batch has finished
    pub fn stop(&self) {
        if self.is_running() {
            self.stop_requested.store(true, Ordering::SeqCst);
            info!("Queue stopping");
        }
    }

    /// Run [`start`](Self::start) on a background task
    pub fn spawn(&self, lifespan: Option<Duration>) -> JoinHandle<Result<bool>> {
        let queue = self.clone();
        tokio::spawn(async move {
            let result = queue.start(lifespan).await;
            if let Err(e) = &result {
                error!(error = %e, "Queue run failed");
            }
            result
        })
    }

    /// Process jobs until none are left, `stop` is called or `lifespan` runs out.
    ///
    /// Returns `false` without doing anything if the queue is already running. A `lifespan` of
    /// `None` or zero means no time limit; otherwise only jobs whose timeout fits in the time
    /// left (minus the configured buffer) are picked.
    ///
    /// Jobs created with `start_queue` while the loop is shutting down are picked up by another
    /// unbounded pass before returning.
    pub async fn start(&self, lifespan: Option<Duration>) -> Result<bool> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }

        self.stop_requested.store(false, Ordering::SeqCst);
        self.wakeup.store(false, Ordering::SeqCst);
        info!(lifespan = ?lifespan, "Queue started");
        let mut result = self.run(lifespan).await;

        loop {
            self.running.store(false, Ordering::SeqCst);

            if result.is_err()
                || self.stop_requested.load(Ordering::SeqCst)
                || !self.wakeup.swap(false, Ordering::SeqCst)
            {
                break;
            }
            // another `start` already took over
            if self.running.swap(true, Ordering::SeqCst) {
                break;
            }

            debug!("Jobs created while stopping, running again");
            result = self.run(None).await;
        }

        info!("Queue stopped");
        result.map(|()| true)
    }

    fn lifespan_remaining(
        &self,
        lifespan: Option<Duration>,
        started: Instant,
    ) -> Option<Option<Duration>> {
        match lifespan.filter(|l| !l.is_zero()) {
            None => Some(None),
            Some(lifespan) => lifespan
                .checked_sub(started.elapsed())
                .and_then(|left| left.checked_sub(self.config.lifespan_buffer()))
                .filter(|left| !left.is_zero())
                .map(Some),
        }
    }

    async fn run(&self, lifespan: Option<Duration>) -> Result<()> {
        let started = Instant::now();
        let mut skipped: HashSet<String> = HashSet::new();

        while !self.stop_requested.load(Ordering::SeqCst) {
            // `None` here means the lifespan is used up
            let Some(remaining) = self.lifespan_remaining(lifespan, started) else {
                debug!("Lifespan exhausted");
                break;
            };

            let batch = match self
                .store
                .concurrent_jobs_excluding(remaining, &self.registry, &skipped)
                .await
            {
                Ok(batch) => batch,
                Err(QueueError::NotFound(name)) => {
                    warn!(job_name = %name, "No worker registered, leaving jobs pending");
                    skipped.insert(name);
                    continue;
                }
                Err(e) => return Err(e),
            };

            if batch.is_empty() {
                break;
            }

            let ids: Vec<JobId> = batch.iter().map(|job| job.id.clone()).collect();
            self.store.mark_active(&ids).await?;
            debug!(job_name = %batch[0].name, count = batch.len(), "Dispatching batch");

            let mut tasks = JoinSet::new();
            for mut job in batch {
                job.active = true;
                let queue = self.clone();
                tasks.spawn(async move { queue.process_job(job).await });
            }

            let mut storage_error = None;
            while let Some(res) = tasks.join_next().await {
                match res {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        error!(error = %e, "Failed to persist job outcome");
                        storage_error.get_or_insert(e);
                    }
                    Err(e) => error!(error = %e, "Job task aborted"),
                }
            }

            if let Some(e) = storage_error {
                return Err(e);
            }
        }

        Ok(())
    }

    /// Execute one job and persist its outcome
    async fn process_job(&self, mut job: Job) -> Result<()> {
        self.executor.run_lifecycle_callback(Lifecycle::OnStart, &job).await;

        match self.executor.execute(&job).await {
            Ok(()) => {
                self.store.remove(&job.id).await?;
                info!(job_id = %job.id, job_name = %job.name, "Job succeeded");

                self.executor.run_lifecycle_callback(Lifecycle::OnSuccess, &job).await;
                self.executor.run_lifecycle_callback(Lifecycle::OnComplete, &job).await;
            }
            Err(QueueError::NotFound(name)) => {
                // worker removed while the job was queued; keep the job for a later run
                warn!(job_id = %job.id, job_name = %name, "Worker missing, releasing job");
                job.active = false;
                self.store.update(job).await?;
            }
            Err(e) => {
                let terminal = job.record_failure(&e.to_string(), Utc::now())?;
                self.store.update(job.clone()).await?;

                if terminal {
                    warn!(
                        job_id = %job.id,
                        job_name = %job.name,
                        error = %e,
                        "Job failed permanently"
                    );
                    self.executor.run_lifecycle_callback(Lifecycle::OnFailed, &job).await;
                    self.executor.run_lifecycle_callback(Lifecycle::OnComplete, &job).await;
                } else {
                    info!(
                        job_id = %job.id,
                        job_name = %job.name,
                        attempts_left = job.attempts,
                        error = %e,
                        "Job failed, will retry"
                    );
                    self.executor.run_lifecycle_callback(Lifecycle::OnFailure, &job).await;
                }
            }
        }

        Ok(())
    }
}
