use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::job::{Job, JobId};
use crate::registry::WorkerRegistry;
use crate::selector;
use crate::storage::{self, Backend};

/// Reads and rewrites the persisted job list.
///
/// Every mutation loads the full list, edits it and saves it back while holding an internal lock,
/// so writes issued from this process never interleave. Nothing is cached: when `save` fails the
/// backend still holds the previous list and the next read sees it.
pub struct JobStore {
    backend: Arc<dyn Backend>,
    write_lock: Mutex<()>,
}

impl JobStore {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> storage::Result<Vec<Job>> {
        match self.backend.load().await? {
            Some(bytes) if !bytes.is_empty() => Ok(serde_json::from_slice(&bytes)?),
            _ => Ok(Vec::new()),
        }
    }

    async fn save(&self, jobs: &[Job]) -> storage::Result<()> {
        let bytes = serde_json::to_vec(jobs)?;
        self.backend.save(bytes).await
    }

    /// Load, edit and save the list. `edit` returns whether anything changed; unchanged lists
    /// are not written back.
    async fn modify<F>(&self, edit: F) -> Result<Vec<Job>>
    where
        F: FnOnce(&mut Vec<Job>) -> bool,
    {
        let _guard = self.write_lock.lock().await;
        let mut jobs = self.load().await?;

        if edit(&mut jobs) {
            self.save(&jobs).await?;
        }

        Ok(jobs)
    }

    /// All persisted jobs, in stored order
    pub async fn jobs(&self) -> Result<Vec<Job>> {
        Ok(self.load().await?)
    }

    pub async fn get(&self, id: &JobId) -> Result<Option<Job>> {
        Ok(self.load().await?.into_iter().find(|job| &job.id == id))
    }

    pub async fn add(&self, job: Job) -> Result<Vec<Job>> {
        debug!(job_id = %job.id, job_name = %job.name, "Persisting new job");
        self.modify(|jobs| {
            jobs.push(job);
            true
        })
        .await
    }

    /// Replace the stored job with the same id. Unknown ids are ignored.
    pub async fn update(&self, job: Job) -> Result<Vec<Job>> {
        self.modify(|jobs| match jobs.iter_mut().find(|j| j.id == job.id) {
            Some(slot) => {
                *slot = job;
                true
            }
            None => false,
        })
        .await
    }

    pub async fn remove(&self, id: &JobId) -> Result<Vec<Job>> {
        self.modify(|jobs| {
            let before = jobs.len();
            jobs.retain(|job| &job.id != id);
            jobs.len() != before
        })
        .await
    }

    /// Drop every job with the given name, whatever its state
    pub async fn remove_by_name(&self, name: &str) -> Result<Vec<Job>> {
        self.modify(|jobs| {
            let before = jobs.len();
            jobs.retain(|job| job.name != name);
            jobs.len() != before
        })
        .await
    }

    pub async fn mark_active(&self, ids: &[JobId]) -> Result<Vec<Job>> {
        let ids: HashSet<&JobId> = ids.iter().collect();
        self.modify(|jobs| {
            let mut changed = false;
            for job in jobs.iter_mut().filter(|job| ids.contains(&job.id)) {
                job.active = true;
                changed = true;
            }
            changed
        })
        .await
    }

    /// Clear `active` on every job. Used after a restart, when no dispatch can be in flight.
    pub async fn reset_active(&self) -> Result<usize> {
        let mut reset = 0;
        self.modify(|jobs| {
            for job in jobs.iter_mut().filter(|job| job.active) {
                job.active = false;
                reset += 1;
            }
            reset > 0
        })
        .await?;
        Ok(reset)
    }

    pub async fn set_jobs(&self, new_jobs: Vec<Job>) -> Result<()> {
        self.modify(|jobs| {
            *jobs = new_jobs;
            true
        })
        .await?;
        Ok(())
    }

    /// Load the list and select the next batch from it
    pub async fn concurrent_jobs(
        &self,
        lifespan_remaining: Option<Duration>,
        registry: &WorkerRegistry,
    ) -> Result<Vec<Job>> {
        self.concurrent_jobs_excluding(lifespan_remaining, registry, &HashSet::new())
            .await
    }

    pub async fn concurrent_jobs_excluding(
        &self,
        lifespan_remaining: Option<Duration>,
        registry: &WorkerRegistry,
        skip: &HashSet<String>,
    ) -> Result<Vec<Job>> {
        let jobs = self.load().await?;
        selector::select_jobs_excluding(&jobs, lifespan_remaining, registry, skip)
    }
}
