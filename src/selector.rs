//! Picks the next batch of jobs to dispatch.
//!
//! A batch always holds jobs of a single name: the best-ranked eligible job decides the name,
//! and that name's worker concurrency caps the batch size.

use std::collections::HashSet;
use std::time::Duration;

use crate::error::Result;
use crate::job::Job;
use crate::registry::WorkerRegistry;

/// Whether a job may run in a cycle with `lifespan_remaining` left.
///
/// `None` or a zero budget means the cycle is unbounded.
pub fn is_eligible(job: &Job, lifespan_remaining: Option<Duration>) -> bool {
    if job.active || job.is_failed() {
        return false;
    }

    match lifespan_remaining.filter(|budget| !budget.is_zero()) {
        Some(budget) => job.timeout == 0 || u128::from(job.timeout) < budget.as_millis(),
        None => true,
    }
}

/// Sort by priority (highest first), then by creation time (oldest first)
pub fn sort_jobs(jobs: &mut [Job]) {
    jobs.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.created.cmp(&b.created))
    });
}

/// Compute the next batch of jobs to run.
///
/// Fails with `NotFound` if the best-ranked job's name has no registered worker.
pub fn select_jobs(
    jobs: &[Job],
    lifespan_remaining: Option<Duration>,
    registry: &WorkerRegistry,
) -> Result<Vec<Job>> {
    select_jobs_excluding(jobs, lifespan_remaining, registry, &HashSet::new())
}

/// Same as [`select_jobs`], ignoring every job whose name is in `skip`
pub fn select_jobs_excluding(
    jobs: &[Job],
    lifespan_remaining: Option<Duration>,
    registry: &WorkerRegistry,
    skip: &HashSet<String>,
) -> Result<Vec<Job>> {
    let mut eligible: Vec<Job> = jobs
        .iter()
        .filter(|job| !skip.contains(&job.name) && is_eligible(job, lifespan_remaining))
        .cloned()
        .collect();

    sort_jobs(&mut eligible);

    let Some(next) = eligible.first() else {
        return Ok(Vec::new());
    };

    let name = next.name.clone();
    let concurrency = registry.concurrency_of(&name)?;

    Ok(eligible
        .into_iter()
        .filter(|job| job.name == name)
        .take(concurrency)
        .collect())
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration as ChronoDuration, Utc};

    use super::*;
    use crate::error::QueueError;
    use crate::job::JobOptions;
    use crate::registry::{JobContext, WorkerOptions, WorkerResult};

    async fn noop(_ctx: JobContext) -> WorkerResult {
        Ok(())
    }

    fn registry_with(workers: &[(&str, usize)]) -> WorkerRegistry {
        let registry = WorkerRegistry::new();
        for (name, concurrency) in workers {
            registry
                .register(name, noop, WorkerOptions::new().concurrency(*concurrency))
                .unwrap();
        }
        registry
    }

    fn job(name: &str, priority: i32, created: DateTime<Utc>) -> Job {
        Job::new(name, "{}".to_string(), JobOptions::new().with_priority(priority))
            .unwrap()
            .created_at(created)
    }

    fn ago(secs: i64) -> DateTime<Utc> {
        Utc::now() - ChronoDuration::seconds(secs)
    }

    #[test]
    fn higher_priority_runs_first() {
        let registry = registry_with(&[("test", 2)]);
        let a = job("test", 100, ago(1));
        let b = job("test", 90, ago(10));

        let batch = select_jobs(&[b.clone(), a.clone()], None, &registry).unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].id, a.id);
        assert_eq!(batch[1].id, b.id);
    }

    #[test]
    fn older_job_wins_tie() {
        let registry = registry_with(&[("test", 1)]);
        let newer = job("test", 5, ago(1));
        let older = job("test", 5, ago(60));

        let batch = select_jobs(&[newer, older.clone()], None, &registry).unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, older.id);
    }

    #[test]
    fn active_and_failed_jobs_are_never_selected() {
        let registry = registry_with(&[("test", 10)]);
        let mut active = job("test", 100, ago(3));
        active.active = true;
        let mut failed = job("test", 100, ago(2));
        failed.failed = Some(Utc::now());
        let pending = job("test", 1, ago(1));

        let batch = select_jobs(&[active, failed, pending.clone()], None, &registry).unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, pending.id);
    }

    #[test]
    fn batch_is_capped_by_concurrency() {
        let registry = registry_with(&[("test", 5)]);
        let jobs: Vec<Job> = (0..10).map(|i| job("test", 0, ago(100 - i))).collect();

        let batch = select_jobs(&jobs, None, &registry).unwrap();

        assert_eq!(batch.len(), 5);
        let expected: Vec<_> = jobs[..5].iter().map(|j| j.id.clone()).collect();
        let selected: Vec<_> = batch.iter().map(|j| j.id.clone()).collect();
        assert_eq!(selected, expected);
    }

    #[test]
    fn batch_never_mixes_names() {
        let registry = registry_with(&[("email", 10), ("sms", 10)]);
        let jobs = vec![
            job("sms", 1, ago(5)),
            job("email", 50, ago(4)),
            job("sms", 40, ago(3)),
            job("email", 2, ago(2)),
        ];

        let batch = select_jobs(&jobs, None, &registry).unwrap();

        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|j| j.name == "email"));
        assert_eq!(batch[0].priority, 50);
    }

    #[test]
    fn unregistered_name_is_not_found() {
        let registry = registry_with(&[("email", 1)]);
        let jobs = vec![job("orphan", 10, ago(2)), job("email", 1, ago(1))];

        let err = select_jobs(&jobs, None, &registry).unwrap_err();
        assert!(matches!(err, QueueError::NotFound(name) if name == "orphan"));

        let skip: HashSet<String> = ["orphan".to_string()].into_iter().collect();
        let batch = select_jobs_excluding(&jobs, None, &registry, &skip).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].name, "email");
    }

    #[test]
    fn lifespan_excludes_jobs_that_cannot_finish() {
        let registry = registry_with(&[("test", 10)]);
        let with_timeout = |ms: u64| {
            let options = JobOptions::new().with_timeout(Duration::from_millis(ms));
            Job::new("test", "{}".into(), options).unwrap()
        };
        let short = with_timeout(500);
        let long = with_timeout(5000);
        let exact = with_timeout(1000);
        let unbounded = with_timeout(0);
        let jobs = vec![short.clone(), long.clone(), exact, unbounded.clone()];

        let batch = select_jobs(&jobs, Some(Duration::from_millis(1000)), &registry).unwrap();
        let ids: Vec<_> = batch.iter().map(|j| j.id.clone()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&short.id));
        assert!(ids.contains(&unbounded.id));

        // the long job stays eligible once the budget allows it
        let batch = select_jobs(&jobs, Some(Duration::from_millis(10_000)), &registry).unwrap();
        assert!(batch.iter().any(|j| j.id == long.id));
    }

    #[test]
    fn zero_lifespan_means_unbounded() {
        let options = JobOptions::new().with_timeout(Duration::from_secs(60));
        let job = Job::new("test", "{}".into(), options).unwrap();

        assert!(is_eligible(&job, Some(Duration::ZERO)));
        assert!(is_eligible(&job, None));
        assert!(!is_eligible(&job, Some(Duration::from_secs(1))));
    }

    #[test]
    fn empty_input_yields_empty_batch() {
        let registry = WorkerRegistry::new();
        assert!(select_jobs(&[], None, &registry).unwrap().is_empty());
    }

    #[test]
    fn two_test_jobs_concurrency_one_picks_priority_100() {
        let registry = registry_with(&[("test", 1)]);
        let high = job("test", 100, ago(1));
        let low = job("test", 90, ago(2));

        let batch = select_jobs(&[low, high.clone()], None, &registry).unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, high.id);
        assert_eq!(batch[0].priority, 100);
    }
}
