use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::executor::JobExecutor;
use crate::jobs::Job;
use crate::storage::Store;

type JobKey = (String, String);

/// Counts from one pass over the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub due: usize,
    pub launched: usize,
    /// Due but still running from an earlier sweep.
    pub already_running: usize,
    /// Due but no concurrency slot was free.
    pub saturated: usize,
}

/// Everything the polling loop and the job tasks share.
#[derive(Clone)]
pub(super) struct Engine {
    pub(super) store: Store,
    pub(super) executor: Arc<dyn JobExecutor>,
    pub(super) limiter: Arc<Semaphore>,
    pub(super) in_flight: Arc<Mutex<HashSet<JobKey>>>,
    pub(super) poll_interval: Duration,
}

/// Removes a job from the in-flight set when its task ends, even on panic.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<JobKey>>>,
    key: JobKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

impl Engine {
    /// Sweep, sleep, repeat until `cancel` fires. In-flight jobs are not
    /// interrupted.
    pub(super) async fn run(self, cancel: CancellationToken) {
        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            max_concurrent_jobs = self.limiter.available_permits(),
            "Scheduler engine started"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }
            let report = self.sweep(Utc::now()).await;
            if report.due > 0 {
                debug!(?report, "Sweep finished");
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("Scheduler engine stopped");
    }

    /// Launch every due job that is not already running, as long as slots
    /// are free. Jobs that do not get a slot are picked up by a later sweep.
    pub(super) async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        for (user_id, job) in self.store.all_jobs().await {
            if !job.is_due(now) {
                continue;
            }
            report.due += 1;

            let Some(guard) = self.claim((user_id.clone(), job.id.clone())) else {
                report.already_running += 1;
                continue;
            };

            // Dropping the guard releases the claim.
            let Ok(permit) = self.limiter.clone().try_acquire_owned() else {
                debug!(user = %user_id, job = %job.id, "No free job slot, retrying next sweep");
                report.saturated += 1;
                continue;
            };

            let engine = self.clone();
            tokio::spawn(async move {
                let _permit = permit;
                let _guard = guard;
                engine.run_job(user_id, job).await;
            });
            report.launched += 1;
        }

        report
    }

    /// Mark a job as running; `None` if some sweep already has it.
    fn claim(&self, key: JobKey) -> Option<InFlightGuard> {
        let inserted = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone());
        inserted.then(|| InFlightGuard {
            set: self.in_flight.clone(),
            key,
        })
    }

    /// Execute one job; on success store its incidents and advance its last
    /// run. A failed run leaves the job due so it is retried.
    async fn run_job(&self, user_id: String, job: Job) {
        let started = Instant::now();
        info!(user = %user_id, job = %job.id, namespace = %job.namespace, "Running log scan job");

        match self.executor.execute(&user_id, &job).await {
            Ok(incidents) => {
                let count = incidents.len();
                // Save failures are logged by the store and do not block the run.
                let _ = self.store.add_incidents(&user_id, incidents).await;
                if !self.store.record_run(&user_id, &job.id, Utc::now()).await {
                    debug!(user = %user_id, job = %job.id, "Job removed while running");
                }
                info!(
                    user = %user_id,
                    job = %job.id,
                    incidents = count,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Log scan job finished"
                );
            }
            Err(e) => {
                error!(
                    user = %user_id,
                    job = %job.id,
                    error = %e,
                    "Log scan job failed, will retry when next due"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::detect::Incident;
    use crate::scheduler::ExecutionError;

    struct NoopExecutor;

    #[async_trait::async_trait]
    impl JobExecutor for NoopExecutor {
        async fn execute(&self, _: &str, _: &Job) -> Result<Vec<Incident>, ExecutionError> {
            Ok(Vec::new())
        }
    }

    fn engine(dir: &tempfile::TempDir) -> Engine {
        Engine {
            store: Store::new(&StorageConfig {
                jobs_file: dir.path().join("jobs.json"),
                incidents_file: dir.path().join("incidents.json"),
                recent_incidents_limit: 50,
            }),
            executor: Arc::new(NoopExecutor),
            limiter: Arc::new(Semaphore::new(2)),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            poll_interval: Duration::from_millis(20),
        }
    }

    #[test]
    fn test_claim_is_exclusive_until_released() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        let key = ("alice".to_string(), "job-1".to_string());

        let first = engine.claim(key.clone());
        assert!(first.is_some());
        assert!(engine.claim(key.clone()).is_none());
        // Other jobs are unaffected.
        assert!(engine.claim(("alice".to_string(), "job-2".to_string())).is_some());

        drop(first);
        assert!(engine.claim(key).is_some());
    }
}
