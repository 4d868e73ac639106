//! Job and incident store -- per-user in-memory maps with JSON snapshots.
//!
//! The store is the only state shared between the HTTP layer and the
//! scheduler. Each collection has its own lock; readers always get copies.
//! Job saves are fire-and-forget, incident saves are awaited.

pub mod snapshot;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use self::snapshot::SnapshotFile;
use crate::config::StorageConfig;
use crate::detect::Incident;
use crate::jobs::Job;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Cloneable handle to the shared job/incident state.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

struct Inner {
    jobs: RwLock<HashMap<String, Vec<Job>>>,
    incidents: RwLock<HashMap<String, Vec<Incident>>>,
    jobs_file: SnapshotFile,
    incidents_file: SnapshotFile,
    recent_limit: usize,
}

impl Store {
    /// Create an empty store backed by the configured snapshot files.
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                jobs: RwLock::new(HashMap::new()),
                incidents: RwLock::new(HashMap::new()),
                jobs_file: SnapshotFile::new(&config.jobs_file),
                incidents_file: SnapshotFile::new(&config.incidents_file),
                recent_limit: config.recent_incidents_limit,
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Replace the in-memory jobs with the snapshot file's contents.
    ///
    /// A missing file yields an empty map. On any other failure the current
    /// in-memory state is left as it was.
    pub async fn load_jobs(&self) -> Result<usize, StoreError> {
        let path = self.inner.jobs_file.path();
        let loaded = match self.inner.jobs_file.read::<Job>().await? {
            Some(map) => map,
            None => {
                info!(path = %path.display(), "Jobs file does not exist, starting empty");
                HashMap::new()
            }
        };
        let count = loaded.values().map(Vec::len).sum();
        *self.inner.jobs.write().await = loaded;
        info!(path = %path.display(), count, "Jobs loaded");
        Ok(count)
    }

    /// Replace the in-memory incidents with the snapshot file's contents.
    pub async fn load_incidents(&self) -> Result<usize, StoreError> {
        let path = self.inner.incidents_file.path();
        let loaded = match self.inner.incidents_file.read::<Incident>().await? {
            Some(map) => map,
            None => {
                info!(path = %path.display(), "Incidents file does not exist, starting empty");
                HashMap::new()
            }
        };
        let count = loaded.values().map(Vec::len).sum();
        *self.inner.incidents.write().await = loaded;
        info!(path = %path.display(), count, "Incidents loaded");
        Ok(count)
    }

    /// Write every user's jobs to the jobs file.
    pub async fn save_jobs(&self) -> Result<(), StoreError> {
        let file = &self.inner.jobs_file;
        let _writer = file.lock().await;
        let data = {
            let jobs = self.inner.jobs.read().await;
            serde_json::to_vec_pretty(&*jobs)?
        };
        file.write(&data).await?;
        debug!(path = %file.path().display(), bytes = data.len(), "Jobs saved");
        Ok(())
    }

    /// Write every user's incidents to the incidents file.
    pub async fn save_incidents(&self) -> Result<(), StoreError> {
        let file = &self.inner.incidents_file;
        let _writer = file.lock().await;
        let data = {
            let incidents = self.inner.incidents.read().await;
            serde_json::to_vec_pretty(&*incidents)?
        };
        file.write(&data).await?;
        debug!(path = %file.path().display(), bytes = data.len(), "Incidents saved");
        Ok(())
    }

    fn spawn_save_jobs(&self) {
        let store = self.clone();
        tokio::spawn(async move {
            if let Err(e) = store.save_jobs().await {
                error!(
                    path = %store.inner.jobs_file.path().display(),
                    error = %e,
                    "Failed to save jobs"
                );
            }
        });
    }

    // -----------------------------------------------------------------------
    // Jobs
    // -----------------------------------------------------------------------

    pub async fn add_job(&self, user_id: &str, job: Job) {
        self.inner
            .jobs
            .write()
            .await
            .entry(user_id.to_string())
            .or_default()
            .push(job);
        self.spawn_save_jobs();
    }

    /// Copy of a user's jobs; empty for unknown users.
    pub async fn get_jobs(&self, user_id: &str) -> Vec<Job> {
        self.inner
            .jobs
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Replace a user's whole job list.
    pub async fn set_jobs(&self, user_id: &str, jobs: Vec<Job>) {
        self.inner
            .jobs
            .write()
            .await
            .insert(user_id.to_string(), jobs);
        self.spawn_save_jobs();
    }

    /// Apply `f` to one job under the write lock.
    ///
    /// Returns the user's updated job list, or `None` if no such job exists.
    pub async fn update_job<F>(&self, user_id: &str, job_id: &str, f: F) -> Option<Vec<Job>>
    where
        F: FnOnce(&mut Job),
    {
        let updated = {
            let mut jobs = self.inner.jobs.write().await;
            let user_jobs = jobs.get_mut(user_id)?;
            let job = user_jobs.iter_mut().find(|j| j.id == job_id)?;
            f(job);
            user_jobs.clone()
        };
        self.spawn_save_jobs();
        Some(updated)
    }

    /// Remove a job. Returns whether anything was removed.
    pub async fn delete_job(&self, user_id: &str, job_id: &str) -> bool {
        let removed = {
            let mut jobs = self.inner.jobs.write().await;
            match jobs.get_mut(user_id) {
                Some(user_jobs) => {
                    let before = user_jobs.len();
                    user_jobs.retain(|j| j.id != job_id);
                    user_jobs.len() != before
                }
                None => false,
            }
        };
        if removed {
            self.spawn_save_jobs();
        }
        removed
    }

    /// Advance a job's last run to `at`; never moves it backwards.
    ///
    /// The job may have been deleted while it was running, which is not an
    /// error.
    pub async fn record_run(&self, user_id: &str, job_id: &str, at: DateTime<Utc>) -> bool {
        self.update_job(user_id, job_id, |job| {
            if at > job.last_run {
                job.last_run = at;
            }
        })
        .await
        .is_some()
    }

    /// Consistent snapshot of every `(user, job)` pair.
    pub async fn all_jobs(&self) -> Vec<(String, Job)> {
        self.inner
            .jobs
            .read()
            .await
            .iter()
            .flat_map(|(user, jobs)| jobs.iter().map(move |j| (user.clone(), j.clone())))
            .collect()
    }

    pub async fn clear_jobs(&self) {
        self.inner.jobs.write().await.clear();
    }

    // -----------------------------------------------------------------------
    // Incidents
    // -----------------------------------------------------------------------

    /// Append one incident and wait for the snapshot to be written.
    pub async fn add_incident(&self, user_id: &str, incident: Incident) -> Result<(), StoreError> {
        self.add_incidents(user_id, vec![incident]).await
    }

    /// Append a batch of incidents with a single awaited save.
    ///
    /// The in-memory append stands even if the save fails.
    pub async fn add_incidents(
        &self,
        user_id: &str,
        incidents: Vec<Incident>,
    ) -> Result<(), StoreError> {
        if incidents.is_empty() {
            return Ok(());
        }
        let count = incidents.len();
        self.inner
            .incidents
            .write()
            .await
            .entry(user_id.to_string())
            .or_default()
            .extend(incidents);
        debug!(user = %user_id, count, "Incidents recorded");

        self.save_incidents().await.map_err(|e| {
            error!(
                path = %self.inner.incidents_file.path().display(),
                error = %e,
                "Failed to save incidents"
            );
            e
        })
    }

    /// The user's most recent incidents, oldest first.
    pub async fn get_recent_incidents(&self, user_id: &str) -> Vec<Incident> {
        let incidents = self.inner.incidents.read().await;
        match incidents.get(user_id) {
            Some(all) => {
                let start = all.len().saturating_sub(self.inner.recent_limit);
                all[start..].to_vec()
            }
            None => Vec::new(),
        }
    }

    /// Total number of stored incidents for a user, beyond the recent view.
    pub async fn incident_count(&self, user_id: &str) -> usize {
        self.inner
            .incidents
            .read()
            .await
            .get(user_id)
            .map_or(0, Vec::len)
    }

    pub async fn clear_incidents(&self) {
        self.inner.incidents.write().await.clear();
    }
}
