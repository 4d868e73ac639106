//! Validated job operations exposed to the HTTP layer and the CLI.

use chrono::{TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use super::Job;
use crate::detect::Incident;
use crate::pipeline::Stage;
use crate::storage::Store;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("invalid job request: {0}")]
    InvalidRequest(String),

    #[error("job not found: {0}")]
    NotFound(String),
}

/// Client-supplied job fields, used for both creation and update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JobRequest {
    pub name: String,
    pub cluster: String,
    pub namespace: String,
    pub log_levels: Vec<String>,
    /// Seconds; signed so that bad input is a validation error, not a decode error.
    pub interval: i64,
    pub microservices: Vec<String>,
    pub pods: Vec<String>,
}

impl JobRequest {
    fn validate(&self) -> Result<u64, JobError> {
        if self.namespace.trim().is_empty() {
            return Err(JobError::InvalidRequest("namespace is required".to_string()));
        }
        if !is_dns_label(&self.namespace) {
            return Err(JobError::InvalidRequest(format!(
                "namespace {:?} is not a valid DNS label",
                self.namespace
            )));
        }
        if let Some(pod) = self.pods.iter().find(|p| !is_dns_subdomain(p)) {
            return Err(JobError::InvalidRequest(format!(
                "pod {pod:?} is not a valid pod name"
            )));
        }
        match u64::try_from(self.interval) {
            Ok(secs) if secs > 0 => Ok(secs),
            _ => Err(JobError::InvalidRequest(format!(
                "interval must be a positive number of seconds, got {}",
                self.interval
            ))),
        }
    }

    fn stages(&self) -> Vec<String> {
        if self.microservices.is_empty() {
            Stage::ALL.iter().map(|s| s.name().to_string()).collect()
        } else {
            self.microservices.clone()
        }
    }
}

/// RFC 1123 label: at most 63 lowercase alphanumerics or '-', alphanumeric at
/// both ends. Namespaces must be labels.
fn is_dns_label(s: &str) -> bool {
    let bytes = s.as_bytes();
    !bytes.is_empty()
        && bytes.len() <= 63
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        && bytes[0] != b'-'
        && bytes[bytes.len() - 1] != b'-'
}

/// RFC 1123 subdomain: dot-separated labels, at most 253 bytes. Pod names
/// must be subdomains.
fn is_dns_subdomain(s: &str) -> bool {
    s.len() <= 253 && s.split('.').all(is_dns_label)
}

/// Job and incident operations scoped to a user, on top of the [`Store`].
#[derive(Clone)]
pub struct JobService {
    store: Store,
}

impl JobService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Create a job that is due on the scheduler's next sweep.
    pub async fn create_job(&self, user_id: &str, req: JobRequest) -> Result<Job, JobError> {
        let interval = req.validate()?;
        let now = Utc::now();
        let seed = i64::try_from(interval)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|d| now.checked_sub_signed(d))
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);

        let job = Job {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            microservices: req.stages(),
            name: req.name,
            cluster: req.cluster,
            namespace: req.namespace,
            log_levels: req.log_levels,
            interval,
            created_at: now,
            last_run: seed,
            pods: req.pods,
        };

        self.store.add_job(user_id, job.clone()).await;
        info!(user = %user_id, job = %job.id, namespace = %job.namespace, "Job created");
        Ok(job)
    }

    pub async fn list_jobs(&self, user_id: &str) -> Vec<Job> {
        self.store.get_jobs(user_id).await
    }

    /// Replace the mutable fields of a job; returns the user's full job list.
    pub async fn update_job(
        &self,
        user_id: &str,
        job_id: &str,
        req: JobRequest,
    ) -> Result<Vec<Job>, JobError> {
        let interval = req.validate()?;
        let stages = req.stages();

        let updated = self
            .store
            .update_job(user_id, job_id, move |job| {
                job.name = req.name;
                job.cluster = req.cluster;
                job.namespace = req.namespace;
                job.log_levels = req.log_levels;
                job.interval = interval;
                job.microservices = stages;
                job.pods = req.pods;
            })
            .await
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

        info!(user = %user_id, job = %job_id, "Job updated");
        Ok(updated)
    }

    pub async fn delete_job(&self, user_id: &str, job_id: &str) -> Result<(), JobError> {
        if !self.store.delete_job(user_id, job_id).await {
            return Err(JobError::NotFound(job_id.to_string()));
        }
        info!(user = %user_id, job = %job_id, "Job deleted");
        Ok(())
    }

    pub async fn recent_incidents(&self, user_id: &str) -> Vec<Incident> {
        self.store.get_recent_incidents(user_id).await
    }
}
