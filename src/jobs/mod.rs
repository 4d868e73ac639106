//! Log-scan jobs -- a user's standing request to scan a namespace's logs.

pub mod service;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

pub use self::service::{JobError, JobRequest, JobService};

/// A scheduled log scan job owned by one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cluster: String,
    pub namespace: String,
    /// Level keywords matched case-insensitively against raw log lines.
    #[serde(default)]
    pub log_levels: Vec<String>,
    /// Seconds between two runs.
    pub interval: u64,
    pub created_at: DateTime<Utc>,
    pub last_run: DateTime<Utc>,
    /// Pipeline stages to invoke, by name.
    #[serde(default)]
    pub microservices: Vec<String>,
    /// Explicit pods to scan; empty means every pod in the namespace.
    #[serde(default)]
    pub pods: Vec<String>,
}

impl Job {
    pub fn interval(&self) -> TimeDelta {
        i64::try_from(self.interval)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }

    /// A job is due once the time since its last run reaches its interval.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.last_run) >= self.interval()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_with(interval: u64, last_run: DateTime<Utc>) -> Job {
        Job {
            id: "job-1".to_string(),
            user_id: "alice".to_string(),
            name: "api errors".to_string(),
            cluster: String::new(),
            namespace: "default".to_string(),
            log_levels: vec!["ERROR".to_string()],
            interval,
            created_at: last_run,
            last_run,
            microservices: Vec::new(),
            pods: Vec::new(),
        }
    }

    #[test]
    fn test_due_at_exact_boundary() {
        let now = Utc::now();
        let job = job_with(30, now - TimeDelta::seconds(30));
        assert!(job.is_due(now));
    }

    #[test]
    fn test_not_due_just_before_boundary() {
        let now = Utc::now();
        let job = job_with(30, now - TimeDelta::seconds(30) + TimeDelta::milliseconds(1));
        assert!(!job.is_due(now));
    }

    #[test]
    fn test_due_long_after() {
        let now = Utc::now();
        let job = job_with(30, now - TimeDelta::hours(1));
        assert!(job.is_due(now));
    }

    #[test]
    fn test_last_run_in_future_is_not_due() {
        let now = Utc::now();
        let job = job_with(1, now + TimeDelta::seconds(10));
        assert!(!job.is_due(now));
    }

    #[test]
    fn test_huge_interval_never_overflows() {
        let now = Utc::now();
        let job = job_with(u64::MAX, now - TimeDelta::days(365));
        assert!(!job.is_due(now));
    }

    #[test]
    fn test_missing_optional_fields_deserialize() {
        let raw = r#"{
            "id": "j1",
            "user_id": "u1",
            "namespace": "prod",
            "interval": 60,
            "created_at": "2025-01-01T00:00:00Z",
            "last_run": "2025-01-01T00:00:00Z"
        }"#;
        let job: Job = serde_json::from_str(raw).unwrap();
        assert!(job.pods.is_empty());
        assert!(job.microservices.is_empty());
        assert_eq!(job.interval, 60);
    }
}
