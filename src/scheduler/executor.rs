//! Job execution -- one run of one job.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::detect::{Incident, LevelFilter};
use crate::jobs::Job;
use crate::logsource::{LogSource, LogSourceError, PodInfo};
use crate::pipeline::Pipeline;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("log source error: {0}")]
    LogSource(#[from] LogSourceError),
}

/// Executes a job once and returns the incidents it produced.
///
/// The scheduler only depends on this trait, so tests can inject doubles.
#[async_trait::async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, user_id: &str, job: &Job) -> Result<Vec<Incident>, ExecutionError>;
}

/// Production executor: tail pod logs, filter by level, run the pipeline.
pub struct LogScanExecutor {
    log_source: Arc<dyn LogSource>,
    pipeline: Pipeline,
    tail_lines: u32,
}

impl LogScanExecutor {
    pub fn new(log_source: Arc<dyn LogSource>, pipeline: Pipeline, tail_lines: u32) -> Self {
        Self {
            log_source,
            pipeline,
            tail_lines,
        }
    }

    /// Matching lines from every selected pod and container.
    ///
    /// Failing to list pods fails the run; a container whose log cannot be
    /// read is skipped.
    async fn collect_lines(&self, job: &Job) -> Result<Vec<String>, ExecutionError> {
        let filter = LevelFilter::new(&job.log_levels);
        if filter.is_empty() {
            debug!(job = %job.id, "Job has no log levels, nothing to match");
            return Ok(Vec::new());
        }

        let pods = select_pods(self.log_source.list_pods(&job.namespace).await?, job);
        let mut lines = Vec::new();

        for pod in &pods {
            let containers: Vec<Option<&str>> = if pod.containers.is_empty() {
                vec![None]
            } else {
                pod.containers.iter().map(|c| Some(c.as_str())).collect()
            };

            for container in containers {
                match self
                    .log_source
                    .tail_log(&job.namespace, &pod.name, container, self.tail_lines)
                    .await
                {
                    Ok(text) => lines.extend(filter.matching_lines(&text)),
                    Err(e) => {
                        warn!(
                            job = %job.id,
                            namespace = %job.namespace,
                            pod = %pod.name,
                            container = container.unwrap_or("-"),
                            error = %e,
                            "Could not read container log, skipping"
                        );
                    }
                }
            }
        }

        Ok(lines)
    }
}

/// Restrict the namespace listing to the job's explicit pods, if any.
fn select_pods(listed: Vec<PodInfo>, job: &Job) -> Vec<PodInfo> {
    if job.pods.is_empty() {
        return listed;
    }
    for wanted in &job.pods {
        if !listed.iter().any(|p| &p.name == wanted) {
            warn!(job = %job.id, namespace = %job.namespace, pod = %wanted, "Configured pod not found");
        }
    }
    listed
        .into_iter()
        .filter(|p| job.pods.contains(&p.name))
        .collect()
}

#[async_trait::async_trait]
impl JobExecutor for LogScanExecutor {
    async fn execute(&self, user_id: &str, job: &Job) -> Result<Vec<Incident>, ExecutionError> {
        let lines = self.collect_lines(job).await?;
        debug!(user = %user_id, job = %job.id, matched = lines.len(), "Log lines matched");

        let mut incidents = Vec::with_capacity(lines.len());
        for line in lines {
            let outcome = self.pipeline.run(&line, &job.microservices).await;
            incidents.push(Incident::from_scan(user_id, job, line, &outcome));
        }
        Ok(incidents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::detect::Severity;
    use crate::logsource::StaticLogSource;
    use crate::pipeline;
    use chrono::Utc;

    fn job(pods: &[&str], levels: &[&str]) -> Job {
        let now = Utc::now();
        Job {
            id: "job-1".to_string(),
            user_id: "alice".to_string(),
            name: "scan".to_string(),
            cluster: String::new(),
            namespace: "default".to_string(),
            log_levels: levels.iter().map(|s| s.to_string()).collect(),
            interval: 1,
            created_at: now,
            last_run: now,
            microservices: Vec::new(),
            pods: pods.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn executor(source: StaticLogSource) -> (Arc<StaticLogSource>, LogScanExecutor) {
        let source = Arc::new(source);
        let pipeline = Pipeline::new(&PipelineConfig::default()).unwrap();
        let exec = LogScanExecutor::new(source.clone(), pipeline, 100);
        (source, exec)
    }

    #[tokio::test]
    async fn test_explicit_pods_limit_the_scan() {
        let (source, exec) = executor(
            StaticLogSource::new()
                .with_pod("default", "api-0", "ERROR a")
                .with_pod("default", "web-0", "ERROR b"),
        );
        let incidents = exec.execute("alice", &job(&["web-0"], &["error"])).await.unwrap();

        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].log_line, "ERROR b");
        assert_eq!(incidents[0].severity, Some(Severity::High));
        // No stages enabled on this job.
        assert_eq!(incidents[0].analysis, pipeline::not_run().to_string());
        assert_eq!(source.tail_calls(), 1);
    }

    #[tokio::test]
    async fn test_one_incident_per_matching_line() {
        let (_, exec) = executor(
            StaticLogSource::new().with_pod("default", "api-0", "INFO ok\nERROR a\nWARN b\nERROR c"),
        );
        let incidents = exec.execute("alice", &job(&[], &["ERROR"])).await.unwrap();
        let lines: Vec<_> = incidents.iter().map(|i| i.log_line.as_str()).collect();
        assert_eq!(lines, vec!["ERROR a", "ERROR c"]);
    }

    #[tokio::test]
    async fn test_unknown_namespace_fails_the_run() {
        let (_, exec) = executor(StaticLogSource::new());
        let err = exec.execute("alice", &job(&[], &["ERROR"])).await.unwrap_err();
        assert!(matches!(err, ExecutionError::LogSource(_)));
    }

    #[tokio::test]
    async fn test_no_levels_skips_the_cluster() {
        let (source, exec) = executor(StaticLogSource::new());
        let incidents = exec.execute("alice", &job(&[], &[])).await.unwrap();
        assert!(incidents.is_empty());
        assert_eq!(source.tail_calls(), 0);
    }
}
