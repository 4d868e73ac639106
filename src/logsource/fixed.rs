//! In-memory log source with canned pods and log text.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{LogSource, LogSourceError, PodInfo};

/// Serves fixed pods and log text; useful for demos and tests.
#[derive(Debug, Default)]
pub struct StaticLogSource {
    pods: HashMap<String, Vec<PodInfo>>,
    logs: HashMap<(String, String), String>,
    tail_calls: AtomicUsize,
}

impl StaticLogSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single-container pod whose log is `text`.
    pub fn with_pod(mut self, namespace: &str, pod: &str, text: &str) -> Self {
        self.pods
            .entry(namespace.to_string())
            .or_default()
            .push(PodInfo::new(pod, &[pod]));
        self.logs
            .insert((namespace.to_string(), pod.to_string()), text.to_string());
        self
    }

    /// Number of `tail_log` calls served so far.
    pub fn tail_calls(&self) -> usize {
        self.tail_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl LogSource for StaticLogSource {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodInfo>, LogSourceError> {
        self.pods
            .get(namespace)
            .cloned()
            .ok_or_else(|| LogSourceError::NamespaceNotFound(namespace.to_string()))
    }

    async fn tail_log(
        &self,
        namespace: &str,
        pod: &str,
        _container: Option<&str>,
        max_lines: u32,
    ) -> Result<String, LogSourceError> {
        self.tail_calls.fetch_add(1, Ordering::SeqCst);
        let text = self
            .logs
            .get(&(namespace.to_string(), pod.to_string()))
            .ok_or_else(|| LogSourceError::PodNotFound {
                namespace: namespace.to_string(),
                pod: pod.to_string(),
            })?;

        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(max_lines as usize);
        Ok(lines[start..].join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tail_keeps_last_lines() {
        let source = StaticLogSource::new().with_pod("default", "api-0", "a\nb\nc\nd");
        let tail = source.tail_log("default", "api-0", None, 2).await.unwrap();
        assert_eq!(tail, "c\nd");
        assert_eq!(source.tail_calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_namespace_is_error() {
        let source = StaticLogSource::new();
        assert!(matches!(
            source.list_pods("missing").await,
            Err(LogSourceError::NamespaceNotFound(_))
        ));
    }
}
