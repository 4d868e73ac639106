//! Log sources -- where scan jobs read pod logs from.

pub mod fixed;
pub mod kube;

use thiserror::Error;

pub use self::fixed::StaticLogSource;
pub use self::kube::KubeLogSource;

#[derive(Debug, Error)]
pub enum LogSourceError {
    #[error("cluster API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to read credentials: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid cluster API URL: {0}")]
    InvalidApiUrl(String),

    #[error("namespace not found: {0}")]
    NamespaceNotFound(String),

    #[error("pod not found: {namespace}/{pod}")]
    PodNotFound { namespace: String, pod: String },
}

/// A pod and the containers it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodInfo {
    pub name: String,
    pub containers: Vec<String>,
}

impl PodInfo {
    pub fn new(name: impl Into<String>, containers: &[&str]) -> Self {
        Self {
            name: name.into(),
            containers: containers.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Capability to enumerate pods and tail their logs.
#[async_trait::async_trait]
pub trait LogSource: Send + Sync {
    /// List the pods currently in `namespace`.
    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodInfo>, LogSourceError>;

    /// Last `max_lines` lines of a container's log. `container = None`
    /// selects the pod's default container.
    async fn tail_log(
        &self,
        namespace: &str,
        pod: &str,
        container: Option<&str>,
        max_lines: u32,
    ) -> Result<String, LogSourceError>;
}
