//! Kubernetes REST API log source.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{LogSource, LogSourceError, PodInfo};
use crate::config::LogSourceConfig;

/// Lists pods and streams logs through the core/v1 API.
pub struct KubeLogSource {
    client: Client,
    api_url: Url,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<Pod>,
}

#[derive(Debug, Deserialize)]
struct Pod {
    metadata: ObjectMeta,
    #[serde(default)]
    spec: PodSpec,
}

#[derive(Debug, Deserialize)]
struct ObjectMeta {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct PodSpec {
    #[serde(default)]
    containers: Vec<Container>,
}

#[derive(Debug, Deserialize)]
struct Container {
    name: String,
}

impl KubeLogSource {
    pub fn new(config: &LogSourceConfig) -> Result<Self, LogSourceError> {
        let mut builder =
            Client::builder().timeout(Duration::from_secs(config.request_timeout_secs.max(1)));

        if let Some(ca) = config.ca_file.as_ref().filter(|p| p.exists()) {
            let pem = std::fs::read(ca)?;
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
            debug!(path = %ca.display(), "Using cluster CA certificate");
        }
        if config.accept_invalid_certs {
            warn!("TLS certificate verification disabled for the cluster API");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let token = match config.token_file.as_ref().filter(|p| p.exists()) {
            Some(path) => Some(std::fs::read_to_string(path)?.trim().to_string()),
            None => None,
        };

        let api_url = Url::parse(&config.api_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| LogSourceError::InvalidApiUrl(config.api_url.clone()))?;

        info!(api_url = %api_url, authenticated = token.is_some(), "Kubernetes log source ready");
        Ok(Self {
            client: builder.build()?,
            api_url,
            token,
        })
    }

    /// API URL with `segments` appended, each percent-encoded as a single
    /// path segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.api_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn pods_url(&self, namespace: &str) -> Url {
        self.endpoint(&["api", "v1", "namespaces", namespace, "pods"])
    }

    fn log_url(&self, namespace: &str, pod: &str) -> Url {
        self.endpoint(&["api", "v1", "namespaces", namespace, "pods", pod, "log"])
    }

    fn get(&self, url: Url) -> RequestBuilder {
        let req = self.client.get(url);
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait::async_trait]
impl LogSource for KubeLogSource {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodInfo>, LogSourceError> {
        let resp = self.get(self.pods_url(namespace)).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(LogSourceError::NamespaceNotFound(namespace.to_string()));
        }
        let list: PodList = resp.error_for_status()?.json().await?;

        Ok(list
            .items
            .into_iter()
            .map(|pod| PodInfo {
                name: pod.metadata.name,
                containers: pod.spec.containers.into_iter().map(|c| c.name).collect(),
            })
            .collect())
    }

    async fn tail_log(
        &self,
        namespace: &str,
        pod: &str,
        container: Option<&str>,
        max_lines: u32,
    ) -> Result<String, LogSourceError> {
        let mut req = self
            .get(self.log_url(namespace, pod))
            .query(&[("tailLines", max_lines.to_string())]);
        if let Some(container) = container {
            req = req.query(&[("container", container)]);
        }

        let resp = req.send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(LogSourceError::PodNotFound {
                namespace: namespace.to_string(),
                pod: pod.to_string(),
            });
        }
        Ok(resp.error_for_status()?.text().await?)
    }
}
