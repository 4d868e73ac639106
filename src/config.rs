//! TOML configuration for the logscan gateway.
//!
//! Layered model: compiled-in defaults, an optional TOML file, then a small
//! set of environment overrides for the values deployments usually inject
//! (service URLs, snapshot paths, cluster endpoint).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "LOGSCAN_CONFIG";

/// Config file looked up in the working directory when nothing else is given.
pub const DEFAULT_CONFIG_FILE: &str = "logscan.toml";

/// Errors raised while reading the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for the gateway process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub log_source: LogSourceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Resolve configuration from, in order:
    /// 1. `explicit` (the `--config` flag); failing to load it is an error.
    /// 2. The path in `LOGSCAN_CONFIG`.
    /// 3. `./logscan.toml`.
    /// 4. Compiled-in defaults.
    ///
    /// Environment overrides are applied on top of whichever source won.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => Self::discover(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn discover() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "LOGSCAN_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.exists() {
            match Self::load(local) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %local.display(),
                        error = %e,
                        "config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }

    /// Apply environment overrides through `lookup` (injectable for tests).
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |target: &mut String, key: &str| {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *target = value;
            }
        };
        set(&mut self.pipeline.log_analyzer_url, "LOG_ANALYZER_URL");
        set(&mut self.pipeline.root_cause_predictor_url, "ROOT_CAUSE_PREDICTOR_URL");
        set(&mut self.pipeline.knowledge_base_url, "KNOWLEDGE_BASE_URL");
        set(&mut self.pipeline.action_recommender_url, "ACTION_RECOMMENDER_URL");
        set(&mut self.log_source.api_url, "KUBE_API_URL");

        if let Some(path) = lookup("KUBE_TOKEN_FILE").filter(|v| !v.is_empty()) {
            self.log_source.token_file = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("JOBS_FILE").filter(|v| !v.is_empty()) {
            self.storage.jobs_file = PathBuf::from(path);
        }
        if let Some(path) = lookup("INCIDENTS_FILE").filter(|v| !v.is_empty()) {
            self.storage.incidents_file = PathBuf::from(path);
        }
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP API listens on.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Snapshot file locations for the job and incident stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub jobs_file: PathBuf,
    pub incidents_file: PathBuf,
    /// Number of incidents returned by the recent-incidents view.
    pub recent_incidents_limit: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            jobs_file: PathBuf::from("jobs_data.json"),
            incidents_file: PathBuf::from("incidents_data.json"),
            recent_incidents_limit: 50,
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Pause between two sweeps over the job store.
    pub poll_interval_ms: u64,
    /// Upper bound on simultaneously executing jobs.
    pub max_concurrent_jobs: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            max_concurrent_jobs: 5,
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Endpoints of the four analysis microservices.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub log_analyzer_url: String,
    pub root_cause_predictor_url: String,
    pub knowledge_base_url: String,
    pub action_recommender_url: String,
    /// Per-call deadline; a stage that exceeds it counts as failed.
    pub request_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            log_analyzer_url: "http://log-analyzer:8000/analyze".to_string(),
            root_cause_predictor_url: "http://root-cause-predictor:8000/predict".to_string(),
            knowledge_base_url: "http://knowledge-base:8000/search".to_string(),
            action_recommender_url: "http://action-recommender:8000/recommend".to_string(),
            request_timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// Log source
// ---------------------------------------------------------------------------

/// Kubernetes API access used to list pods and tail their logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSourceConfig {
    /// Base URL of the API server, e.g. `http://127.0.0.1:8001` behind `kubectl proxy`.
    pub api_url: String,
    /// Bearer token file; skipped when the file does not exist.
    pub token_file: Option<PathBuf>,
    /// Extra PEM root certificate for the API server.
    pub ca_file: Option<PathBuf>,
    pub accept_invalid_certs: bool,
    /// Lines requested from the tail of each container log.
    pub tail_lines: u32,
    pub request_timeout_secs: u64,
}

impl Default for LogSourceConfig {
    fn default() -> Self {
        Self {
            api_url: "https://kubernetes.default.svc".to_string(),
            token_file: Some(PathBuf::from(
                "/var/run/secrets/kubernetes.io/serviceaccount/token",
            )),
            ca_file: Some(PathBuf::from(
                "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt",
            )),
            accept_invalid_certs: false,
            tail_lines: 100,
            request_timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_reference_deployment() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.scheduler.poll_interval_ms, 5_000);
        assert_eq!(cfg.scheduler.max_concurrent_jobs, 5);
        assert_eq!(cfg.storage.recent_incidents_limit, 50);
        assert_eq!(cfg.log_source.tail_lines, 100);
        assert_eq!(cfg.storage.jobs_file, PathBuf::from("jobs_data.json"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [scheduler]
            max_concurrent_jobs = 2

            [logging]
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.scheduler.max_concurrent_jobs, 2);
        assert_eq!(cfg.scheduler.poll_interval_ms, 5_000);
        assert_eq!(cfg.logging.format, LogFormat::Json);
        assert_eq!(cfg.server.bind, "0.0.0.0:8080");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("LOG_ANALYZER_URL", "http://localhost:9001/analyze"),
            ("JOBS_FILE", "/tmp/jobs.json"),
            ("KNOWLEDGE_BASE_URL", ""),
        ]
        .into_iter()
        .collect();

        let mut cfg = AppConfig::default();
        cfg.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.pipeline.log_analyzer_url, "http://localhost:9001/analyze");
        assert_eq!(cfg.storage.jobs_file, PathBuf::from("/tmp/jobs.json"));
        // Empty values do not clobber defaults.
        assert_eq!(cfg.pipeline.knowledge_base_url, "http://knowledge-base:8000/search");
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let err = AppConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
