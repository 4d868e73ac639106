//! Incident detection -- log-level filtering and incident records.

pub mod filter;
pub mod incident;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use self::filter::LevelFilter;

/// Severity bucket derived from keywords in the matched log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    /// First match wins: CRITICAL, ERROR, WARN, INFO.
    pub fn from_log_line(line: &str) -> Option<Self> {
        let upper = line.to_uppercase();
        if upper.contains("CRITICAL") {
            Some(Severity::Critical)
        } else if upper.contains("ERROR") {
            Some(Severity::High)
        } else if upper.contains("WARN") {
            Some(Severity::Medium)
        } else if upper.contains("INFO") {
            Some(Severity::Low)
        } else {
            None
        }
    }
}

/// Incidents are created open; nothing in the gateway transitions them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncidentStatus {
    #[default]
    Open,
}

/// One matched log line together with the output of each pipeline stage.
///
/// Stage fields hold the serialized JSON result of the stage, or the
/// `Not Run` / `Not Found` marker objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub user_id: String,
    pub job_id: String,
    pub timestamp: DateTime<Utc>,
    pub log_line: String,
    pub analysis: String,
    pub root_cause: String,
    pub knowledge: String,
    pub action: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub status: IncidentStatus,
    #[serde(default = "default_category")]
    pub category: String,
    /// Hours to resolution; zero while unresolved.
    #[serde(default)]
    pub resolution_time: f64,
}

fn default_category() -> String {
    incident::DEFAULT_CATEGORY.to_string()
}
