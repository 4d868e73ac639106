use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use super::{Incident, IncidentStatus, Severity};
use crate::jobs::Job;
use crate::pipeline::{self, PipelineOutcome};

/// Category used when the analyzer did not provide one.
pub const DEFAULT_CATEGORY: &str = "General";

impl Incident {
    /// Fold one matched line and its pipeline results into a new open incident.
    pub fn from_scan(user_id: &str, job: &Job, log_line: String, outcome: &PipelineOutcome) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            job_id: job.id.clone(),
            timestamp: Utc::now(),
            severity: Severity::from_log_line(&log_line),
            category: category_from_analysis(&outcome.analysis),
            log_line,
            analysis: outcome.analysis.to_string(),
            root_cause: outcome.root_cause.to_string(),
            knowledge: outcome.knowledge.to_string(),
            action: outcome.action.to_string(),
            title: job.name.clone(),
            service: job.namespace.clone(),
            status: IncidentStatus::Open,
            resolution_time: 0.0,
        }
    }
}

/// Pick a category out of the analyzer's response.
///
/// Looks at `category`, `error_type` and `type` in that order; an analyzer
/// that reported anomalies without naming them yields `Anomaly`.
pub fn category_from_analysis(analysis: &Value) -> String {
    if pipeline::is_marker(analysis) {
        return DEFAULT_CATEGORY.to_string();
    }

    let named = ["category", "error_type", "type"]
        .iter()
        .filter_map(|key| analysis.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|v| !v.is_empty());
    if let Some(name) = named {
        return name.to_string();
    }

    let has_anomalies = analysis
        .get("anomalies")
        .and_then(Value::as_array)
        .is_some_and(|a| !a.is_empty());
    if has_anomalies {
        return "Anomaly".to_string();
    }

    DEFAULT_CATEGORY.to_string()
}
