//! Analysis pipeline -- chains one log line through the four microservices.
//!
//! Stages run in a fixed order and never abort the chain: a disabled stage
//! yields the `Not Run` marker without any network call, a failing stage
//! yields the `Not Found` marker and the next stage still runs.

pub mod stage;

use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

pub use self::stage::Stage;
use crate::config::PipelineConfig;

pub const NOT_RUN: &str = "Not Run";
pub const NOT_FOUND: &str = "Not Found";

/// Result recorded for a stage the job did not enable.
pub fn not_run() -> Value {
    json!({ "detail": NOT_RUN })
}

/// Result recorded for an enabled stage whose call failed.
pub fn not_found() -> Value {
    json!({ "detail": NOT_FOUND })
}

/// Whether `value` is one of the two marker objects.
pub fn is_marker(value: &Value) -> bool {
    matches!(
        value.get("detail").and_then(Value::as_str),
        Some(NOT_RUN) | Some(NOT_FOUND)
    ) && value.as_object().is_some_and(|o| o.len() == 1)
}

/// Outputs of the four stages for one log line.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub analysis: Value,
    pub root_cause: Value,
    pub knowledge: Value,
    pub action: Value,
}

/// The predictor's `root_cause` field, or null when it was skipped or failed.
fn root_cause_field(predictor_output: &Value) -> Value {
    predictor_output
        .get("root_cause")
        .cloned()
        .unwrap_or(Value::Null)
}

/// HTTP client for the analysis microservices.
#[derive(Clone)]
pub struct Pipeline {
    client: Client,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: &PipelineConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn endpoint(&self, stage: Stage) -> &str {
        match stage {
            Stage::LogAnalyzer => &self.config.log_analyzer_url,
            Stage::RootCausePredictor => &self.config.root_cause_predictor_url,
            Stage::KnowledgeBase => &self.config.knowledge_base_url,
            Stage::ActionRecommender => &self.config.action_recommender_url,
        }
    }

    /// Run every stage for `line`, honouring the job's enabled stage names.
    pub async fn run<S: AsRef<str>>(&self, line: &str, enabled: &[S]) -> PipelineOutcome {
        let analysis = self.run_stage(Stage::LogAnalyzer, line, &Value::Null, enabled).await;
        let root_cause = self
            .run_stage(Stage::RootCausePredictor, line, &Value::Null, enabled)
            .await;

        let predicted = root_cause_field(&root_cause);
        let knowledge = self
            .run_stage(Stage::KnowledgeBase, line, &predicted, enabled)
            .await;
        let action = self
            .run_stage(Stage::ActionRecommender, line, &predicted, enabled)
            .await;

        PipelineOutcome {
            analysis,
            root_cause,
            knowledge,
            action,
        }
    }

    async fn run_stage<S: AsRef<str>>(
        &self,
        stage: Stage,
        line: &str,
        root_cause: &Value,
        enabled: &[S],
    ) -> Value {
        if !stage.enabled_in(enabled) {
            return not_run();
        }
        match self.call(stage, &stage.payload(line, root_cause)).await {
            Ok(value) => value,
            Err(e) => {
                warn!(stage = %stage, url = %self.endpoint(stage), error = %e, "Pipeline stage failed");
                not_found()
            }
        }
    }

    /// POST `body` to the stage endpoint; any response that decodes to a JSON
    /// object is accepted, whatever its status.
    async fn call(&self, stage: Stage, body: &Value) -> anyhow::Result<Value> {
        let url = self.endpoint(stage);
        let resp = self.client.post(url).json(body).send().await?;
        let status = resp.status();
        let value: Value = resp.json().await?;
        if !value.is_object() {
            anyhow::bail!("{} returned a non-object body ({})", stage, status);
        }
        debug!(stage = %stage, %status, "Pipeline stage answered");
        Ok(value)
    }
}
