//! The four analysis stages, in execution order.

use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    LogAnalyzer,
    RootCausePredictor,
    KnowledgeBase,
    ActionRecommender,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::LogAnalyzer,
        Stage::RootCausePredictor,
        Stage::KnowledgeBase,
        Stage::ActionRecommender,
    ];

    /// Name used in a job's `microservices` list.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::LogAnalyzer => "log_analyzer",
            Stage::RootCausePredictor => "root_cause_predictor",
            Stage::KnowledgeBase => "knowledge_base",
            Stage::ActionRecommender => "action_recommender",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Stage::ALL
            .into_iter()
            .find(|s| s.name().eq_ignore_ascii_case(name))
    }

    /// Whether this stage appears in a job's enabled stage names.
    pub fn enabled_in<S: AsRef<str>>(&self, enabled: &[S]) -> bool {
        enabled
            .iter()
            .any(|name| Stage::from_name(name.as_ref()) == Some(*self))
    }

    /// Request body for this stage. `root_cause` is only read by the last two.
    pub fn payload(&self, line: &str, root_cause: &Value) -> Value {
        match self {
            Stage::LogAnalyzer | Stage::RootCausePredictor => json!({ "logs": [line] }),
            Stage::KnowledgeBase => json!({ "query": root_cause }),
            Stage::ActionRecommender => json!({ "root_cause": root_cause }),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
