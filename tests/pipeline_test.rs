//! Pipeline tests against stub analysis services on an ephemeral port.

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use logscan::config::PipelineConfig;
use logscan::detect::{Incident, Severity};
use logscan::jobs::Job;
use logscan::pipeline::{self, Pipeline};

type Calls = Arc<Mutex<Vec<(&'static str, Value)>>>;

#[derive(Clone)]
struct Stub {
    calls: Calls,
    analyzer_fails: bool,
}

async fn analyze(State(stub): State<Stub>, Json(body): Json<Value>) -> (StatusCode, String) {
    stub.calls.lock().unwrap().push(("analyze", body));
    if stub.analyzer_fails {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom".to_string());
    }
    let reply = json!({ "anomalies": [{ "line": 0, "score": 0.97 }], "count": 1 });
    (StatusCode::OK, reply.to_string())
}

async fn predict(State(stub): State<Stub>, Json(body): Json<Value>) -> Json<Value> {
    stub.calls.lock().unwrap().push(("predict", body));
    Json(json!({ "root_cause": "disk pressure", "confidence": 0.8 }))
}

async fn search(State(stub): State<Stub>, Json(body): Json<Value>) -> Json<Value> {
    stub.calls.lock().unwrap().push(("search", body));
    Json(json!({ "results": ["runbook: clean up /var/log"] }))
}

async fn recommend(State(stub): State<Stub>, Json(body): Json<Value>) -> Json<Value> {
    stub.calls.lock().unwrap().push(("recommend", body));
    Json(json!({ "action": "expand volume" }))
}

/// Serve the four stub endpoints; returns the config pointing at them.
async fn spawn_stub(analyzer_fails: bool) -> (PipelineConfig, Calls) {
    let calls: Calls = Arc::default();
    let app = Router::new()
        .route("/analyze", post(analyze))
        .route("/predict", post(predict))
        .route("/search", post(search))
        .route("/recommend", post(recommend))
        .with_state(Stub {
            calls: calls.clone(),
            analyzer_fails,
        });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let base = format!("http://{addr}");
    let config = PipelineConfig {
        log_analyzer_url: format!("{base}/analyze"),
        root_cause_predictor_url: format!("{base}/predict"),
        knowledge_base_url: format!("{base}/search"),
        action_recommender_url: format!("{base}/recommend"),
        request_timeout_secs: 5,
    };
    (config, calls)
}

const ALL: [&str; 4] = [
    "log_analyzer",
    "root_cause_predictor",
    "knowledge_base",
    "action_recommender",
];

#[tokio::test]
async fn test_root_cause_feeds_later_stages() {
    let (config, calls) = spawn_stub(false).await;
    let pipeline = Pipeline::new(&config).unwrap();

    let outcome = pipeline.run("ERROR disk full", &ALL).await;

    assert_eq!(outcome.analysis["count"], 1);
    assert_eq!(outcome.root_cause["root_cause"], "disk pressure");
    assert_eq!(outcome.action["action"], "expand volume");

    let calls = calls.lock().unwrap().clone();
    let names: Vec<_> = calls.iter().map(|(n, _)| *n).collect();
    assert_eq!(names, vec!["analyze", "predict", "search", "recommend"]);
    assert_eq!(calls[0].1, json!({ "logs": ["ERROR disk full"] }));
    assert_eq!(calls[1].1, json!({ "logs": ["ERROR disk full"] }));
    assert_eq!(calls[2].1, json!({ "query": "disk pressure" }));
    assert_eq!(calls[3].1, json!({ "root_cause": "disk pressure" }));
}

#[tokio::test]
async fn test_only_enabled_stages_are_called() {
    let (config, calls) = spawn_stub(false).await;
    let pipeline = Pipeline::new(&config).unwrap();

    let outcome = pipeline.run("ERROR x", &["log_analyzer"]).await;

    assert_eq!(outcome.analysis["count"], 1);
    assert_eq!(outcome.root_cause, pipeline::not_run());
    assert_eq!(outcome.knowledge, pipeline::not_run());
    assert_eq!(outcome.action, pipeline::not_run());
    assert_eq!(calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_stage_does_not_stop_the_chain() {
    let (config, calls) = spawn_stub(true).await;
    let pipeline = Pipeline::new(&config).unwrap();

    let outcome = pipeline.run("ERROR x", &ALL).await;

    assert_eq!(outcome.analysis, pipeline::not_found());
    assert_eq!(outcome.root_cause["root_cause"], "disk pressure");
    assert_eq!(outcome.knowledge["results"][0], "runbook: clean up /var/log");
    assert_eq!(calls.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn test_disabled_predictor_sends_null_root_cause() {
    let (config, calls) = spawn_stub(false).await;
    let pipeline = Pipeline::new(&config).unwrap();

    pipeline
        .run("ERROR x", &["knowledge_base", "action_recommender"])
        .await;

    let calls = calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].1, json!({ "query": null }));
    assert_eq!(calls[1].1, json!({ "root_cause": null }));
}

#[tokio::test]
async fn test_outcome_becomes_incident() {
    let (config, _) = spawn_stub(false).await;
    let pipeline = Pipeline::new(&config).unwrap();
    let outcome = pipeline.run("ERROR disk full", &ALL).await;

    let now = chrono::Utc::now();
    let job = Job {
        id: "job-1".to_string(),
        user_id: "alice".to_string(),
        name: "payments".to_string(),
        cluster: String::new(),
        namespace: "prod".to_string(),
        log_levels: vec!["ERROR".to_string()],
        interval: 60,
        created_at: now,
        last_run: now,
        microservices: ALL.iter().map(|s| s.to_string()).collect(),
        pods: Vec::new(),
    };
    let incident = Incident::from_scan("alice", &job, "ERROR disk full".to_string(), &outcome);

    assert_eq!(incident.severity, Some(Severity::High));
    assert_eq!(incident.category, "Anomaly");
    assert_eq!(incident.service, "prod");
    let root_cause: Value = serde_json::from_str(&incident.root_cause).unwrap();
    assert_eq!(root_cause["root_cause"], "disk pressure");
}
