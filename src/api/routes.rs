//! API route definitions.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde_json::{json, Value};

use super::error::{ApiError, UserId};
use super::state::AppState;
use crate::jobs::JobRequest;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/log-scan-jobs", get(list_jobs).post(create_job))
        .route("/log-scan-jobs/{id}", put(update_job).delete(delete_job))
        .route("/incidents", get(list_incidents))
}

fn meta() -> Value {
    json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })
}

fn envelope(data: Value, total: Option<usize>) -> Json<Value> {
    let mut meta = meta();
    if let Some(total) = total {
        meta["total"] = json!(total);
    }
    Json(json!({ "data": data, "meta": meta }))
}

fn body(payload: Result<Json<JobRequest>, JsonRejection>) -> Result<JobRequest, ApiError> {
    payload
        .map(|Json(req)| req)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let scheduler = state.scheduler.state().await;
    envelope(
        json!({
            "status": "ok",
            "scheduler": scheduler.as_str(),
            "jobs_in_flight": state.scheduler.in_flight(),
        }),
        None,
    )
}

async fn create_job(
    State(state): State<AppState>,
    UserId(user): UserId,
    payload: Result<Json<JobRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.jobs.create_job(&user, body(payload)?).await?;
    Ok((StatusCode::CREATED, envelope(json!(job), None)))
}

async fn list_jobs(State(state): State<AppState>, UserId(user): UserId) -> Json<Value> {
    let jobs = state.jobs.list_jobs(&user).await;
    let total = jobs.len();
    envelope(json!(jobs), Some(total))
}

async fn update_job(
    State(state): State<AppState>,
    UserId(user): UserId,
    Path(id): Path<String>,
    payload: Result<Json<JobRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let jobs = state.jobs.update_job(&user, &id, body(payload)?).await?;
    let total = jobs.len();
    Ok(envelope(json!(jobs), Some(total)))
}

async fn delete_job(
    State(state): State<AppState>,
    UserId(user): UserId,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.jobs.delete_job(&user, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_incidents(State(state): State<AppState>, UserId(user): UserId) -> Json<Value> {
    let incidents = state.jobs.recent_incidents(&user).await;
    let total = incidents.len();
    envelope(json!(incidents), Some(total))
}
