/// Run control endpoints
///
/// Starting, resuming and retrying return as soon as the scheduling loop is
/// spawned; callers poll `GET /api/runs/{id}` (or subscribe to status
/// notifications) for progress.

use super::{ApiError, AppState};
use crate::runtime::ExecutionRecord;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

/// Optional body of a retry request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryRequest {
    pub node_id: Option<String>,
}

pub fn create_run_routes() -> Router<AppState> {
    Router::new()
        .route("/api/workflows/{id}/runs", post(start_run))
        .route("/api/runs/{id}", get(get_run))
        .route("/api/runs/{id}/pause", post(pause_run))
        .route("/api/runs/{id}/resume", post(resume_run))
        .route("/api/runs/{id}/retry", post(retry_run))
}

/// POST /api/workflows/{id}/runs
async fn start_run(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    tracing::info!("📥 Run requested for workflow: {}", workflow_id);
    let execution_id = state.engine.start_run(&workflow_id).await?;

    Ok((StatusCode::ACCEPTED, Json(json!({ "executionId": execution_id }))))
}

/// GET /api/runs/{id}
async fn get_run(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
) -> Result<Json<ExecutionRecord>, ApiError> {
    Ok(Json(state.engine.get_run(&execution_id).await?))
}

/// POST /api/runs/{id}/pause
async fn pause_run(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.engine.pause_run(&execution_id).await?;
    Ok(Json(json!({ "executionId": execution_id, "status": "paused" })))
}

/// POST /api/runs/{id}/resume
async fn resume_run(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    // The drive continues detached; its outcome lands in the state store
    let _task = state.engine.resume_run(&execution_id).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "executionId": execution_id }))))
}

/// POST /api/runs/{id}/retry
/// Body (optional): { "nodeId": "..." }
async fn retry_run(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
    body: Option<Json<RetryRequest>>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let _task = state
        .engine
        .retry_run(&execution_id, request.node_id.as_deref())
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "executionId": execution_id, "nodeId": request.node_id })),
    ))
}
