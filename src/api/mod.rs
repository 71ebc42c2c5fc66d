/// HTTP API Layer
///
/// REST endpoints for workflow authoring and run control:
/// - Workflow CRUD with registry hot reload (`workflows`)
/// - Start, inspect, pause, resume and retry runs (`runs`)
/// - Catalog of dispatchable block types (`blocks`)

// Workflow management endpoints (POST/GET/PUT/DELETE)
pub mod workflows;

// Run control endpoints
pub mod runs;

// Block type catalog
pub mod blocks;

use crate::error::EngineError;
use crate::runtime::ExecutionEngine;
use crate::workflow::WorkflowRegistry;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde_json::json;
use std::sync::Arc;

/// Shared state for every route
#[derive(Clone)]
pub struct AppState {
    /// Hot-reload registry of published workflows
    pub registry: Arc<WorkflowRegistry>,
    /// Run coordinator
    pub engine: Arc<ExecutionEngine>,
}

/// Build the full application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .merge(workflows::create_workflow_routes())
        .merge(runs::create_run_routes())
        .merge(blocks::create_block_routes())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "ok"
}

/// Error response with body `{ "error": ..., "code": ... }`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    code: &'static str,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>, code: &'static str) -> Self {
        Self {
            status,
            message: message.into(),
            code,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, "BAD_REQUEST")
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::InvalidState { .. } | EngineError::NodeNotRetryable { .. } => {
                StatusCode::CONFLICT
            }
            e if e.is_validation() => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string(), err.code())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("❌ Internal error: {}", err);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string(), "INTERNAL_ERROR")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message, "code": self.code }));
        (self.status, body).into_response()
    }
}
