/// Workflow management REST API endpoints
///
/// CRUD over workflow definitions. Every write is checked against the handler
/// registry before it is published, and publishing hot-swaps the registry
/// snapshot so new runs pick it up without a restart.

use super::{ApiError, AppState};
use crate::workflow::Workflow;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Response for workflow creation/update operations
#[derive(Debug, Serialize)]
pub struct WorkflowResponse {
    pub id: String,
    pub message: String,
}

/// Request body for workflow creation and update
#[derive(Debug, Deserialize)]
pub struct WorkflowRequest {
    pub workflow: Workflow,
}

pub fn create_workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/api/workflows", post(create_workflow).get(list_workflows))
        .route(
            "/api/workflows/{id}",
            get(get_workflow).put(update_workflow).delete(delete_workflow),
        )
}

/// POST /api/workflows
/// Body: { "workflow": { "id": "...", "name": "...", "nodes": [...], "edges": [...] } }
async fn create_workflow(
    State(state): State<AppState>,
    Json(payload): Json<WorkflowRequest>,
) -> Result<(StatusCode, Json<WorkflowResponse>), ApiError> {
    let workflow = payload.workflow;

    if workflow.id.is_empty() || workflow.name.is_empty() {
        return Err(ApiError::bad_request("workflow id and name are required"));
    }
    if state.registry.get_workflow(&workflow.id).is_some() {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            format!("Workflow '{}' already exists", workflow.id),
            "WORKFLOW_EXISTS",
        ));
    }

    state.engine.validate(&workflow)?;
    let published = state.registry.publish(workflow).await?;

    tracing::info!("🔥 Created workflow: {} ({})", published.id, published.name);

    Ok((
        StatusCode::CREATED,
        Json(WorkflowResponse {
            id: published.id.clone(),
            message: format!("Workflow '{}' created successfully", published.name),
        }),
    ))
}

/// GET /api/workflows
async fn list_workflows(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let workflows: Vec<Value> = match state.registry.storage() {
        Some(storage) => storage
            .list_workflows()
            .await?
            .into_iter()
            .map(|summary| serde_json::to_value(summary).unwrap_or(Value::Null))
            .collect(),
        None => state
            .registry
            .list_workflows()
            .iter()
            .map(|w| json!({ "id": w.id, "name": w.name, "nodeCount": w.nodes.len() }))
            .collect(),
    };

    Ok(Json(json!({ "workflows": workflows })))
}

/// GET /api/workflows/{id}
async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Workflow>, ApiError> {
    let workflow = state.registry.get_workflow(&id).ok_or_else(|| {
        ApiError::new(StatusCode::NOT_FOUND, format!("Not found: workflow {}", id), "NOT_FOUND")
    })?;

    Ok(Json((*workflow).clone()))
}

/// PUT /api/workflows/{id}
///
/// Runs already in flight keep the snapshot they started with.
async fn update_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<WorkflowRequest>,
) -> Result<Json<WorkflowResponse>, ApiError> {
    let mut workflow = payload.workflow;
    workflow.id = id.clone();

    if workflow.name.is_empty() {
        return Err(ApiError::bad_request("workflow name is required"));
    }
    if state.registry.get_workflow(&id).is_none() {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("Not found: workflow {}", id),
            "NOT_FOUND",
        ));
    }

    state.engine.validate(&workflow)?;
    let published = state.registry.publish(workflow).await?;

    tracing::info!("🔥 Hot-reloaded workflow: {} ({})", published.id, published.name);

    Ok(Json(WorkflowResponse {
        id: published.id.clone(),
        message: format!("Workflow '{}' updated successfully", published.name),
    }))
}

/// DELETE /api/workflows/{id}
async fn delete_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !state.registry.remove_workflow(&id).await? {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("Not found: workflow {}", id),
            "NOT_FOUND",
        ));
    }

    tracing::info!("🗑️ Deleted workflow: {}", id);
    Ok(Json(json!({ "message": "Workflow deleted successfully" })))
}
