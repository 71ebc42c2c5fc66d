//! HTTP surface tests driven through the router with `oneshot`

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use blockflow::api::{create_router, AppState};
use blockflow::blocks::{HandlerRegistry, Services};
use blockflow::config::EngineConfig;
use blockflow::runtime::{BroadcastNotifier, ExecutionEngine, MemoryExecutionStore};
use blockflow::workflow::WorkflowRegistry;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn app() -> Router {
    let registry = Arc::new(WorkflowRegistry::in_memory());
    let engine = Arc::new(ExecutionEngine::new(
        Arc::new(HandlerRegistry::with_builtin(Services::unconfigured())),
        Arc::new(MemoryExecutionStore::new()),
        registry.clone(),
        Arc::new(BroadcastNotifier::default()),
        EngineConfig::default(),
    ));
    create_router(AppState { registry, engine })
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn workflow_body(id: &str) -> Value {
    json!({
        "workflow": {
            "id": id,
            "name": "price check",
            "nodes": [
                {"id": "t", "blockType": "manual_trigger", "config": {"payload": {"price": 1800}}},
                {"id": "check", "blockType": "comparator", "config": {"operation": "gt", "left": "{{t.payload.price}}", "right": 2000}}
            ],
            "edges": [{"source": "t", "target": "check"}]
        }
    })
}

async fn wait_for_status(app: &Router, execution_id: &str, expected: &str) -> Value {
    for _ in 0..50 {
        let (status, body) = send(app, "GET", &format!("/api/runs/{}", execution_id), None).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] == json!(expected) {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("run {} never reached {}", execution_id, expected);
}

#[tokio::test]
async fn health_check_answers_ok() {
    let response = app()
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn workflow_crud_round() {
    let app = app();

    let (status, body) = send(&app, "POST", "/api/workflows", Some(workflow_body("wf"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["id"], json!("wf"));

    let (status, _) = send(&app, "POST", "/api/workflows", Some(workflow_body("wf"))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(&app, "GET", "/api/workflows", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["workflows"][0]["nodeCount"], json!(2));

    let (status, body) = send(&app, "GET", "/api/workflows/wf", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["nodes"][1]["blockType"], json!("comparator"));

    let (status, _) = send(&app, "PUT", "/api/workflows/wf", Some(workflow_body("ignored"))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "DELETE", "/api/workflows/wf", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&app, "GET", "/api/workflows/wf", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], json!("NOT_FOUND"));
}

#[tokio::test]
async fn rejects_unknown_block_type_on_publish() {
    let app = app();
    let mut body = workflow_body("wf");
    body["workflow"]["nodes"][1]["blockType"] = json!("teleport");

    let (status, body) = send(&app, "POST", "/api/workflows", Some(body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], json!("UNKNOWN_BLOCK_TYPE"));
}

#[tokio::test]
async fn start_and_inspect_run() {
    let app = app();
    send(&app, "POST", "/api/workflows", Some(workflow_body("wf"))).await;

    let (status, body) = send(&app, "POST", "/api/workflows/wf/runs", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let execution_id = body["executionId"].as_str().unwrap().to_string();

    let run = wait_for_status(&app, &execution_id, "completed").await;
    assert_eq!(run["workflowId"], json!("wf"));
    assert_eq!(run["nodes"].as_array().unwrap().len(), 2);
    assert_eq!(run["nodes"][1]["output"]["passed"], json!(false));

    let (status, body) = send(&app, "POST", &format!("/api/runs/{}/pause", execution_id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], json!("INVALID_STATE"));

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/runs/{}/retry", execution_id),
        Some(json!({"nodeId": "check"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn lists_registered_block_types() {
    let app = app();

    let (status, body) = send(&app, "GET", "/api/blocks", None).await;
    assert_eq!(status, StatusCode::OK);

    let blocks = body["blocks"].as_array().unwrap();
    assert_eq!(blocks.len(), 9);
    let swap = blocks
        .iter()
        .find(|b| b["blockType"] == json!("token_swap"))
        .unwrap();
    assert_eq!(swap["irreversible"], json!(true));
    assert!(!swap["description"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_run_and_workflow_are_not_found() {
    let app = app();

    let (status, _) = send(&app, "GET", "/api/runs/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, "POST", "/api/workflows/nope/runs", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], json!("NOT_FOUND"));
}
