/// Block catalog endpoint
///
/// Lists the block types the engine can dispatch, so authoring clients know
/// which `blockType` values a workflow may use.

use super::AppState;
use axum::{extract::State, response::Json, routing::get, Router};
use serde_json::{json, Value};

pub fn create_block_routes() -> Router<AppState> {
    Router::new().route("/api/blocks", get(list_blocks))
}

/// GET /api/blocks
/// Returns: { "blocks": [{ "blockType": "...", "description": "...", "irreversible": bool }] }
async fn list_blocks(State(state): State<AppState>) -> Json<Value> {
    let handlers = state.engine.handlers();
    let blocks: Vec<Value> = handlers
        .descriptions()
        .into_iter()
        .map(|(block_type, description)| {
            let irreversible = handlers
                .get(block_type)
                .map(|handler| handler.irreversible())
                .unwrap_or(false);
            json!({
                "blockType": block_type,
                "description": description,
                "irreversible": irreversible,
            })
        })
        .collect();

    Json(json!({ "blocks": blocks }))
}
