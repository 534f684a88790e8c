use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::models::ToolCallRequest;
use crate::services::tools::ToolRegistry;

/// Tool server state
#[derive(Clone)]
pub struct ToolState {
    pub registry: Arc<ToolRegistry>,
}

pub async fn list_tools(State(state): State<ToolState>) -> Json<Value> {
    Json(json!({ "tools": state.registry.descriptors() }))
}

/// `{tool, input}` → `{result}` or `{error}`
pub async fn call_tool(
    State(state): State<ToolState>,
    Json(payload): Json<ToolCallRequest>,
) -> (StatusCode, Json<Value>) {
    let Some(tool) = payload.tool.filter(|t| !t.is_empty()) else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "missing tool" })));
    };
    if !state.registry.has_tool(&tool) {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "tool not found" })));
    }

    match state.registry.dispatch(&tool, payload.input).await {
        Ok(result) => (StatusCode::OK, Json(json!({ "result": result }))),
        Err(e) => {
            tracing::error!("Tool {} failed: {}", tool, e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.message() })))
        }
    }
}
