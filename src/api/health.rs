use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Reports liveness and whether the agent backend is configured.
pub fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "agent-relay is running",
        "backend_configured": state.backend_configured(),
        "config": {
            "stream_path": state.config.backend.stream_path,
            "log_level": state.config.features.log_level,
        }
    }))
}
