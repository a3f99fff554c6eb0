use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "masters": state.config.masters.len(),
        "secondaries": state.config.secondaries.len(),
        "active_operation": state.active_operation(),
    }))
}
