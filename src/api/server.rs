use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::state::AppState;

/// 健康检查
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    let native_index = state.config.search.native_index;
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "build_time": env!("BUILD_TIME"),
        "search": {
            "native_index": native_index,
            "native_available": state.search.index().native_available(),
        }
    }))
}
