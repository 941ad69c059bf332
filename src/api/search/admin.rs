use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use tower_cookies::Cookies;

use knowhub_backend::search::RebuildReport;

use super::types::*;
use super::{error_response, ApiError};
use crate::api::ApiResponse;
use crate::auth::require_admin;
use crate::state::AppState;

/// 获取索引状态
pub async fn get_index_status(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
) -> Result<Json<ApiResponse<IndexStatus>>, ApiError> {
    require_admin(&state.db, &cookies).await?;
    let stats = state.search.stats(None).await;
    let rebuilding = state.rebuild.is_running();

    let status = if rebuilding {
        "indexing"
    } else if stats.native_available {
        "ready"
    } else {
        "degraded"
    };
    let last_updated = stats
        .last_updated
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        .map(|dt| dt.to_rfc3339());

    Ok(Json(ApiResponse::success(IndexStatus {
        status: status.to_string(),
        native_available: stats.native_available,
        total_documents: stats.total_documents,
        documents_by_type: stats.documents_by_type,
        last_updated,
        rebuilding,
    })))
}

/// 重建索引
pub async fn rebuild_index(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Query(params): Query<RebuildParams>,
) -> Result<Json<ApiResponse<RebuildReport>>, ApiError> {
    let admin = require_admin(&state.db, &cookies).await?;
    let Some(_guard) = state.rebuild.try_start() else {
        return Ok(Json(ApiResponse::error("index rebuild already running")));
    };

    let owner = params.owner_id.filter(|o| !o.trim().is_empty());
    tracing::info!("Index rebuild requested by {} (owner: {:?})", admin.id, owner);
    let report = state.search.rebuild(owner.as_deref()).await.map_err(error_response)?;
    Ok(Json(ApiResponse::success(report)))
}
