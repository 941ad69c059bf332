use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;
use tower_cookies::Cookies;

use knowhub_backend::search::SearchResponse;

use super::types::*;
use super::{build_request, error_response, parse_module_type, ApiError};
use crate::auth::current_user;
use crate::state::AppState;

/// Search across content types, falling back to the legacy scan / 综合搜索
pub async fn search(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let user = current_user(&state.db, &cookies).await?;
    let request = build_request(params, &user.id).map_err(error_response)?;
    let response = state.search.search(request).await.map_err(error_response)?;
    Ok(Json(response))
}

/// Index-only search / 全文索引搜索
pub async fn search_fts(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let user = current_user(&state.db, &cookies).await?;
    let request = build_request(params, &user.id).map_err(error_response)?;
    let response = state.search.search_fts(request).await.map_err(error_response)?;
    Ok(Json(response))
}

/// 搜索建议
pub async fn suggestions(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Query(params): Query<SuggestParams>,
) -> Result<Json<SuggestionsResponse>, ApiError> {
    let user = current_user(&state.db, &cookies).await?;
    let suggestions = state.search.suggest(&params.q, &user.id).await.map_err(error_response)?;
    Ok(Json(SuggestionsResponse { suggestions }))
}

/// 热门标签
pub async fn popular_tags(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Query(params): Query<TagParams>,
) -> Result<Json<TagsResponse<PopularTag>>, ApiError> {
    let user = current_user(&state.db, &cookies).await?;
    let module_type = parse_module_type(params.module_type.as_deref()).map_err(error_response)?;
    let tags = state
        .search
        .popular_tags(&user.id, module_type)
        .await
        .map_err(error_response)?;
    Ok(Json(TagsResponse {
        tags: tags.into_iter().map(PopularTag::from).collect(),
    }))
}

/// 标签自动补全
pub async fn autocomplete_tags(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Query(params): Query<TagParams>,
) -> Result<Json<TagsResponse<TagCompletion>>, ApiError> {
    let user = current_user(&state.db, &cookies).await?;
    let module_type = parse_module_type(params.module_type.as_deref()).map_err(error_response)?;
    let tags = state
        .search
        .autocomplete_tags(&params.q, &user.id, module_type)
        .await
        .map_err(error_response)?;
    Ok(Json(TagsResponse {
        tags: tags.into_iter().map(TagCompletion::from).collect(),
    }))
}
