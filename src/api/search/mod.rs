//! Search API / 搜索接口
//!
//! - query: search, index-only search, suggestions, tags
//! - admin: index status and rebuild

pub mod admin;
pub mod query;
pub mod types;

pub use admin::*;
pub use query::*;

use axum::{http::StatusCode, Json};
use serde_json::{json, Value};

use knowhub_backend::search::{ContentType, SearchError, SearchRequest, SortMode};
use types::SearchParams;

pub type ApiError = (StatusCode, Json<Value>);

/// Map engine errors onto HTTP status; a failed search carries no results
pub fn error_response(err: SearchError) -> ApiError {
    let status = match &err {
        SearchError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        SearchError::IndexUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        SearchError::Cancelled | SearchError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!("Search request failed: {}", err);
    }
    (status, Json(json!({"error": "search failed", "detail": err.to_string()})))
}

/// Build an engine request from query parameters / 解析搜索参数
pub fn build_request(params: SearchParams, owner_id: &str) -> Result<SearchRequest, SearchError> {
    let sort = match params.sort_by.as_deref() {
        Some(raw) => raw.parse::<SortMode>().map_err(SearchError::InvalidRequest)?,
        None => SortMode::Relevance,
    };
    let types = params
        .content_types
        .as_deref()
        .map(ContentType::parse_list)
        .unwrap_or_default();
    let tags = params
        .tags
        .as_deref()
        .map(split_list)
        .unwrap_or_default();

    let mut request = SearchRequest::new(params.q, owner_id)
        .with_types(types)
        .with_tags(tags)
        .with_sort(sort)
        .with_limit(params.limit.unwrap_or(0))
        .with_offset(params.offset.unwrap_or(0));
    if let Some(parent) = params.parent.filter(|p| !p.trim().is_empty()) {
        request = request.with_parent(parent);
    }
    Ok(request)
}

/// Parse an optional module type filter / 解析模块类型
pub fn parse_module_type(raw: Option<&str>) -> Result<Option<ContentType>, SearchError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s.parse::<ContentType>().map(Some).map_err(SearchError::InvalidRequest),
        None => Ok(None),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request() {
        let params = SearchParams {
            q: "rust".to_string(),
            content_types: Some("notes, todo,bogus".to_string()),
            tags: Some("work, ,ideas".to_string()),
            sort_by: Some("title".to_string()),
            limit: Some(5),
            offset: Some(10),
            parent: Some("f1".to_string()),
        };
        let request = build_request(params, "u1").unwrap();
        assert_eq!(request.owner_id, "u1");
        assert_eq!(request.content_types, vec![ContentType::Note, ContentType::Todo]);
        assert_eq!(request.tags, vec!["work", "ideas"]);
        assert_eq!(request.sort, SortMode::Title);
        assert_eq!(request.limit, 5);
        assert_eq!(request.offset, 10);
        assert_eq!(request.parent_ref.as_deref(), Some("f1"));
    }

    #[test]
    fn test_bad_sort_is_rejected() {
        let params = SearchParams {
            q: "rust".to_string(),
            sort_by: Some("size".to_string()),
            ..Default::default()
        };
        let err = build_request(params, "u1").unwrap_err();
        assert_eq!(error_response(err).0, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            error_response(SearchError::IndexUnavailable("x".into())).0,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(error_response(SearchError::Timeout(10)).0, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(error_response(SearchError::Cancelled).0, StatusCode::GATEWAY_TIMEOUT);
        let (status, Json(body)) = error_response(SearchError::StorageFailure("disk".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "search failed");
        assert!(body.get("results").is_none());
    }

    #[test]
    fn test_parse_module_type() {
        assert_eq!(parse_module_type(None).unwrap(), None);
        assert_eq!(parse_module_type(Some("")).unwrap(), None);
        assert_eq!(parse_module_type(Some("diary")).unwrap(), Some(ContentType::DiaryEntry));
        assert!(parse_module_type(Some("photos")).is_err());
    }
}
