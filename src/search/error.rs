//! Search error types / 搜索错误类型

/// Result alias for search operations / 搜索操作结果
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Errors raised by the search subsystem / 搜索子系统错误
///
/// Only `StorageFailure`, `Cancelled`, `Timeout` and `InvalidRequest` ever reach
/// an HTTP caller of the general search path. `IndexUnavailable` and
/// `TagLookupFailed` are absorbed by the engine (fallback / empty tags).
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Native full-text index missing or failing / 全文索引不可用
    #[error("search index unavailable: {0}")]
    IndexUnavailable(String),

    /// Tag lookup for a single item failed / 标签查询失败
    #[error("tag lookup failed for {content_type}:{id}: {reason}")]
    TagLookupFailed {
        content_type: String,
        id: String,
        reason: String,
    },

    /// Both native and fallback paths failed / 搜索失败
    #[error("search failed: {0}")]
    StorageFailure(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Caller cancelled the request / 请求已取消
    #[error("search cancelled")]
    Cancelled,

    /// Deadline elapsed / 搜索超时
    #[error("search timed out after {0} ms")]
    Timeout(u64),

    #[error("invalid search request: {0}")]
    InvalidRequest(String),
}

impl SearchError {
    /// Whether the orchestrator may degrade to the legacy path
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(self, SearchError::IndexUnavailable(_) | SearchError::Database(_))
    }
}
