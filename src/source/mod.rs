//! Source-of-truth collaborators / 数据源接口
//!
//! The search core never owns notes, documents, tasks, diary entries, archive
//! items, folders or tags. It reads them only through [`SourceCatalog`]:
//! fetch a record, fetch its tags, list candidate ids for the legacy scan.

pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::search::{ContentType, SearchResult};

pub use sqlite::SqliteCatalog;

/// A live source entity as the search core sees it / 源实体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    pub content_type: ContentType,
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub content: String,
    pub parent_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub favorite: bool,
    pub archived: bool,
    /// Soft-deleted / 软删除
    pub deleted: bool,
    /// Raw content must not be indexed (e.g. encrypted diary) / 内容受限
    pub restricted: bool,
    /// Type-specific fields surfaced in search results / 类型特有字段
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Tag with usage statistics / 标签信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagInfo {
    pub name: String,
    pub color: Option<String>,
    pub module_type: Option<ContentType>,
    pub usage_count: i64,
}

/// Filters for the legacy candidate scan / 候选过滤条件
#[derive(Debug, Clone, Default)]
pub struct CandidateFilter {
    /// Any-of substring terms on title/content / 任一子串匹配
    pub terms: Vec<String>,
    pub parent_ref: Option<String>,
    pub limit: usize,
}

/// Narrow read interface onto the source-of-truth tables / 数据源只读接口
#[async_trait]
pub trait SourceCatalog: Send + Sync {
    /// Fetch one record; `None` when it does not exist
    async fn get_record(&self, content_type: ContentType, id: &str) -> SearchResult<Option<SourceRecord>>;

    /// Current tag names of one record
    async fn get_tags(&self, content_type: ContentType, id: &str) -> SearchResult<Vec<String>>;

    /// Ids of the owner's active records matching the filter
    async fn list_candidate_ids(
        &self,
        content_type: ContentType,
        owner_id: &str,
        filter: &CandidateFilter,
    ) -> SearchResult<Vec<String>>;

    /// Every record id of a type (optionally one owner), deleted ones included
    async fn list_all_ids(&self, content_type: ContentType, owner_id: Option<&str>) -> SearchResult<Vec<String>>;

    /// Tags of an owner with usage counts
    async fn list_tags(&self, owner_id: &str, module_type: Option<ContentType>) -> SearchResult<Vec<TagInfo>>;
}
