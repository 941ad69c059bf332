use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use knowhub_backend::search::ContentType;
use knowhub_backend::source::TagInfo;

/// `GET /api/search` query string
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default, alias = "query")]
    pub q: String,
    /// Comma separated / 逗号分隔
    #[serde(default)]
    pub content_types: Option<String>,
    /// Comma separated / 逗号分隔
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
    /// Folder / project id
    #[serde(default)]
    pub parent: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SuggestParams {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct TagParams {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub module_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RebuildParams {
    /// Rebuild one owner only; all owners when absent / 指定用户
    #[serde(default)]
    pub owner_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SuggestionsResponse {
    pub suggestions: Vec<String>,
}

/// Popular tag entry / 热门标签
#[derive(Debug, Serialize)]
pub struct PopularTag {
    pub name: String,
    #[serde(rename = "type")]
    pub module_type: Option<ContentType>,
    pub count: i64,
}

impl From<TagInfo> for PopularTag {
    fn from(tag: TagInfo) -> Self {
        Self {
            name: tag.name,
            module_type: tag.module_type,
            count: tag.usage_count,
        }
    }
}

/// Autocomplete entry / 标签补全
#[derive(Debug, Serialize)]
pub struct TagCompletion {
    pub name: String,
    pub color: Option<String>,
    #[serde(rename = "type")]
    pub module_type: Option<ContentType>,
}

impl From<TagInfo> for TagCompletion {
    fn from(tag: TagInfo) -> Self {
        Self {
            name: tag.name,
            color: tag.color,
            module_type: tag.module_type,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TagsResponse<T> {
    pub tags: Vec<T>,
}

/// 索引状态
#[derive(Debug, Serialize)]
pub struct IndexStatus {
    pub status: String,
    pub native_available: bool,
    pub total_documents: u64,
    pub documents_by_type: BTreeMap<String, u64>,
    pub last_updated: Option<String>,
    pub rebuilding: bool,
}
