//! Search index schema definition / 搜索索引的 Schema 定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::source::SourceRecord;

/// Content type of an indexed entity / 内容类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Note,
    Document,
    ArchiveItem,
    Todo,
    DiaryEntry,
    Folder,
}

impl ContentType {
    /// All six content types, in fan-out order / 全部内容类型
    pub const ALL: [ContentType; 6] = [
        ContentType::Note,
        ContentType::Document,
        ContentType::ArchiveItem,
        ContentType::Todo,
        ContentType::DiaryEntry,
        ContentType::Folder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Note => "note",
            ContentType::Document => "document",
            ContentType::ArchiveItem => "archive_item",
            ContentType::Todo => "todo",
            ContentType::DiaryEntry => "diary_entry",
            ContentType::Folder => "folder",
        }
    }

    /// Live source table name / 源数据表名
    pub fn table_name(&self) -> &'static str {
        match self {
            ContentType::Note => "notes",
            ContentType::Document => "documents",
            ContentType::ArchiveItem => "archive_items",
            ContentType::Todo => "todos",
            ContentType::DiaryEntry => "diary_entries",
            ContentType::Folder => "folders",
        }
    }

    /// Frontend URL for an entity / 前端访问地址
    pub fn url_for(&self, id: &str) -> String {
        match self {
            ContentType::Note => format!("/notes/{}", id),
            ContentType::Document => format!("/documents/{}", id),
            ContentType::ArchiveItem => format!("/archive/items/{}", id),
            ContentType::Todo => format!("/todos/{}", id),
            ContentType::DiaryEntry => format!("/diary/{}", id),
            ContentType::Folder => format!("/folders/{}", id),
        }
    }

    /// Entries whose raw content must never be indexed (encrypted diary)
    pub fn is_restricted(&self) -> bool {
        matches!(self, ContentType::DiaryEntry)
    }

    /// Parse a comma-separated list, ignoring unknown names / 解析逗号分隔的类型列表
    pub fn parse_list(raw: &str) -> Vec<ContentType> {
        let mut types = Vec::new();
        for part in raw.split(',') {
            if let Ok(t) = part.trim().parse::<ContentType>() {
                if !types.contains(&t) {
                    types.push(t);
                }
            }
        }
        types
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "note" | "notes" => Ok(ContentType::Note),
            "document" | "documents" => Ok(ContentType::Document),
            "archive_item" | "archive_items" | "archive" => Ok(ContentType::ArchiveItem),
            "todo" | "todos" => Ok(ContentType::Todo),
            "diary_entry" | "diary_entries" | "diary" => Ok(ContentType::DiaryEntry),
            "folder" | "folders" => Ok(ContentType::Folder),
            other => Err(format!("unknown content type: {}", other)),
        }
    }
}

/// Denormalized, indexed projection of a source entity / 搜索文档（索引投影）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDocument {
    pub content_type: ContentType,
    pub id: String,
    pub owner_id: String,
    pub title: String,
    /// Empty for restricted entries / 受限内容为空
    pub body: String,
    /// Space-joined tag names / 空格拼接的标签名
    pub tags_text: String,
    pub parent_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub favorite: bool,
    pub archived: bool,
}

impl SearchDocument {
    /// Derive the projection from a source record and its current tags
    /// 由源记录和当前标签生成投影
    pub fn from_record(record: &SourceRecord, tags: &[String]) -> Self {
        let body = if record.restricted || record.content_type.is_restricted() {
            String::new()
        } else {
            record.content.clone()
        };

        Self {
            content_type: record.content_type,
            id: record.id.clone(),
            owner_id: record.owner_id.clone(),
            title: record.title.clone(),
            body,
            tags_text: tags_text(tags),
            parent_ref: record.parent_ref.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
            favorite: record.favorite,
            archived: record.archived,
        }
    }

    /// Text used for previews: body, or tag text for restricted entries
    pub fn preview_source(&self) -> &str {
        if self.body.is_empty() {
            &self.tags_text
        } else {
            &self.body
        }
    }
}

/// Join tag names the way the index stores them / 拼接标签文本
pub fn tags_text(tags: &[String]) -> String {
    tags.iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Result ordering / 排序方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    #[default]
    Relevance,
    Date,
    Title,
}

impl FromStr for SortMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "relevance" => Ok(SortMode::Relevance),
            "date" | "updated_at" => Ok(SortMode::Date),
            "title" => Ok(SortMode::Title),
            other => Err(format!("unknown sort mode: {}", other)),
        }
    }
}

/// Which path produced the results / 结果来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    Fts,
    Legacy,
}

/// Search request / 搜索请求
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub owner_id: String,
    /// Empty means all types / 为空表示全部类型
    pub content_types: Vec<ContentType>,
    /// Any-of tag filter, case-insensitive / 标签过滤
    pub tags: Vec<String>,
    pub parent_ref: Option<String>,
    pub sort: SortMode,
    pub limit: usize,
    pub offset: usize,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            owner_id: owner_id.into(),
            content_types: Vec::new(),
            tags: Vec::new(),
            parent_ref: None,
            sort: SortMode::Relevance,
            limit: 20,
            offset: 0,
        }
    }

    pub fn with_types(mut self, types: Vec<ContentType>) -> Self {
        self.content_types = types;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_parent(mut self, parent_ref: impl Into<String>) -> Self {
        self.parent_ref = Some(parent_ref.into());
        self
    }

    pub fn with_sort(mut self, sort: SortMode) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Requested types, defaulting to all / 实际搜索的类型
    pub fn effective_types(&self) -> Vec<ContentType> {
        if self.content_types.is_empty() {
            ContentType::ALL.to_vec()
        } else {
            self.content_types.clone()
        }
    }
}

/// A scored candidate before pagination / 打分后的候选结果
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub document: SearchDocument,
    /// Scorer-native score, higher is better / 原始分数
    pub raw_score: f64,
    /// Normalized score in [0, 1] / 归一化分数
    pub relevance_score: f64,
    /// Tag names from the catalog once loaded / 已加载的标签
    pub tags: Option<Vec<String>>,
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One item of the search response / 搜索结果项
#[derive(Debug, Clone, Serialize)]
pub struct SearchResultItem {
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub id: String,
    pub title: String,
    pub preview: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub relevance_score: f64,
    pub relevance_level: super::scoring::RelevanceLevel,
    pub favorite: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_ref: Option<String>,
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
    pub url: String,
}

/// Execution details reported with every response / 搜索性能信息
#[derive(Debug, Clone, Serialize)]
pub struct SearchPerformance {
    pub elapsed_ms: u64,
    pub candidates: usize,
    pub content_types: Vec<ContentType>,
    pub native_available: bool,
    /// Some type reached `max_candidates_per_type`, so `total` is a lower bound
    pub truncated: bool,
}

/// Search response / 搜索响应
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResultItem>,
    pub total: usize,
    pub query: String,
    pub search_type: SearchType,
    pub performance: SearchPerformance,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_parse() {
        assert_eq!("note".parse::<ContentType>().unwrap(), ContentType::Note);
        assert_eq!("Diary".parse::<ContentType>().unwrap(), ContentType::DiaryEntry);
        assert_eq!("archive_items".parse::<ContentType>().unwrap(), ContentType::ArchiveItem);
        assert!("photo".parse::<ContentType>().is_err());
    }

    #[test]
    fn test_parse_list_dedups_and_skips_unknown() {
        let types = ContentType::parse_list("note, todo,bogus,notes");
        assert_eq!(types, vec![ContentType::Note, ContentType::Todo]);
        assert!(ContentType::parse_list("").is_empty());
    }

    #[test]
    fn test_tags_text() {
        let tags = vec!["rust".to_string(), " ".to_string(), "search ".to_string()];
        assert_eq!(tags_text(&tags), "rust search");
    }

    #[test]
    fn test_sort_mode_parse() {
        assert_eq!("".parse::<SortMode>().unwrap(), SortMode::Relevance);
        assert_eq!("date".parse::<SortMode>().unwrap(), SortMode::Date);
        assert!("size".parse::<SortMode>().is_err());
    }

    #[test]
    fn test_effective_types_defaults_to_all() {
        let req = SearchRequest::new("q", "u1");
        assert_eq!(req.effective_types().len(), 6);
        let req = req.with_types(vec![ContentType::Folder]);
        assert_eq!(req.effective_types(), vec![ContentType::Folder]);
    }
}
