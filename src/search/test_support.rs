//! Shared fixtures for search and source tests / 测试辅助

use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};

use super::schema::{ContentType, SearchDocument};
use crate::source::SourceRecord;

/// Single-connection in-memory database; the connection never recycles so
/// the schema survives for the whole test
pub(crate) async fn memory_pool() -> Pool<Sqlite> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite")
}

pub(crate) fn document(content_type: ContentType, id: &str, owner_id: &str, title: &str, body: &str) -> SearchDocument {
    let now = Utc::now();
    SearchDocument {
        content_type,
        id: id.to_string(),
        owner_id: owner_id.to_string(),
        title: title.to_string(),
        body: body.to_string(),
        tags_text: String::new(),
        parent_ref: None,
        created_at: now,
        updated_at: now,
        favorite: false,
        archived: false,
    }
}

pub(crate) fn record(content_type: ContentType, id: &str, owner_id: &str, title: &str, content: &str) -> SourceRecord {
    let now = Utc::now();
    SourceRecord {
        content_type,
        id: id.to_string(),
        owner_id: owner_id.to_string(),
        title: title.to_string(),
        content: content.to_string(),
        parent_ref: None,
        created_at: now,
        updated_at: now,
        favorite: false,
        archived: false,
        deleted: false,
        restricted: content_type.is_restricted(),
        extra: serde_json::Map::new(),
    }
}
