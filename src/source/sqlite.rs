//! SQLite source catalog - reads the application's live content tables / SQLite 数据源
//!
//! Each content type lives in its own table with a shared column set:
//! `id, owner_id, title, content, parent_id, is_favorite, is_archived,
//! is_deleted, created_at, updated_at`, plus a few type-specific columns.
//! Tags are `tags` + `tag_links`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, QueryBuilder, Row, Sqlite};

use super::{CandidateFilter, SourceCatalog, SourceRecord, TagInfo};
use crate::search::{ContentType, SearchError, SearchResult};

/// Column kind for type-specific fields / 扩展字段类型
#[derive(Clone, Copy)]
enum ExtraKind {
    Text,
    Integer,
}

/// Type-specific columns surfaced as result extras / 各类型的扩展字段
fn extra_columns(content_type: ContentType) -> &'static [(&'static str, ExtraKind)] {
    match content_type {
        ContentType::Document | ContentType::ArchiveItem => {
            &[("mime_type", ExtraKind::Text), ("file_size", ExtraKind::Integer)]
        }
        ContentType::Todo => &[
            ("status", ExtraKind::Text),
            ("priority", ExtraKind::Integer),
            ("due_date", ExtraKind::Text),
        ],
        ContentType::DiaryEntry => &[("mood", ExtraKind::Text)],
        ContentType::Note | ContentType::Folder => &[],
    }
}

/// Source catalog over SQLite / 基于 SQLite 的数据源
pub struct SqliteCatalog {
    db: Pool<Sqlite>,
}

impl SqliteCatalog {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    /// Create the live content tables if absent / 初始化内容表（只在不存在时创建）
    pub async fn init(&self) -> SearchResult<()> {
        for content_type in ContentType::ALL {
            let mut extra_sql = String::new();
            for (name, kind) in extra_columns(content_type) {
                let sql_type = match kind {
                    ExtraKind::Text => "TEXT",
                    ExtraKind::Integer => "INTEGER",
                };
                extra_sql.push_str(&format!(",\n                {} {}", name, sql_type));
            }

            let ddl = format!(
                r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                content TEXT NOT NULL DEFAULT '',
                parent_id TEXT,
                is_favorite INTEGER NOT NULL DEFAULT 0,
                is_archived INTEGER NOT NULL DEFAULT 0,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL{extra}
            )
            "#,
                table = content_type.table_name(),
                extra = extra_sql,
            );
            sqlx::query(&ddl).execute(&self.db).await?;

            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_owner ON {table}(owner_id, is_deleted)",
                table = content_type.table_name()
            ))
            .execute(&self.db)
            .await?;
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tags (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                name TEXT NOT NULL,
                color TEXT,
                module_type TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tag_links (
                tag_id TEXT NOT NULL,
                content_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                PRIMARY KEY (tag_id, content_type, entity_id),
                FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tag_links_entity ON tag_links(content_type, entity_id)")
            .execute(&self.db)
            .await?;

        Ok(())
    }

    fn row_to_record(content_type: ContentType, row: &SqliteRow) -> SearchResult<SourceRecord> {
        let mut extra = serde_json::Map::new();
        for (name, kind) in extra_columns(content_type) {
            let value = match kind {
                ExtraKind::Text => row
                    .try_get::<Option<String>, _>(*name)?
                    .map(Value::String),
                ExtraKind::Integer => row
                    .try_get::<Option<i64>, _>(*name)?
                    .map(Value::from),
            };
            extra.insert((*name).to_string(), value.unwrap_or(Value::Null));
        }

        Ok(SourceRecord {
            content_type,
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            title: row.try_get("title")?,
            content: row.try_get("content")?,
            parent_ref: row.try_get("parent_id")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
            favorite: row.try_get("is_favorite")?,
            archived: row.try_get("is_archived")?,
            deleted: row.try_get("is_deleted")?,
            restricted: content_type.is_restricted(),
            extra,
        })
    }
}

#[async_trait]
impl SourceCatalog for SqliteCatalog {
    async fn get_record(&self, content_type: ContentType, id: &str) -> SearchResult<Option<SourceRecord>> {
        let sql = format!("SELECT * FROM {} WHERE id = ?", content_type.table_name());
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.db).await?;
        row.map(|r| Self::row_to_record(content_type, &r)).transpose()
    }

    async fn get_tags(&self, content_type: ContentType, id: &str) -> SearchResult<Vec<String>> {
        let names: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT t.name FROM tags t
            INNER JOIN tag_links l ON l.tag_id = t.id
            WHERE l.content_type = ? AND l.entity_id = ?
            ORDER BY t.name
            "#,
        )
        .bind(content_type.as_str())
        .bind(id)
        .fetch_all(&self.db)
        .await
        .map_err(|e| SearchError::TagLookupFailed {
            content_type: content_type.to_string(),
            id: id.to_string(),
            reason: e.to_string(),
        })?;

        Ok(names.into_iter().map(|(n,)| n).collect())
    }

    async fn list_candidate_ids(
        &self,
        content_type: ContentType,
        owner_id: &str,
        filter: &CandidateFilter,
    ) -> SearchResult<Vec<String>> {
        if filter.terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT id FROM ");
        qb.push(content_type.table_name());
        qb.push(" WHERE is_deleted = 0 AND owner_id = ");
        qb.push_bind(owner_id.to_string());
        if let Some(parent) = &filter.parent_ref {
            qb.push(" AND parent_id = ");
            qb.push_bind(parent.clone());
        }

        // 受限内容（加密日记）只匹配标题
        qb.push(" AND (");
        for (i, term) in filter.terms.iter().enumerate() {
            if i > 0 {
                qb.push(" OR ");
            }
            qb.push("instr(lower(title), ");
            qb.push_bind(term.to_lowercase());
            qb.push(") > 0");
            if !content_type.is_restricted() {
                qb.push(" OR instr(lower(content), ");
                qb.push_bind(term.to_lowercase());
                qb.push(") > 0");
            }
        }
        qb.push(") ORDER BY updated_at DESC LIMIT ");
        qb.push_bind(filter.limit.max(1) as i64);

        let rows: Vec<(String,)> = qb.build_query_as().fetch_all(&self.db).await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn list_all_ids(&self, content_type: ContentType, owner_id: Option<&str>) -> SearchResult<Vec<String>> {
        let rows: Vec<(String,)> = match owner_id {
            Some(owner) => {
                let sql = format!("SELECT id FROM {} WHERE owner_id = ? ORDER BY id", content_type.table_name());
                sqlx::query_as(&sql).bind(owner).fetch_all(&self.db).await?
            }
            None => {
                let sql = format!("SELECT id FROM {} ORDER BY id", content_type.table_name());
                sqlx::query_as(&sql).fetch_all(&self.db).await?
            }
        };
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn list_tags(&self, owner_id: &str, module_type: Option<ContentType>) -> SearchResult<Vec<TagInfo>> {
        let rows = sqlx::query(
            r#"
            SELECT t.name, t.color, t.module_type, COUNT(l.entity_id) AS usage_count
            FROM tags t
            LEFT JOIN tag_links l ON l.tag_id = t.id
            WHERE t.owner_id = ? AND (? IS NULL OR t.module_type = ?)
            GROUP BY t.id
            ORDER BY usage_count DESC, t.name ASC
            "#,
        )
        .bind(owner_id)
        .bind(module_type.map(|t| t.as_str()))
        .bind(module_type.map(|t| t.as_str()))
        .fetch_all(&self.db)
        .await?;

        let mut tags = Vec::with_capacity(rows.len());
        for row in rows {
            let module: Option<String> = row.try_get("module_type")?;
            tags.push(TagInfo {
                name: row.try_get("name")?,
                color: row.try_get("color")?,
                module_type: module.and_then(|m| m.parse().ok()),
                usage_count: row.try_get("usage_count")?,
            });
        }
        Ok(tags)
    }
}

#[cfg(test)]
impl SqliteCatalog {
    /// Write a source record the way an owning service would (test seeding)
    pub(crate) async fn save_record(
        conn: &mut sqlx::SqliteConnection,
        record: &SourceRecord,
    ) -> SearchResult<()> {
        let sql = format!(
            r#"
            INSERT INTO {} (id, owner_id, title, content, parent_id, is_favorite, is_archived, is_deleted, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                owner_id = excluded.owner_id,
                title = excluded.title,
                content = excluded.content,
                parent_id = excluded.parent_id,
                is_favorite = excluded.is_favorite,
                is_archived = excluded.is_archived,
                is_deleted = excluded.is_deleted,
                updated_at = excluded.updated_at
            "#,
            record.content_type.table_name()
        );
        sqlx::query(&sql)
            .bind(&record.id)
            .bind(&record.owner_id)
            .bind(&record.title)
            .bind(&record.content)
            .bind(&record.parent_ref)
            .bind(record.favorite)
            .bind(record.archived)
            .bind(record.deleted)
            .bind(record.created_at)
            .bind(record.updated_at)
            .execute(&mut *conn)
            .await?;

        for (name, kind) in extra_columns(record.content_type) {
            let value = record.extra.get(*name);
            let sql = format!("UPDATE {} SET {} = ? WHERE id = ?", record.content_type.table_name(), name);
            let query = sqlx::query(&sql);
            let query = match kind {
                ExtraKind::Text => query.bind(value.and_then(Value::as_str).map(str::to_string)),
                ExtraKind::Integer => query.bind(value.and_then(Value::as_i64)),
            };
            query.bind(&record.id).execute(&mut *conn).await?;
        }
        Ok(())
    }

    /// Replace the tag set of a record, creating tags on demand (test seeding)
    pub(crate) async fn set_tags(
        conn: &mut sqlx::SqliteConnection,
        owner_id: &str,
        content_type: ContentType,
        id: &str,
        names: &[&str],
    ) -> SearchResult<()> {
        sqlx::query("DELETE FROM tag_links WHERE content_type = ? AND entity_id = ?")
            .bind(content_type.as_str())
            .bind(id)
            .execute(&mut *conn)
            .await?;

        for name in names {
            let tag_id = format!("{}:{}:{}", owner_id, content_type.as_str(), name);
            sqlx::query(
                "INSERT OR IGNORE INTO tags (id, owner_id, name, color, module_type, created_at) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&tag_id)
            .bind(owner_id)
            .bind(*name)
            .bind("#3b82f6")
            .bind(content_type.as_str())
            .bind(Utc::now())
            .execute(&mut *conn)
            .await?;

            sqlx::query("INSERT OR IGNORE INTO tag_links (tag_id, content_type, entity_id) VALUES (?, ?, ?)")
                .bind(&tag_id)
                .bind(content_type.as_str())
                .bind(id)
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }
}
