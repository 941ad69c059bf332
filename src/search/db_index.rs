//! 数据库搜索索引 - SQLite 投影表 + FTS5 全文索引
//!
//! Storage layout / 存储方案：
//! - `search_documents`: one denormalized row per (content_type, entity_id) / 每个实体一行
//! - `search_fts`: FTS5 external-content index over title/body/tags_text / 全文索引
//! - three triggers keep `search_fts` in step with `search_documents` / 触发器同步
//! - `search_meta`: key/value metadata (last rebuild time) / 元数据
//!
//! If FTS5 cannot be created the projection still works and every query
//! degrades to the legacy scan.

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use super::error::{SearchError, SearchResult};
use super::query::CompiledQuery;
use super::schema::{ContentType, SearchDocument};

/// bm25 column weights: title, body, tags_text / 列权重
const BM25_WEIGHTS: &str = "10.0, 1.0, 5.0";

/// Index statistics / 索引统计
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    pub documents_by_type: BTreeMap<String, u64>,
    pub total_documents: u64,
    pub native_available: bool,
    pub last_updated: Option<i64>,
}

/// A native FTS hit: projection row plus its bm25 rank (lower is better)
#[derive(Debug, Clone)]
pub struct NativeHit {
    pub document: SearchDocument,
    pub rank: f64,
}

/// 数据库搜索索引
pub struct DbIndex {
    db: Pool<Sqlite>,
    native_enabled: bool,
    native_available: AtomicBool,
}

impl DbIndex {
    /// 使用现有数据库连接池
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self {
            db,
            native_enabled: true,
            native_available: AtomicBool::new(false),
        }
    }

    /// Disable the FTS5 path entirely (config switch) / 关闭全文索引
    pub fn with_native(mut self, enabled: bool) -> Self {
        self.native_enabled = enabled;
        self
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.db
    }

    /// Whether ranked queries can be served / 全文索引是否可用
    pub fn native_available(&self) -> bool {
        self.native_available.load(Ordering::SeqCst)
    }

    /// 关闭数据库连接池 / Close database connection pool
    pub async fn close(&self) {
        self.db.close().await;
    }

    /// 初始化表结构，只在不存在时创建，可在每次启动时调用
    ///
    /// Projection failure is returned as an error. FTS failure is returned too,
    /// after the projection exists, so callers can log it and keep serving
    /// through the legacy path.
    pub async fn ensure_schema(&self) -> SearchResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS search_documents (
                doc_id INTEGER PRIMARY KEY,
                content_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                body TEXT NOT NULL DEFAULT '',
                tags_text TEXT NOT NULL DEFAULT '',
                parent_ref TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                favorite INTEGER NOT NULL DEFAULT 0,
                archived INTEGER NOT NULL DEFAULT 0,
                UNIQUE(content_type, entity_id)
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_search_documents_owner ON search_documents(owner_id, content_type)")
            .execute(&self.db)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS search_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        if !self.native_enabled {
            tracing::info!("Native full-text index disabled by configuration");
            self.native_available.store(false, Ordering::SeqCst);
            return Ok(());
        }

        match self.ensure_fts().await {
            Ok(()) => {
                self.native_available.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                self.native_available.store(false, Ordering::SeqCst);
                Err(SearchError::IndexUnavailable(e.to_string()))
            }
        }
    }

    async fn ensure_fts(&self) -> Result<(), sqlx::Error> {
        let existed: Option<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'search_fts'",
        )
        .fetch_optional(&self.db)
        .await?;

        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE IF NOT EXISTS search_fts USING fts5(
                title, body, tags_text,
                content='search_documents',
                content_rowid='doc_id',
                tokenize='unicode61 remove_diacritics 2'
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            r#"
            CREATE TRIGGER IF NOT EXISTS search_documents_ai AFTER INSERT ON search_documents BEGIN
                INSERT INTO search_fts(rowid, title, body, tags_text)
                VALUES (new.doc_id, new.title, new.body, new.tags_text);
            END
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            r#"
            CREATE TRIGGER IF NOT EXISTS search_documents_ad AFTER DELETE ON search_documents BEGIN
                INSERT INTO search_fts(search_fts, rowid, title, body, tags_text)
                VALUES ('delete', old.doc_id, old.title, old.body, old.tags_text);
            END
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            r#"
            CREATE TRIGGER IF NOT EXISTS search_documents_au AFTER UPDATE ON search_documents BEGIN
                INSERT INTO search_fts(search_fts, rowid, title, body, tags_text)
                VALUES ('delete', old.doc_id, old.title, old.body, old.tags_text);
                INSERT INTO search_fts(rowid, title, body, tags_text)
                VALUES (new.doc_id, new.title, new.body, new.tags_text);
            END
            "#,
        )
        .execute(&self.db)
        .await?;

        // 投影表先于全文索引存在时（例如之前 FTS5 不可用），补建索引内容
        if existed.is_none() {
            sqlx::query("INSERT INTO search_fts(search_fts) VALUES ('rebuild')")
                .execute(&self.db)
                .await?;
            tracing::info!("Full-text index created and populated from projection");
        }

        Ok(())
    }

    /// Ranked owner/type-scoped query over the FTS index / 全文检索（单一类型）
    pub async fn search_native(
        &self,
        query: &CompiledQuery,
        owner_id: &str,
        content_type: ContentType,
        parent_ref: Option<&str>,
        limit: usize,
    ) -> SearchResult<Vec<NativeHit>> {
        if !self.native_available() {
            return Err(SearchError::IndexUnavailable("full-text index not initialized".to_string()));
        }
        let expression = match query.match_expression() {
            Some(expr) => expr,
            None => return Ok(Vec::new()),
        };

        let sql = format!(
            r#"
            SELECT d.content_type, d.entity_id, d.owner_id, d.title, d.body, d.tags_text,
                   d.parent_ref, d.created_at, d.updated_at, d.favorite, d.archived,
                   bm25(search_fts, {weights}) AS bm25_rank
            FROM search_fts
            INNER JOIN search_documents d ON d.doc_id = search_fts.rowid
            WHERE search_fts MATCH ?
              AND d.owner_id = ?
              AND d.content_type = ?
              AND (? IS NULL OR d.parent_ref = ?)
            ORDER BY bm25_rank
            LIMIT ?
            "#,
            weights = BM25_WEIGHTS
        );

        let rows = sqlx::query(&sql)
            .bind(&expression)
            .bind(owner_id)
            .bind(content_type.as_str())
            .bind(parent_ref)
            .bind(parent_ref)
            .bind(limit.max(1) as i64)
            .fetch_all(&self.db)
            .await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            hits.push(NativeHit {
                document: row_to_document(row)?,
                rank: row.try_get::<f64, _>("bm25_rank")?,
            });
        }
        Ok(hits)
    }

    /// Load one projection row / 读取单个投影
    #[cfg(test)]
    pub(crate) async fn get_document(&self, content_type: ContentType, id: &str) -> SearchResult<Option<SearchDocument>> {
        let row = sqlx::query(
            r#"
            SELECT content_type, entity_id, owner_id, title, body, tags_text,
                   parent_ref, created_at, updated_at, favorite, archived
            FROM search_documents
            WHERE content_type = ? AND entity_id = ?
            "#,
        )
        .bind(content_type.as_str())
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        row.map(|r| row_to_document(&r)).transpose()
    }

    /// Titles of active (non-archived) content containing `partial` / 标题建议
    pub async fn suggest_titles(&self, owner_id: &str, partial: &str, limit: usize) -> SearchResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT title FROM search_documents
            WHERE owner_id = ? AND archived = 0 AND title <> ''
              AND instr(lower(title), lower(?)) > 0
            ORDER BY title
            LIMIT ?
            "#,
        )
        .bind(owner_id)
        .bind(partial)
        .bind(limit.max(1) as i64)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(|(t,)| t).collect())
    }

    /// 设置索引更新时间 / Set index last updated time
    pub async fn set_last_updated(&self) -> SearchResult<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("INSERT OR REPLACE INTO search_meta (key, value) VALUES ('last_updated', ?)")
            .bind(now.to_string())
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// 获取索引更新时间 / Get index last updated time
    pub async fn get_last_updated(&self) -> Option<i64> {
        let result: Option<(String,)> = sqlx::query_as("SELECT value FROM search_meta WHERE key = 'last_updated'")
            .fetch_optional(&self.db)
            .await
            .ok()
            .flatten();

        result.and_then(|(v,)| v.parse::<i64>().ok())
    }

    /// 获取统计信息（可按用户过滤）
    pub async fn get_stats(&self, owner_id: Option<&str>) -> IndexStats {
        let rows: Result<Vec<(String, i64)>, _> = sqlx::query_as(
            r#"
            SELECT content_type, COUNT(*) FROM search_documents
            WHERE (? IS NULL OR owner_id = ?)
            GROUP BY content_type
            "#,
        )
        .bind(owner_id)
        .bind(owner_id)
        .fetch_all(&self.db)
        .await;

        let mut stats = IndexStats {
            native_available: self.native_available(),
            last_updated: self.get_last_updated().await,
            ..Default::default()
        };

        match rows {
            Ok(rows) => {
                for (content_type, count) in rows {
                    stats.total_documents += count as u64;
                    stats.documents_by_type.insert(content_type, count as u64);
                }
            }
            Err(e) => tracing::warn!("Failed to read index statistics: {}", e),
        }
        stats
    }
}

/// Map a projection row / 行映射
pub(crate) fn row_to_document(row: &SqliteRow) -> SearchResult<SearchDocument> {
    let content_type: String = row.try_get("content_type")?;
    let content_type = content_type
        .parse::<ContentType>()
        .map_err(SearchError::StorageFailure)?;

    Ok(SearchDocument {
        content_type,
        id: row.try_get("entity_id")?,
        owner_id: row.try_get("owner_id")?,
        title: row.try_get("title")?,
        body: row.try_get("body")?,
        tags_text: row.try_get("tags_text")?,
        parent_ref: row.try_get("parent_ref")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        favorite: row.try_get("favorite")?,
        archived: row.try_get("archived")?,
    })
}
