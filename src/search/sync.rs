//! Sync engine - keeps `search_documents` consistent with source entities / 索引同步
//!
//! All writes take the caller's connection so they run inside the same
//! transaction as the source mutation. A failed projection write fails that
//! transaction; the index never drifts silently.
//!
//! ```ignore
//! let mut tx = pool.begin().await?;
//! save_note(&mut tx, &note).await?;
//! SyncEngine::on_update(&mut tx, &SearchDocument::from_record(&note, &tags)).await?;
//! tx.commit().await?;
//! ```

use serde::Serialize;
use sqlx::{Pool, Sqlite, SqliteConnection};
use std::collections::{BTreeMap, HashSet};

use super::error::{SearchError, SearchResult};
use super::schema::{ContentType, SearchDocument};
use crate::source::SourceCatalog;

/// What a source-driven sync did / 同步结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Indexed,
    Removed,
}

/// Rebuild summary / 重建结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct RebuildReport {
    pub indexed: BTreeMap<String, u64>,
    pub removed: u64,
    pub elapsed_ms: u64,
}

/// 索引同步引擎
pub struct SyncEngine;

impl SyncEngine {
    /// Index a newly persisted entity / 新建
    pub async fn on_create(conn: &mut SqliteConnection, doc: &SearchDocument) -> SearchResult<()> {
        Self::upsert(conn, doc).await
    }

    /// Full row replace after any title/body/tag change / 更新（整行替换）
    pub async fn on_update(conn: &mut SqliteConnection, doc: &SearchDocument) -> SearchResult<()> {
        Self::upsert(conn, doc).await
    }

    /// Remove the projection of a deleted or inaccessible entity / 删除
    pub async fn on_delete(conn: &mut SqliteConnection, content_type: ContentType, id: &str) -> SearchResult<bool> {
        let result = sqlx::query("DELETE FROM search_documents WHERE content_type = ? AND entity_id = ?")
            .bind(content_type.as_str())
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Upsert without `INSERT OR REPLACE`, which would skip the delete trigger
    async fn upsert(conn: &mut SqliteConnection, doc: &SearchDocument) -> SearchResult<()> {
        if doc.id.is_empty() || doc.owner_id.is_empty() {
            return Err(SearchError::InvalidRequest(format!(
                "search document {}:{} has no id or owner",
                doc.content_type, doc.id
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO search_documents
                (content_type, entity_id, owner_id, title, body, tags_text, parent_ref,
                 created_at, updated_at, favorite, archived)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(content_type, entity_id) DO UPDATE SET
                owner_id = excluded.owner_id,
                title = excluded.title,
                body = excluded.body,
                tags_text = excluded.tags_text,
                parent_ref = excluded.parent_ref,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                favorite = excluded.favorite,
                archived = excluded.archived
            "#,
        )
        .bind(doc.content_type.as_str())
        .bind(&doc.id)
        .bind(&doc.owner_id)
        .bind(&doc.title)
        .bind(&doc.body)
        .bind(&doc.tags_text)
        .bind(&doc.parent_ref)
        .bind(doc.created_at)
        .bind(doc.updated_at)
        .bind(doc.favorite)
        .bind(doc.archived)
        .execute(&mut *conn)
        .await?;

        tracing::debug!("Indexed {}:{}", doc.content_type, doc.id);
        Ok(())
    }

    /// Read the current projection of an entity from the catalog
    /// 从数据源推导投影；不存在或已软删除返回 None
    pub async fn derive(
        catalog: &dyn SourceCatalog,
        content_type: ContentType,
        id: &str,
    ) -> SearchResult<Option<SearchDocument>> {
        let record = match catalog.get_record(content_type, id).await? {
            Some(r) if !r.deleted && !r.owner_id.is_empty() => r,
            _ => return Ok(None),
        };
        let tags = catalog.get_tags(content_type, id).await?;
        Ok(Some(SearchDocument::from_record(&record, &tags)))
    }

    /// Apply a derived projection: upsert it, or delete when absent / 应用推导结果
    pub async fn apply(
        conn: &mut SqliteConnection,
        content_type: ContentType,
        id: &str,
        derived: Option<&SearchDocument>,
    ) -> SearchResult<SyncOutcome> {
        match derived {
            Some(doc) => {
                Self::upsert(conn, doc).await?;
                Ok(SyncOutcome::Indexed)
            }
            None => {
                Self::on_delete(conn, content_type, id).await?;
                Ok(SyncOutcome::Removed)
            }
        }
    }

    /// Re-derive one entity from its source and sync it. Restores documents
    /// after a soft-delete is reversed.
    ///
    /// The catalog is read before `conn` is written; with a single-connection
    /// pool, call [`SyncEngine::derive`] before opening the transaction instead.
    pub async fn sync_from_source(
        conn: &mut SqliteConnection,
        catalog: &dyn SourceCatalog,
        content_type: ContentType,
        id: &str,
    ) -> SearchResult<SyncOutcome> {
        let derived = Self::derive(catalog, content_type, id).await?;
        Self::apply(conn, content_type, id, derived.as_ref()).await
    }

    /// Drop projection rows, optionally for one owner and/or type / 清空投影
    pub async fn clear(
        conn: &mut SqliteConnection,
        owner_id: Option<&str>,
        content_type: Option<ContentType>,
    ) -> SearchResult<u64> {
        let result = sqlx::query(
            "DELETE FROM search_documents WHERE (? IS NULL OR owner_id = ?) AND (? IS NULL OR content_type = ?)",
        )
        .bind(owner_id)
        .bind(owner_id)
        .bind(content_type.map(|t| t.as_str()))
        .bind(content_type.map(|t| t.as_str()))
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// Rebuild the projection from the catalog, one transaction per type
    /// 从数据源重建索引，每个类型一个事务
    pub async fn rebuild(
        pool: &Pool<Sqlite>,
        catalog: &dyn SourceCatalog,
        owner_id: Option<&str>,
    ) -> SearchResult<RebuildReport> {
        let start = std::time::Instant::now();
        let mut report = RebuildReport::default();

        for content_type in ContentType::ALL {
            let ids = catalog.list_all_ids(content_type, owner_id).await?;
            let mut docs = Vec::with_capacity(ids.len());
            for id in &ids {
                if let Some(doc) = Self::derive(catalog, content_type, id).await? {
                    docs.push(doc);
                }
            }

            let mut tx = pool.begin().await?;
            let existing: Vec<(String,)> = sqlx::query_as(
                "SELECT entity_id FROM search_documents WHERE (? IS NULL OR owner_id = ?) AND content_type = ?",
            )
            .bind(owner_id)
            .bind(owner_id)
            .bind(content_type.as_str())
            .fetch_all(&mut *tx)
            .await?;

            Self::clear(&mut tx, owner_id, Some(content_type)).await?;
            for doc in &docs {
                Self::upsert(&mut tx, doc).await?;
            }
            tx.commit().await?;

            let kept: HashSet<&str> = docs.iter().map(|d| d.id.as_str()).collect();
            report.removed += existing.iter().filter(|(id,)| !kept.contains(id.as_str())).count() as u64;
            report.indexed.insert(content_type.to_string(), docs.len() as u64);
            tracing::info!("Rebuilt {} index: {} documents", content_type, docs.len());
        }

        report.elapsed_ms = start.elapsed().as_millis() as u64;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::db_index::DbIndex;
    use crate::search::query::compile;
    use crate::search::test_support::{document, memory_pool, record};
    use crate::source::SqliteCatalog;

    async fn setup() -> (DbIndex, SqliteCatalog) {
        let pool = memory_pool().await;
        let index = DbIndex::new(pool.clone());
        index.ensure_schema().await.unwrap();
        let catalog = SqliteCatalog::new(pool);
        catalog.init().await.unwrap();
        (index, catalog)
    }

    async fn count_rows(index: &DbIndex) -> i64 {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM search_documents")
            .fetch_one(index.pool())
            .await
            .unwrap();
        n
    }

    async fn native_ids(index: &DbIndex, q: &str) -> Vec<String> {
        index
            .search_native(&compile(q), "u1", ContentType::Note, None, 50)
            .await
            .unwrap()
            .into_iter()
            .map(|h| h.document.id)
            .collect()
    }

    #[tokio::test]
    async fn test_upsert_never_duplicates() {
        let (index, _) = setup().await;
        let mut doc = document(ContentType::Note, "n1", "u1", "First", "");
        let mut tx = index.pool().begin().await.unwrap();
        SyncEngine::on_create(&mut tx, &doc).await.unwrap();
        doc.title = "Second".to_string();
        SyncEngine::on_update(&mut tx, &doc).await.unwrap();
        SyncEngine::on_update(&mut tx, &doc).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(count_rows(&index).await, 1);
        let stored = index.get_document(ContentType::Note, "n1").await.unwrap().unwrap();
        assert_eq!(stored.title, "Second");
        assert_eq!(native_ids(&index, "second").await, vec!["n1"]);
        assert!(native_ids(&index, "first").await.is_empty());
    }

    #[tokio::test]
    async fn test_tag_change_reindexes() {
        let (index, _) = setup().await;
        let mut doc = document(ContentType::Note, "n1", "u1", "Weekly", "");
        doc.tags_text = "oldtag shared".to_string();
        let mut tx = index.pool().begin().await.unwrap();
        SyncEngine::on_create(&mut tx, &doc).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(native_ids(&index, "oldtag").await, vec!["n1"]);

        doc.tags_text = "newtag shared".to_string();
        let mut tx = index.pool().begin().await.unwrap();
        SyncEngine::on_update(&mut tx, &doc).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(native_ids(&index, "newtag").await, vec!["n1"]);
        assert!(native_ids(&index, "oldtag").await.is_empty());
        assert_eq!(native_ids(&index, "shared").await, vec!["n1"]);
    }

    #[tokio::test]
    async fn test_delete_removes_from_index() {
        let (index, _) = setup().await;
        let mut tx = index.pool().begin().await.unwrap();
        SyncEngine::on_create(&mut tx, &document(ContentType::Note, "n1", "u1", "Gone soon", "")).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = index.pool().begin().await.unwrap();
        assert!(SyncEngine::on_delete(&mut tx, ContentType::Note, "n1").await.unwrap());
        assert!(!SyncEngine::on_delete(&mut tx, ContentType::Note, "n1").await.unwrap());
        tx.commit().await.unwrap();

        assert_eq!(count_rows(&index).await, 0);
        assert!(native_ids(&index, "gone").await.is_empty());
    }

    #[tokio::test]
    async fn test_rollback_discards_projection_write() {
        let (index, _) = setup().await;
        let mut tx = index.pool().begin().await.unwrap();
        SyncEngine::on_create(&mut tx, &document(ContentType::Note, "n1", "u1", "Draft", "")).await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(count_rows(&index).await, 0);
        assert!(native_ids(&index, "draft").await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_document_fails_transaction() {
        let (index, _) = setup().await;
        let mut tx = index.pool().begin().await.unwrap();
        let bad = document(ContentType::Note, "", "u1", "No id", "");
        let err = SyncEngine::on_create(&mut tx, &bad).await.unwrap_err();
        assert!(matches!(err, SearchError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_sync_from_source_handles_soft_delete_and_restore() {
        let (index, catalog) = setup().await;
        let pool = index.pool().clone();

        let mut rec = record(ContentType::Note, "n1", "u1", "Recipe", "tomato soup");
        let mut conn = pool.acquire().await.unwrap();
        SqliteCatalog::save_record(&mut conn, &rec).await.unwrap();
        SqliteCatalog::set_tags(&mut conn, "u1", ContentType::Note, "n1", &["kitchen"]).await.unwrap();
        drop(conn);

        let derived = SyncEngine::derive(&catalog, ContentType::Note, "n1").await.unwrap();
        assert_eq!(derived.as_ref().unwrap().tags_text, "kitchen");
        let mut tx = pool.begin().await.unwrap();
        let outcome = SyncEngine::apply(&mut tx, ContentType::Note, "n1", derived.as_ref()).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(outcome, SyncOutcome::Indexed);
        assert_eq!(native_ids(&index, "kitchen").await, vec!["n1"]);

        // 软删除后索引被移除
        rec.deleted = true;
        let mut conn = pool.acquire().await.unwrap();
        SqliteCatalog::save_record(&mut conn, &rec).await.unwrap();
        drop(conn);
        let derived = SyncEngine::derive(&catalog, ContentType::Note, "n1").await.unwrap();
        assert!(derived.is_none());
        let mut tx = pool.begin().await.unwrap();
        let outcome = SyncEngine::apply(&mut tx, ContentType::Note, "n1", derived.as_ref()).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(outcome, SyncOutcome::Removed);
        assert!(native_ids(&index, "recipe").await.is_empty());

        // 恢复后重新建立索引
        rec.deleted = false;
        let mut conn = pool.acquire().await.unwrap();
        SqliteCatalog::save_record(&mut conn, &rec).await.unwrap();
        drop(conn);
        let derived = SyncEngine::derive(&catalog, ContentType::Note, "n1").await.unwrap();
        let mut tx = pool.begin().await.unwrap();
        SyncEngine::apply(&mut tx, ContentType::Note, "n1", derived.as_ref()).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(native_ids(&index, "recipe").await, vec!["n1"]);
    }

    #[tokio::test]
    async fn test_restricted_body_not_indexed() {
        let (index, catalog) = setup().await;
        let pool = index.pool().clone();
        let mut conn = pool.acquire().await.unwrap();
        SqliteCatalog::save_record(&mut conn, &record(ContentType::DiaryEntry, "d1", "u1", "Tuesday", "private thoughts"))
            .await
            .unwrap();
        SqliteCatalog::set_tags(&mut conn, "u1", ContentType::DiaryEntry, "d1", &["travel"]).await.unwrap();
        drop(conn);

        let doc = SyncEngine::derive(&catalog, ContentType::DiaryEntry, "d1").await.unwrap().unwrap();
        assert!(doc.body.is_empty());
        assert_eq!(doc.preview_source(), "travel");
    }

    #[tokio::test]
    async fn test_rebuild_from_catalog() {
        let (index, catalog) = setup().await;
        let pool = index.pool().clone();

        // 残留的过期投影
        let mut tx = pool.begin().await.unwrap();
        SyncEngine::on_create(&mut tx, &document(ContentType::Note, "stale", "u1", "Stale", "")).await.unwrap();
        tx.commit().await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        SqliteCatalog::save_record(&mut conn, &record(ContentType::Note, "n1", "u1", "Alpha", "")).await.unwrap();
        SqliteCatalog::save_record(&mut conn, &record(ContentType::Todo, "t1", "u1", "Beta", "")).await.unwrap();
        let mut gone = record(ContentType::Todo, "t2", "u1", "Gamma", "");
        gone.deleted = true;
        SqliteCatalog::save_record(&mut conn, &gone).await.unwrap();
        SqliteCatalog::save_record(&mut conn, &record(ContentType::Note, "n9", "u2", "Other user", "")).await.unwrap();
        drop(conn);

        let report = SyncEngine::rebuild(&pool, &catalog, Some("u1")).await.unwrap();
        assert_eq!(report.indexed.get("note"), Some(&1));
        assert_eq!(report.indexed.get("todo"), Some(&1));
        assert_eq!(report.removed, 1);

        assert!(index.get_document(ContentType::Note, "stale").await.unwrap().is_none());
        assert!(index.get_document(ContentType::Todo, "t2").await.unwrap().is_none());
        assert!(index.get_document(ContentType::Note, "n9").await.unwrap().is_none());
        assert_eq!(native_ids(&index, "alpha").await, vec!["n1"]);
    }
}
