//! Search engine - multi-type search orchestrator / 搜索引擎
//!
//! Flow of one request / 请求流程：
//! 1. compile the query; an always-miss query returns immediately
//! 2. per-type native (FTS5) sub-queries, issued concurrently
//! 3. zero native hits or a native error: rerun as the legacy substring scan
//! 4. tag post-filter, sort, count, paginate
//!
//! The engine is built once at startup and shared through `AppState`.

use futures::future::{join_all, try_join_all};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::db_index::{DbIndex, IndexStats};
use super::error::{SearchError, SearchResult};
use super::query::{compile, CompiledQuery};
use super::schema::{
    tags_text, ContentType, SearchDocument, SearchHit, SearchPerformance, SearchRequest, SearchResponse,
    SearchResultItem, SearchType, SortMode,
};
use super::scoring::{fallback_score, native_raw_score, normalize_fallback, normalize_native, RelevanceLevel};
use super::snippet::{collect_suggestions, contains_ci, extract_preview, MIN_SUGGESTION_CHARS};
use super::sync::{RebuildReport, SyncEngine, SyncOutcome};
use crate::config::SearchConfig;
use crate::source::{CandidateFilter, SourceCatalog, TagInfo};

/// Search engine / 搜索引擎
pub struct SearchEngine {
    index: DbIndex,
    catalog: Arc<dyn SourceCatalog>,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(index: DbIndex, catalog: Arc<dyn SourceCatalog>, config: SearchConfig) -> Self {
        let index = index.with_native(config.native_index);
        Self { index, catalog, config }
    }

    pub fn index(&self) -> &DbIndex {
        &self.index
    }

    pub fn catalog(&self) -> &Arc<dyn SourceCatalog> {
        &self.catalog
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Create projection and FTS structures. An FTS failure only disables
    /// the native path. 初始化索引结构
    pub async fn ensure_schema(&self) -> SearchResult<()> {
        match self.index.ensure_schema().await {
            Ok(()) => {
                tracing::info!("Search index ready (native: {})", self.index.native_available());
                Ok(())
            }
            Err(SearchError::IndexUnavailable(e)) => {
                tracing::error!("Full-text index unavailable, serving legacy search only: {}", e);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to create search projection: {}", e);
                Err(e)
            }
        }
    }

    /// Search with fallback to the legacy scan / 搜索（含降级）
    pub async fn search(&self, request: SearchRequest) -> SearchResult<SearchResponse> {
        self.search_with_cancel(request, CancellationToken::new()).await
    }

    /// Search that stops when `cancel` fires or the deadline passes.
    /// Nothing partial is returned. 可取消的搜索
    pub async fn search_with_cancel(
        &self,
        request: SearchRequest,
        cancel: CancellationToken,
    ) -> SearchResult<SearchResponse> {
        self.run_guarded(request, cancel, true).await
    }

    /// Index-only search; `IndexUnavailable` is surfaced / 仅全文索引搜索
    pub async fn search_fts(&self, request: SearchRequest) -> SearchResult<SearchResponse> {
        self.run_guarded(request, CancellationToken::new(), false).await
    }

    async fn run_guarded(
        &self,
        request: SearchRequest,
        cancel: CancellationToken,
        allow_fallback: bool,
    ) -> SearchResult<SearchResponse> {
        let timeout_ms = self.config.query_timeout_ms;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Search cancelled: {:?}", request.query);
                Err(SearchError::Cancelled)
            }
            result = tokio::time::timeout(Duration::from_millis(timeout_ms), self.run(&request, allow_fallback)) => {
                match result {
                    Ok(response) => response,
                    Err(_) => {
                        tracing::warn!("Search timed out after {} ms: {:?}", timeout_ms, request.query);
                        Err(SearchError::Timeout(timeout_ms))
                    }
                }
            }
        }
    }

    async fn run(&self, request: &SearchRequest, allow_fallback: bool) -> SearchResult<SearchResponse> {
        let start = Instant::now();
        if request.owner_id.is_empty() {
            return Err(SearchError::InvalidRequest("owner is required".to_string()));
        }

        let types = request.effective_types();
        let limit = self.clamp_limit(request.limit);
        let compiled = compile(&request.query);
        let native_available = self.index.native_available();

        if compiled.is_always_miss() {
            let search_type = if native_available { SearchType::Fts } else { SearchType::Legacy };
            return Ok(SearchResponse {
                results: Vec::new(),
                total: 0,
                query: request.query.clone(),
                search_type,
                performance: SearchPerformance {
                    elapsed_ms: start.elapsed().as_millis() as u64,
                    candidates: 0,
                    content_types: types,
                    native_available,
                    truncated: false,
                },
            });
        }

        let native = if native_available {
            match self.native_hits(&compiled, request, &types).await {
                Ok(gathered) => gathered,
                Err(e) if allow_fallback && e.is_fallback_eligible() => {
                    tracing::warn!("Native search failed, falling back to legacy scan: {}", e);
                    (Vec::new(), false)
                }
                Err(e) => return Err(e),
            }
        } else if allow_fallback {
            (Vec::new(), false)
        } else {
            return Err(SearchError::IndexUnavailable("full-text index not initialized".to_string()));
        };

        let ((mut hits, truncated), search_type) = if !native.0.is_empty() || !allow_fallback {
            (native, SearchType::Fts)
        } else {
            let legacy = self.legacy_hits(&compiled, request, &types).await.map_err(|e| {
                tracing::error!("Legacy search failed: {}", e);
                SearchError::StorageFailure(e.to_string())
            })?;
            (legacy, SearchType::Legacy)
        };
        let candidates = hits.len();

        if !request.tags.is_empty() {
            hits = self.filter_by_tags(hits, &request.tags).await;
        }

        hits.sort_by(|a, b| compare_hits(a, b, request.sort));
        let total = hits.len();
        let page: Vec<SearchHit> = hits.into_iter().skip(request.offset).take(limit).collect();

        let results = self.build_items(page, &compiled).await;

        tracing::debug!(
            "Search {:?} ({:?}): {} of {} results in {} ms",
            request.query,
            search_type,
            results.len(),
            total,
            start.elapsed().as_millis()
        );

        Ok(SearchResponse {
            results,
            total,
            query: request.query.clone(),
            search_type,
            performance: SearchPerformance {
                elapsed_ms: start.elapsed().as_millis() as u64,
                candidates,
                content_types: types,
                native_available,
                truncated,
            },
        })
    }

    fn clamp_limit(&self, limit: usize) -> usize {
        let limit = if limit == 0 { self.config.default_limit } else { limit };
        limit.clamp(1, self.config.max_limit.max(1))
    }

    fn reached_cap(&self, gathered: usize) -> bool {
        gathered >= self.config.max_candidates_per_type.max(1)
    }

    /// Ranked per-type queries, merged and normalized. The flag reports
    /// whether any type was cut at the candidate cap. 全文检索
    async fn native_hits(
        &self,
        compiled: &CompiledQuery,
        request: &SearchRequest,
        types: &[ContentType],
    ) -> SearchResult<(Vec<SearchHit>, bool)> {
        let parent = request.parent_ref.as_deref();
        let per_type = try_join_all(types.iter().map(|&content_type| {
            self.index.search_native(
                compiled,
                &request.owner_id,
                content_type,
                parent,
                self.config.max_candidates_per_type,
            )
        }))
        .await?;

        let truncated = per_type.iter().any(|hits| self.reached_cap(hits.len()));
        let mut hits: Vec<SearchHit> = per_type
            .into_iter()
            .flatten()
            .map(|hit| SearchHit {
                document: hit.document,
                raw_score: native_raw_score(hit.rank),
                relevance_score: 0.0,
                tags: None,
                extra: serde_json::Map::new(),
            })
            .collect();
        normalize_native(&mut hits);
        Ok((hits, truncated))
    }

    /// Substring scan over the live tables with heuristic scoring / 传统搜索
    async fn legacy_hits(
        &self,
        compiled: &CompiledQuery,
        request: &SearchRequest,
        types: &[ContentType],
    ) -> SearchResult<(Vec<SearchHit>, bool)> {
        let filter = CandidateFilter {
            terms: compiled.terms().to_vec(),
            parent_ref: request.parent_ref.clone(),
            limit: self.config.max_candidates_per_type,
        };

        let per_type = try_join_all(
            types
                .iter()
                .map(|&content_type| self.legacy_hits_for_type(compiled, &request.owner_id, content_type, &filter)),
        )
        .await?;
        let truncated = per_type.iter().any(|(_, capped)| *capped);
        Ok((per_type.into_iter().flat_map(|(hits, _)| hits).collect(), truncated))
    }

    async fn legacy_hits_for_type(
        &self,
        compiled: &CompiledQuery,
        owner_id: &str,
        content_type: ContentType,
        filter: &CandidateFilter,
    ) -> SearchResult<(Vec<SearchHit>, bool)> {
        let ids = self.catalog.list_candidate_ids(content_type, owner_id, filter).await?;
        let capped = self.reached_cap(ids.len());
        let mut hits = Vec::with_capacity(ids.len());
        for id in ids {
            let record = match self.catalog.get_record(content_type, &id).await? {
                Some(r) if !r.deleted && r.owner_id == owner_id => r,
                _ => continue,
            };
            let document = SearchDocument::from_record(&record, &[]);
            let raw_score = fallback_score(compiled.text(), &document.title, &document.body);
            hits.push(SearchHit {
                relevance_score: normalize_fallback(raw_score),
                raw_score,
                document,
                tags: None,
                extra: record.extra,
            });
        }
        Ok((hits, capped))
    }

    /// Current tags of one entity; lookup failures yield no tags / 获取标签
    async fn tags_for(&self, content_type: ContentType, id: &str) -> Vec<String> {
        match self.catalog.get_tags(content_type, id).await {
            Ok(tags) => tags,
            Err(e) => {
                let err = SearchError::TagLookupFailed {
                    content_type: content_type.to_string(),
                    id: id.to_string(),
                    reason: e.to_string(),
                };
                tracing::warn!("{}", err);
                Vec::new()
            }
        }
    }

    /// Keep hits carrying any requested tag (case-insensitive) / 标签过滤
    async fn filter_by_tags(&self, hits: Vec<SearchHit>, wanted: &[String]) -> Vec<SearchHit> {
        let wanted: Vec<String> = wanted
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        if wanted.is_empty() {
            return hits;
        }

        let tag_sets = join_all(
            hits.iter()
                .map(|hit| self.tags_for(hit.document.content_type, &hit.document.id)),
        )
        .await;

        hits.into_iter()
            .zip(tag_sets)
            .filter_map(|(mut hit, tags)| {
                let matched = tags.iter().any(|t| wanted.contains(&t.to_lowercase()));
                if matched {
                    hit.tags = Some(tags);
                    Some(hit)
                } else {
                    None
                }
            })
            .collect()
    }

    /// Turn page hits into response items, loading type-specific fields / 构建结果
    async fn build_items(&self, page: Vec<SearchHit>, compiled: &CompiledQuery) -> Vec<SearchResultItem> {
        let mut items = Vec::with_capacity(page.len());
        for mut hit in page {
            let content_type = hit.document.content_type;
            let id = hit.document.id.clone();

            let tags = match hit.tags.take() {
                Some(tags) => tags,
                None => self.tags_for(content_type, &id).await,
            };
            hit.document.tags_text = tags_text(&tags);

            if hit.extra.is_empty() {
                match self.catalog.get_record(content_type, &id).await {
                    Ok(Some(record)) => hit.extra = record.extra,
                    Ok(None) => {}
                    Err(e) => tracing::debug!("No extra fields for {}:{}: {}", content_type, id, e),
                }
            }

            let preview = extract_preview(hit.document.preview_source(), compiled.text(), self.config.preview_length);
            let doc = hit.document;
            items.push(SearchResultItem {
                content_type,
                url: content_type.url_for(&doc.id),
                id: doc.id,
                title: doc.title,
                preview,
                created_at: doc.created_at,
                updated_at: doc.updated_at,
                relevance_score: hit.relevance_score,
                relevance_level: RelevanceLevel::from_score(hit.relevance_score),
                favorite: doc.favorite,
                parent_ref: doc.parent_ref,
                tags,
                extra: hit.extra,
            });
        }
        items
    }

    /// Title and `#tag` suggestions for a partial query / 搜索建议
    pub async fn suggest(&self, partial: &str, owner_id: &str) -> SearchResult<Vec<String>> {
        let partial = partial.trim();
        if partial.chars().count() < MIN_SUGGESTION_CHARS {
            return Ok(Vec::new());
        }
        let limit = self.config.suggestion_limit;
        let titles = self.index.suggest_titles(owner_id, partial, limit).await?;
        let tags = self
            .catalog
            .list_tags(owner_id, None)
            .await?
            .into_iter()
            .map(|t| t.name)
            .filter(|name| contains_ci(name, partial));
        Ok(collect_suggestions(titles, tags, limit))
    }

    /// Most used tags, optionally for one module / 热门标签
    pub async fn popular_tags(&self, owner_id: &str, module_type: Option<ContentType>) -> SearchResult<Vec<TagInfo>> {
        let mut tags: Vec<TagInfo> = self
            .catalog
            .list_tags(owner_id, module_type)
            .await?
            .into_iter()
            .filter(|t| t.usage_count > 0)
            .collect();
        tags.sort_by(|a, b| b.usage_count.cmp(&a.usage_count).then_with(|| a.name.cmp(&b.name)));
        tags.truncate(self.config.popular_tag_limit);
        Ok(tags)
    }

    /// Tag names containing `query`, prefix matches first / 标签自动补全
    pub async fn autocomplete_tags(
        &self,
        query: &str,
        owner_id: &str,
        module_type: Option<ContentType>,
    ) -> SearchResult<Vec<TagInfo>> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let mut tags: Vec<TagInfo> = self
            .catalog
            .list_tags(owner_id, module_type)
            .await?
            .into_iter()
            .filter(|t| t.name.to_lowercase().contains(&query))
            .collect();
        tags.sort_by(|a, b| {
            let a_prefix = a.name.to_lowercase().starts_with(&query);
            let b_prefix = b.name.to_lowercase().starts_with(&query);
            b_prefix
                .cmp(&a_prefix)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });
        tags.truncate(self.config.autocomplete_limit);
        Ok(tags)
    }

    /// Index statistics / 索引统计
    pub async fn stats(&self, owner_id: Option<&str>) -> IndexStats {
        self.index.get_stats(owner_id).await
    }

    /// Re-derive one entity from the catalog and sync its projection / 同步单个实体
    pub async fn sync_entity(&self, content_type: ContentType, id: &str) -> SearchResult<SyncOutcome> {
        let derived = SyncEngine::derive(self.catalog.as_ref(), content_type, id).await?;
        let mut tx = self.index.pool().begin().await?;
        let outcome = SyncEngine::apply(&mut tx, content_type, id, derived.as_ref()).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    /// Rebuild the projection from the catalog / 重建索引
    pub async fn rebuild(&self, owner_id: Option<&str>) -> SearchResult<RebuildReport> {
        tracing::info!("Rebuilding search index (owner: {:?})", owner_id);
        let report = SyncEngine::rebuild(self.index.pool(), self.catalog.as_ref(), owner_id).await?;
        self.index.set_last_updated().await?;
        tracing::info!(
            "Search index rebuilt: {} documents in {} ms",
            report.indexed.values().sum::<u64>(),
            report.elapsed_ms
        );
        Ok(report)
    }
}

/// Total order for every sort mode; the `(type, id)` key keeps paging stable
fn compare_hits(a: &SearchHit, b: &SearchHit, sort: SortMode) -> Ordering {
    let (da, db) = (&a.document, &b.document);
    let newer_first = || db.updated_at.cmp(&da.updated_at);
    let favorite_first = || db.favorite.cmp(&da.favorite);
    let key = || (da.content_type, &da.id).cmp(&(db.content_type, &db.id));

    match sort {
        SortMode::Relevance => b
            .relevance_score
            .total_cmp(&a.relevance_score)
            .then_with(newer_first)
            .then_with(favorite_first)
            .then_with(key),
        SortMode::Date => newer_first()
            .then_with(|| da.title.cmp(&db.title))
            .then_with(favorite_first)
            .then_with(key),
        SortMode::Title => da
            .title
            .to_lowercase()
            .cmp(&db.title.to_lowercase())
            .then_with(newer_first)
            .then_with(favorite_first)
            .then_with(key),
    }
}
