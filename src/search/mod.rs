//! Search module - ranked search over personal knowledge content / 搜索模块
//!
//! Architecture principles / 架构原则：
//! - Owning services write source entities; the sync engine updates the
//!   `search_documents` projection inside the same transaction
//! - Queries are read-only: FTS5 ranked path first, substring scan as fallback
//! - Source data is reached only through [`crate::source::SourceCatalog`]
//!
//! Index features / 索引特性：
//! - SQLite FTS5 external-content index with bm25 ranking (title > tags > body)
//! - Prefix matching on every term, any-term recall
//! - Unicode-aware tokenizer (remove_diacritics)

pub mod db_index;
pub mod engine;
pub mod error;
pub mod query;
pub mod schema;
pub mod scoring;
pub mod snippet;
pub mod sync;

#[cfg(test)]
pub(crate) mod test_support;

pub use db_index::{DbIndex, IndexStats};
pub use engine::SearchEngine;
pub use error::{SearchError, SearchResult};
pub use query::{compile, CompiledQuery};
pub use schema::{
    ContentType, SearchDocument, SearchRequest, SearchResponse, SearchResultItem, SearchType, SortMode,
};
pub use scoring::RelevanceLevel;
pub use sync::{RebuildReport, SyncEngine, SyncOutcome};
