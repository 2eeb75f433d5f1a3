//! Search module
//!
//! A strategy registry (not a class hierarchy, per the design notes):
//! each strategy is a value exposing `can_handle` + `search`, and the
//! dispatcher fans a query out to every strategy that claims it, then
//! fuses the result lists.

pub mod dispatcher;
pub mod metadata;

pub use dispatcher::{reciprocal_rank_fusion, SearchDispatcher, StrategyRegistry};
pub use metadata::{MetadataField, MetadataFilters, MetadataOp, MetadataStrategy};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::memory::Memory;
use crate::storage::Store;

/// A search request scoped to one namespace.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub namespace: String,
    pub text: String,
    pub limit: usize,
    pub offset: usize,
    pub metadata_filters: Option<MetadataFilters>,
    pub sort: Option<String>,
}

impl SearchQuery {
    pub fn new(namespace: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            text: text.into(),
            limit: 20,
            offset: 0,
            metadata_filters: None,
            sort: None,
        }
    }
}

/// The metadata block every search result carries, per the external
/// interface contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultMetadata {
    pub summary: String,
    pub category: String,
    pub importance_score: f64,
    pub memory_type: String,
    pub created_at: DateTime<Utc>,
}

/// A single ranked search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: String,
    pub content: String,
    pub score: f64,
    pub strategy: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: SearchResultMetadata,
}

impl SearchResult {
    pub fn from_memory(memory: &Memory, score: f64, strategy: &str) -> Self {
        Self {
            id: memory.id.clone(),
            content: memory.searchable_content.clone(),
            score: score.clamp(0.0, 1.0),
            strategy: strategy.to_string(),
            timestamp: memory.created_at,
            metadata: SearchResultMetadata {
                summary: memory.summary.clone(),
                category: memory.category_primary.clone(),
                importance_score: memory.importance_score,
                memory_type: memory.classification.as_str().to_string(),
                created_at: memory.created_at,
            },
        }
    }
}

/// A named search algorithm. Implementations are plain values held in a
/// `StrategyRegistry`, never a base class.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;
    fn can_handle(&self, query: &SearchQuery) -> bool;
    fn search(&self, store: &Store, query: &SearchQuery) -> Result<Vec<SearchResult>>;
}

/// Full-text strategy backed by the FTS5 mirror, ranked by BM25.
pub struct FtsStrategy;

impl Strategy for FtsStrategy {
    fn name(&self) -> &str {
        "fts"
    }

    fn can_handle(&self, query: &SearchQuery) -> bool {
        !query.text.trim().is_empty()
    }

    fn search(&self, store: &Store, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        let hits = store.fts_query(&query.namespace, &query.text, query.limit + query.offset)?;
        Ok(hits
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .map(|hit| {
                let normalized = 1.0 / (1.0 + hit.bm25_rank.abs());
                SearchResult::from_memory(&hit.memory, normalized, "fts")
            })
            .collect())
    }
}

/// Free-text tokens that route a query to the temporal strategy, the same
/// token-sniffing idiom `CategoryStrategy` uses for `category:`.
const RECENCY_KEYWORDS: &[&str] = &["recent", "latest", "newest", "oldest", "today", "yesterday"];

/// Temporal strategy: orders a namespace by `createdAt`, most-recent first
/// unless `sort` asks for "oldest", scoring by normalized recency.
pub struct TemporalStrategy;

impl Strategy for TemporalStrategy {
    fn name(&self) -> &str {
        "temporal"
    }

    fn can_handle(&self, query: &SearchQuery) -> bool {
        let wants_oldest_or_newest = matches!(query.sort.as_deref(), Some("recent") | Some("newest") | Some("oldest"));
        let text = query.text.to_lowercase();
        wants_oldest_or_newest || RECENCY_KEYWORDS.iter().any(|kw| text.contains(kw))
    }

    fn search(&self, store: &Store, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        let mut rows = store.find_all(&query.namespace)?;
        let oldest_first = matches!(query.sort.as_deref(), Some("oldest"));
        rows.sort_by(|a, b| if oldest_first { a.created_at.cmp(&b.created_at) } else { b.created_at.cmp(&a.created_at) });

        let now = Utc::now();
        let max_age_seconds = rows
            .iter()
            .map(|m| (now - m.created_at).num_seconds().max(0) as f64)
            .fold(0.0_f64, f64::max)
            .max(1.0);

        Ok(rows
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .map(|m| {
                let age_seconds = (now - m.created_at).num_seconds().max(0) as f64;
                let score = 1.0 - (age_seconds / max_age_seconds).clamp(0.0, 1.0);
                SearchResult::from_memory(&m, score, "temporal")
            })
            .collect())
    }
}

/// Category strategy: an exact match on `categoryPrimary` supplied as a
/// metadata filter field named `category`.
pub struct CategoryStrategy;

impl Strategy for CategoryStrategy {
    fn name(&self) -> &str {
        "category"
    }

    fn can_handle(&self, query: &SearchQuery) -> bool {
        query
            .metadata_filters
            .as_ref()
            .map(|f| f.fields.iter().any(|field| field.key == "category"))
            .unwrap_or(false)
    }

    fn search(&self, store: &Store, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        let all = store.find_all(&query.namespace)?;
        let category = query
            .text
            .split_whitespace()
            .find_map(|tok| tok.strip_prefix("category:"))
            .unwrap_or(query.text.trim());
        let matches: Vec<SearchResult> = all
            .iter()
            .filter(|m| m.category_primary == category)
            .skip(query.offset)
            .take(query.limit)
            .map(|m| SearchResult::from_memory(m, 0.8, "category"))
            .collect();
        Ok(matches)
    }
}
