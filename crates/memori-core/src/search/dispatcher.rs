//! Search Dispatcher
//!
//! Fans a query out to every registered strategy that claims it, then
//! fuses the per-strategy result lists with Reciprocal Rank Fusion.

use std::collections::BTreeMap;

use crate::config::MetadataStrategyConfig;
use crate::error::Result;
use crate::search::{MetadataStrategy, SearchQuery, SearchResult, Strategy};
use crate::storage::Store;

/// Process-wide mapping from strategy name to strategy value, initialized
/// at startup and treated as immutable thereafter.
pub struct StrategyRegistry {
    strategies: Vec<Box<dyn Strategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self { strategies: Vec::new() }
    }

    pub fn register(mut self, strategy: Box<dyn Strategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Box<dyn Strategy>> {
        self.strategies.iter()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
            .register(Box::new(crate::search::FtsStrategy))
            .register(Box::new(crate::search::CategoryStrategy))
            .register(Box::new(MetadataStrategy::new(MetadataStrategyConfig::default())))
            .register(Box::new(crate::search::TemporalStrategy))
    }
}

/// Dispatches a query across a registry and fuses the results.
pub struct SearchDispatcher {
    registry: StrategyRegistry,
    rrf_k: f64,
}

impl SearchDispatcher {
    pub fn new(registry: StrategyRegistry) -> Self {
        Self { registry, rrf_k: 60.0 }
    }

    pub fn dispatch(&self, store: &Store, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        let mut per_strategy: Vec<Vec<SearchResult>> = Vec::new();
        for strategy in self.registry.iter() {
            if strategy.can_handle(query) {
                per_strategy.push(strategy.search(store, query)?);
            }
        }
        let mut fused = reciprocal_rank_fusion(&per_strategy, self.rrf_k);
        fused.truncate(query.limit);
        Ok(fused)
    }
}

impl Default for SearchDispatcher {
    fn default() -> Self {
        Self::new(StrategyRegistry::default())
    }
}

/// Merges several ranked result lists into one, scoring each id by the
/// sum of `1 / (k + rank)` across every list it appears in. Ties broken by
/// the highest individual strategy score.
pub fn reciprocal_rank_fusion(result_lists: &[Vec<SearchResult>], k: f64) -> Vec<SearchResult> {
    let mut fused_scores: BTreeMap<String, f64> = BTreeMap::new();
    let mut best_by_id: BTreeMap<String, SearchResult> = BTreeMap::new();

    for list in result_lists {
        for (rank, result) in list.iter().enumerate() {
            let contribution = 1.0 / (k + rank as f64 + 1.0);
            *fused_scores.entry(result.id.clone()).or_insert(0.0) += contribution;
            best_by_id
                .entry(result.id.clone())
                .and_modify(|existing| {
                    if result.score > existing.score {
                        *existing = result.clone();
                    }
                })
                .or_insert_with(|| result.clone());
        }
    }

    let mut merged: Vec<SearchResult> = best_by_id
        .into_iter()
        .map(|(id, mut result)| {
            result.score = fused_scores.get(&id).copied().unwrap_or(0.0);
            result.strategy = "fused".to_string();
            result
        })
        .collect();

    merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    merged
}

/// Linear combination of per-strategy scores, an alternative to RRF when
/// callers want explicit weights instead of rank-based fusion.
pub fn linear_combination(result_lists: &[(Vec<SearchResult>, f64)]) -> Vec<SearchResult> {
    let mut fused_scores: BTreeMap<String, f64> = BTreeMap::new();
    let mut best_by_id: BTreeMap<String, SearchResult> = BTreeMap::new();

    for (list, weight) in result_lists {
        for result in list {
            *fused_scores.entry(result.id.clone()).or_insert(0.0) += result.score * weight;
            best_by_id.entry(result.id.clone()).or_insert_with(|| result.clone());
        }
    }

    let mut merged: Vec<SearchResult> = best_by_id
        .into_iter()
        .map(|(id, mut result)| {
            result.score = fused_scores.get(&id).copied().unwrap_or(0.0).clamp(0.0, 1.0);
            result.strategy = "fused".to_string();
            result
        })
        .collect();
    merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchResultMetadata;
    use chrono::Utc;

    fn result(id: &str, score: f64) -> SearchResult {
        SearchResult {
            id: id.to_string(),
            content: "x".into(),
            score,
            strategy: "test".into(),
            timestamp: Utc::now(),
            metadata: SearchResultMetadata {
                summary: "x".into(),
                category: "general".into(),
                importance_score: 0.5,
                memory_type: "conversational".into(),
                created_at: Utc::now(),
            },
        }
    }

    #[test]
    fn rrf_favors_ids_ranked_highly_in_multiple_lists() {
        let list_a = vec![result("a", 0.9), result("b", 0.8)];
        let list_b = vec![result("b", 0.7), result("a", 0.6)];
        let fused = reciprocal_rank_fusion(&[list_a, list_b], 60.0);
        assert_eq!(fused[0].id, "a");
    }

    #[test]
    fn rrf_deduplicates_ids_across_lists() {
        let list_a = vec![result("a", 0.9)];
        let list_b = vec![result("a", 0.5)];
        let fused = reciprocal_rank_fusion(&[list_a, list_b], 60.0);
        assert_eq!(fused.len(), 1);
    }
}
