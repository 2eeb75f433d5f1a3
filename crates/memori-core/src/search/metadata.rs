//! Metadata Strategy
//!
//! A search strategy specialized for the Memory's JSON `processed_data`
//! column: resolves filter fields (explicit + discovered from free text),
//! builds a parameterized SQL predicate, scores and optionally aggregates
//! the rows, and caches results with a short TTL.

use lru::LruCache;
use regex::Regex;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::MetadataStrategyConfig;
use crate::error::Result;
use crate::memory::Memory;
use crate::search::{SearchQuery, SearchResult, Strategy};
use crate::storage::Store;

const CACHE_TTL: Duration = Duration::from_secs(300);
const CACHE_CAPACITY: usize = 256;

/// Per-query metadata predicates and their aggregation/validation policy.
#[derive(Debug, Clone, Default)]
pub struct MetadataFilters {
    pub fields: Vec<MetadataField>,
    pub group_by: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MetadataField {
    pub key: String,
    pub op: MetadataOp,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Contains,
    In,
    Exists,
    Type,
}

/// A grouped/aggregated synthetic result produced when `group_by` is set.
#[derive(Debug, Clone)]
pub struct AggregatedGroup {
    pub group_key: String,
    pub count: usize,
    pub avg_score: f64,
    pub min_score: f64,
    pub max_score: f64,
}

struct CacheEntry {
    inserted_at: Instant,
    results: Vec<SearchResult>,
}

/// The Metadata Strategy: resolve → build SQL → execute → score →
/// validate → aggregate → cache.
pub struct MetadataStrategy {
    config: MetadataStrategyConfig,
    cache: Mutex<LruCache<String, CacheEntry>>,
}

impl MetadataStrategy {
    pub fn new(config: MetadataStrategyConfig) -> Self {
        Self {
            config,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_CAPACITY).expect("CACHE_CAPACITY is non-zero"),
            )),
        }
    }

    /// Runs the full pipeline and returns either scored rows or, when
    /// `group_by` is set, one synthetic result per group (encoded into the
    /// same `SearchResult` shape via its `summary`).
    pub fn search(&self, store: &Store, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        let cache_key = Self::cache_key(query);
        if self.config.performance.enable_result_caching {
            if let Some(hit) = self.cached(&cache_key) {
                tracing::debug!(namespace = %query.namespace, "metadata strategy cache hit");
                return Ok(hit);
            }
        }
        tracing::trace!(namespace = %query.namespace, text = %query.text, "metadata strategy pipeline start");

        let fields = self.resolve_fields(query);
        let (where_sql, params) = self.build_predicate(&fields, query);
        let rows = store
            .find_by_predicate(&query.namespace, &where_sql, &params)
            .map_err(|e| e)?;

        let mut scored: Vec<(Memory, f64)> = rows
            .into_iter()
            .map(|row| {
                let score = self.score(&row, &fields, &query.text);
                (row, score)
            })
            .collect();

        if self.config.validation.strict_validation {
            scored.retain(|(row, _)| self.passes_validation(row, &fields));
        }

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let results: Vec<SearchResult> = scored
            .iter()
            .skip(query.offset)
            .take(query.limit)
            .map(|(row, score)| SearchResult::from_memory(row, *score, "metadata"))
            .collect();

        let final_results = if self.config.aggregation.enable_aggregation {
            if let Some(filters) = &query.metadata_filters {
                if !filters.group_by.is_empty() {
                    self.aggregate(&scored, &filters.group_by)
                } else {
                    results
                }
            } else {
                results
            }
        } else {
            results
        };

        if self.config.performance.enable_result_caching {
            self.store_cache(cache_key, final_results.clone());
        }

        Ok(final_results)
    }

    /// Concatenates explicit fields with ones discovered from free text via
    /// `(metadata|meta).<key>=<val>` and `(field|property):<key>=<val>`.
    fn resolve_fields(&self, query: &SearchQuery) -> Vec<MetadataField> {
        let mut fields: Vec<MetadataField> = query
            .metadata_filters
            .as_ref()
            .map(|f| f.fields.clone())
            .unwrap_or_default();

        if self.config.fields.enable_field_discovery {
            fields.extend(discover_fields(&query.text));
        }
        fields
    }

    fn build_predicate(&self, fields: &[MetadataField], query: &SearchQuery) -> (String, Vec<rusqlite::types::Value>) {
        let mut clauses = Vec::new();
        let mut params = Vec::new();

        for field in fields {
            let path = json_path(&field.key, self.config.fields.enable_nested_access, self.config.fields.max_depth);
            let column = format!("json_extract(processed_data,'{path}')");
            match field.op {
                MetadataOp::Eq => {
                    clauses.push(format!("{column} = ?"));
                    params.push(rusqlite::types::Value::Text(field.value.clone()));
                }
                MetadataOp::Ne => {
                    clauses.push(format!("{column} != ?"));
                    params.push(rusqlite::types::Value::Text(field.value.clone()));
                }
                MetadataOp::Gt | MetadataOp::Ge | MetadataOp::Lt | MetadataOp::Le => {
                    let op_sql = match field.op {
                        MetadataOp::Gt => ">",
                        MetadataOp::Ge => ">=",
                        MetadataOp::Lt => "<",
                        MetadataOp::Le => "<=",
                        _ => unreachable!(),
                    };
                    clauses.push(format!("CAST({column} AS REAL) {op_sql} ?"));
                    params.push(rusqlite::types::Value::Real(field.value.parse().unwrap_or(0.0)));
                }
                MetadataOp::Contains => {
                    clauses.push(format!("{column} LIKE ?"));
                    params.push(rusqlite::types::Value::Text(format!("%{}%", field.value)));
                }
                MetadataOp::In => {
                    let items: Vec<&str> = field.value.split(',').collect();
                    let placeholders = vec!["?"; items.len()].join(",");
                    clauses.push(format!("{column} IN ({placeholders})"));
                    for item in items {
                        params.push(rusqlite::types::Value::Text(item.to_string()));
                    }
                }
                MetadataOp::Exists => {
                    clauses.push(format!("{column} IS NOT NULL"));
                }
                MetadataOp::Type => {
                    clauses.push(format!("json_type(processed_data,'{path}') = ?"));
                    params.push(rusqlite::types::Value::Text(field.value.clone()));
                }
            }
        }

        for term in query.text.split_whitespace().filter(|t| !t.contains(':') && !t.contains('.')) {
            clauses.push("(searchable_content LIKE ? OR summary LIKE ?)".to_string());
            let pattern = rusqlite::types::Value::Text(format!("%{term}%"));
            params.push(pattern.clone());
            params.push(pattern);
        }

        if clauses.is_empty() {
            ("1=1".to_string(), params)
        } else {
            (clauses.join(" AND "), params)
        }
    }

    fn score(&self, memory: &Memory, fields: &[MetadataField], query_text: &str) -> f64 {
        let mut score = 0.3;
        let matched_fields = fields
            .iter()
            .filter(|f| memory.metadata_path(&f.key).is_some())
            .count();
        score += 0.2 * matched_fields.min(1) as f64;
        if !query_text.trim().is_empty()
            && (memory.searchable_content.to_lowercase().contains(&query_text.to_lowercase())
                || memory.summary.to_lowercase().contains(&query_text.to_lowercase()))
        {
            score += 0.2;
        }
        score.clamp(0.0, 1.0)
    }

    fn passes_validation(&self, memory: &Memory, fields: &[MetadataField]) -> bool {
        for field in fields {
            if memory.metadata_path(&field.key).is_none() {
                if self.config.validation.fail_on_invalid_metadata {
                    return false;
                }
            }
        }
        true
    }

    fn aggregate(&self, scored: &[(Memory, f64)], group_by: &[String]) -> Vec<SearchResult> {
        let mut representative: BTreeMap<String, Memory> = BTreeMap::new();
        for (memory, _) in scored {
            representative.entry(Self::group_key(memory, group_by)).or_insert_with(|| memory.clone());
        }

        self.aggregate_groups(scored, group_by)
            .into_iter()
            .map(|group| {
                let memory = representative.get(&group.group_key).expect("representative exists");
                let mut result = SearchResult::from_memory(memory, group.avg_score, "metadata_aggregate");
                result.content = format!(
                    "group={} count={} avg={:.4} min={:.4} max={:.4}",
                    group.group_key, group.count, group.avg_score, group.min_score, group.max_score
                );
                result
            })
            .collect()
    }

    /// Groups scored rows by `group_by` and computes `{count, avg, min, max}`
    /// per group, per the pipeline's aggregation step.
    fn aggregate_groups(&self, scored: &[(Memory, f64)], group_by: &[String]) -> Vec<AggregatedGroup> {
        let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for (memory, score) in scored {
            groups.entry(Self::group_key(memory, group_by)).or_default().push(*score);
        }

        groups
            .into_iter()
            .map(|(group_key, scores)| {
                let count = scores.len();
                let sum: f64 = scores.iter().sum();
                AggregatedGroup {
                    group_key,
                    count,
                    avg_score: sum / count as f64,
                    min_score: scores.iter().cloned().fold(f64::INFINITY, f64::min),
                    max_score: scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
                }
            })
            .collect()
    }

    fn group_key(memory: &Memory, group_by: &[String]) -> String {
        group_by
            .iter()
            .map(|field| {
                memory
                    .metadata_path(field)
                    .and_then(|v| v.as_str_coerced())
                    .unwrap_or_else(|| "null".to_string())
            })
            .collect::<Vec<String>>()
            .join("|")
    }

    fn cache_key(query: &SearchQuery) -> String {
        let filters_repr = query
            .metadata_filters
            .as_ref()
            .map(|f| format!("{:?}|{:?}", f.fields.iter().map(|fld| (&fld.key, fld.value.clone())).collect::<Vec<_>>(), f.group_by))
            .unwrap_or_default();
        format!("{}::{}::{}::{}::{}", query.namespace, query.text, filters_repr, query.limit, query.offset)
    }

    fn cached(&self, key: &str) -> Option<Vec<SearchResult>> {
        let mut cache = self.cache.lock().ok()?;
        match cache.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < CACHE_TTL => Some(entry.results.clone()),
            Some(_) => {
                cache.pop(key);
                None
            }
            None => None,
        }
    }

    fn store_cache(&self, key: String, results: Vec<SearchResult>) {
        if let Ok(mut cache) = self.cache.lock() {
            let expired: Vec<String> = cache
                .iter()
                .filter(|(_, entry)| entry.inserted_at.elapsed() >= CACHE_TTL)
                .map(|(k, _)| k.clone())
                .collect();
            for k in expired {
                cache.pop(&k);
            }
            cache.put(key, CacheEntry { inserted_at: Instant::now(), results });
        }
    }
}

impl Strategy for MetadataStrategy {
    fn name(&self) -> &str {
        "metadata"
    }

    fn can_handle(&self, query: &SearchQuery) -> bool {
        query.metadata_filters.is_some()
    }

    fn search(&self, store: &Store, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        self.search(store, query)
    }
}

fn json_path(key: &str, nested_allowed: bool, max_depth: u8) -> String {
    let segments: Vec<&str> = key.split('.').collect();
    if segments.len() > 1 && !nested_allowed {
        return "$.__rejected_nested_path".to_string();
    }
    if segments.len() > max_depth as usize {
        return "$.__rejected_max_depth".to_string();
    }
    let re = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex");
    if segments.iter().all(|s| re.is_match(s)) {
        format!("$.{}", segments.join(".$."))
    } else {
        "$.__rejected_invalid_field".to_string()
    }
}

/// Scans free text for `(metadata|meta).<key>=<val>` and
/// `(field|property):<key>=<val>` patterns.
fn discover_fields(text: &str) -> Vec<MetadataField> {
    let dotted = Regex::new(r"(?:metadata|meta)\.([A-Za-z_][A-Za-z0-9_.]*)=([^\s]+)").expect("static regex");
    let colon = Regex::new(r"(?:field|property):([A-Za-z_][A-Za-z0-9_.]*)=([^\s]+)").expect("static regex");

    let mut fields = Vec::new();
    for caps in dotted.captures_iter(text) {
        fields.push(MetadataField { key: caps[1].to_string(), op: MetadataOp::Eq, value: caps[2].to_string() });
    }
    for caps in colon.captures_iter(text) {
        fields.push(MetadataField { key: caps[1].to_string(), op: MetadataOp::Eq, value: caps[2].to_string() });
    }
    fields
}
