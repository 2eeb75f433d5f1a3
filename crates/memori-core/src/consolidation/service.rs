//! Consolidation Service
//!
//! Business policy over the Consolidation Repo: confidence scoring,
//! merge/replace/ignore recommendations, eligibility checks, previews,
//! rollback-by-token, and fleet-wide analytics.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::consolidation::repo::{
    generate_data_integrity_hash, CleanupResult, ConsolidateResult, ConsolidationRepo,
    ConsolidationStatistics, PreConsolidationValidation, Snapshot,
};
use crate::error::{MemoriError, Result};
use crate::storage::Store;

/// Below this content length, `lengthFactor` tapers the raw similarity
/// down, since short strings match lexically far too easily.
const LENGTH_FACTOR_FLOOR_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsolidationRecommendation {
    Merge,
    Replace,
    Ignore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedDuplicate {
    pub id: String,
    pub similarity: f64,
    pub confidence: f64,
    pub consolidation_recommendation: ConsolidationRecommendation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityCheck {
    pub eligible: bool,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationPreview {
    pub primary_id: String,
    pub duplicate_ids: Vec<String>,
    pub fields_that_would_change: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackOutcome {
    pub success: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationAnalytics {
    pub statistics: ConsolidationStatistics,
    pub duplicate_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthRating {
    Healthy,
    NeedsAttention,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationRecommendation {
    pub health: HealthRating,
    pub next_maintenance_at: DateTime<Utc>,
    pub notes: Vec<String>,
}

/// After a successful `consolidate`, the hash is kept alongside the
/// primary's id and duplicate set so `rollback_consolidation` can be
/// handed a bare token instead of a full snapshot.
struct RollbackRecord {
    primary_id: String,
    duplicate_ids: Vec<String>,
    snapshot: Snapshot,
    data_integrity_hash: String,
}

pub struct ConsolidationService<'a> {
    repo: ConsolidationRepo<'a>,
    rollback_tokens: std::sync::Mutex<std::collections::BTreeMap<String, RollbackRecord>>,
}

impl<'a> ConsolidationService<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { repo: ConsolidationRepo::new(store), rollback_tokens: std::sync::Mutex::new(std::collections::BTreeMap::new()) }
    }

    /// Runs duplicate candidate search, then layers confidence + policy
    /// recommendation on top of the repo's raw similarity stub.
    pub fn detect_duplicate_memories(&self, content: &str, threshold: f64, namespace: &str) -> Result<Vec<DetectedDuplicate>> {
        let candidates = self.repo.find_duplicate_candidates(content, threshold, namespace)?;
        let length_factor = Self::length_factor(content.chars().count());

        Ok(candidates
            .into_iter()
            .map(|candidate| {
                let confidence = (candidate.similarity * length_factor).min(1.0);
                let recommendation = Self::recommend(confidence);
                DetectedDuplicate {
                    id: candidate.memory.id,
                    similarity: candidate.similarity,
                    confidence,
                    consolidation_recommendation: recommendation,
                }
            })
            .collect())
    }

    /// Content below the floor length gets a linearly tapered factor;
    /// at or above the floor, a full factor of 1.0.
    fn length_factor(len_chars: usize) -> f64 {
        if len_chars >= LENGTH_FACTOR_FLOOR_CHARS {
            1.0
        } else {
            0.5 + 0.5 * (len_chars as f64 / LENGTH_FACTOR_FLOOR_CHARS as f64)
        }
    }

    fn recommend(confidence: f64) -> ConsolidationRecommendation {
        if confidence >= 0.9 {
            ConsolidationRecommendation::Merge
        } else if confidence >= 0.7 {
            ConsolidationRecommendation::Replace
        } else {
            ConsolidationRecommendation::Ignore
        }
    }

    pub fn validate_consolidation_eligibility(&self, primary_id: &str, duplicate_ids: &[String], namespace: &str) -> Result<EligibilityCheck> {
        let validation = self.repo.validate_pre_consolidation(primary_id, duplicate_ids, namespace)?;
        Ok(EligibilityCheck { eligible: validation.is_valid, reasons: validation.errors })
    }

    /// Dry-run diff: reports what would change without touching the Store.
    pub fn preview_consolidation(&self, primary_id: &str, duplicate_ids: &[String], namespace: &str) -> Result<ConsolidationPreview> {
        let mut fields = vec!["duplicateOf".to_string()];
        if !duplicate_ids.is_empty() {
            fields.push("relatedMemoriesJson".to_string());
            fields.push("consolidationTimestamp".to_string());
        }
        let _ = namespace;
        Ok(ConsolidationPreview {
            primary_id: primary_id.to_string(),
            duplicate_ids: duplicate_ids.to_vec(),
            fields_that_would_change: fields,
        })
    }

    /// Validates eligibility, consolidates via the repo, and remembers a
    /// rollback token keyed on the resulting integrity hash.
    pub fn consolidate_memories(&self, primary_id: &str, duplicate_ids: &[String], namespace: &str) -> Result<ConsolidateResult> {
        let eligibility = self.validate_consolidation_eligibility(primary_id, duplicate_ids, namespace)?;
        if !eligibility.eligible {
            return Ok(ConsolidateResult {
                success: false,
                consolidated_count: 0,
                data_integrity_hash: None,
                errors: eligibility.reasons,
            });
        }

        let snapshot = self.repo.backup(
            &[&[primary_id.to_string()][..], duplicate_ids].concat(),
            namespace,
        )?;
        let result = self.repo.consolidate(primary_id, duplicate_ids, namespace)?;
        tracing::info!(
            primary_id,
            duplicate_count = duplicate_ids.len(),
            success = result.success,
            "consolidation complete"
        );

        if let Some(hash) = &result.data_integrity_hash {
            if let Ok(mut tokens) = self.rollback_tokens.lock() {
                tokens.insert(
                    hash.clone(),
                    RollbackRecord {
                        primary_id: primary_id.to_string(),
                        duplicate_ids: duplicate_ids.to_vec(),
                        snapshot,
                        data_integrity_hash: hash.clone(),
                    },
                );
            }
        }

        Ok(result)
    }

    /// Rolls a consolidation back by its integrity-hash token, refusing if
    /// the token doesn't match any known consolidation.
    pub fn rollback_consolidation(&self, primary_id: &str, rollback_token: &str, namespace: &str) -> Result<RollbackOutcome> {
        let record = {
            let tokens = self.rollback_tokens.lock().map_err(|_| MemoriError::LockPoisoned("rollback token table".into()))?;
            tokens.get(rollback_token).map(|r| (r.primary_id.clone(), r.duplicate_ids.clone(), r.snapshot.clone(), r.data_integrity_hash.clone()))
        };

        let Some((recorded_primary, duplicate_ids, snapshot, hash)) = record else {
            return Ok(RollbackOutcome { success: false, reason: Some("unknown rollback token".to_string()) });
        };

        if recorded_primary != primary_id {
            return Ok(RollbackOutcome { success: false, reason: Some("token does not match this primary".to_string()) });
        }

        self.repo.rollback(primary_id, &duplicate_ids, &snapshot, namespace)?;

        if let Ok(mut tokens) = self.rollback_tokens.lock() {
            tokens.remove(&hash);
        }

        tracing::info!(primary_id, "consolidation rolled back");
        Ok(RollbackOutcome { success: true, reason: None })
    }

    /// Deletes consolidated duplicates older than `older_than_days`. The
    /// only permitted delete path per the data model's lifecycle rule;
    /// never touches primaries.
    pub fn cleanup_consolidated_memories(&self, older_than_days: i64, dry_run: bool, namespace: &str) -> Result<CleanupResult> {
        let result = self.repo.cleanup(older_than_days, dry_run, namespace)?;
        if !result.dry_run {
            tracing::info!(deleted_count = result.deleted_count, namespace, "consolidation cleanup ran");
        }
        Ok(result)
    }

    pub fn get_consolidation_analytics(&self, namespace: &str) -> Result<ConsolidationAnalytics> {
        let statistics = self.repo.get_statistics(namespace)?;
        let duplicate_ratio = if statistics.total_memories > 0 {
            statistics.duplicate_count as f64 / statistics.total_memories as f64
        } else {
            0.0
        };
        Ok(ConsolidationAnalytics { statistics, duplicate_ratio })
    }

    /// Health rating and suggested next-maintenance instant derived from
    /// the duplicate ratio: below 10% is healthy, below 30% needs
    /// attention soon, above that is critical and due immediately.
    pub fn get_optimization_recommendations(&self, namespace: &str) -> Result<OptimizationRecommendation> {
        let analytics = self.get_consolidation_analytics(namespace)?;
        let (health, delay, note) = if analytics.duplicate_ratio < 0.1 {
            (HealthRating::Healthy, ChronoDuration::days(30), "duplicate ratio within normal bounds")
        } else if analytics.duplicate_ratio < 0.3 {
            (HealthRating::NeedsAttention, ChronoDuration::days(7), "duplicate ratio elevated, schedule cleanup")
        } else {
            (HealthRating::Critical, ChronoDuration::hours(1), "duplicate ratio high, run cleanup promptly")
        };

        Ok(OptimizationRecommendation {
            health,
            next_maintenance_at: Utc::now() + delay,
            notes: vec![note.to_string()],
        })
    }
}

/// Exposed for tests and callers that want to recompute a hash without
/// going through the repo (e.g. verifying a stored token out-of-band).
pub fn verify_integrity_hash(primary_id: &str, duplicate_ids: &[String], timestamp: DateTime<Utc>, expected: &str) -> bool {
    generate_data_integrity_hash(primary_id, duplicate_ids, timestamp) == expected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Classification, Importance, Memory, RetentionType};
    use std::collections::BTreeMap;

    fn sample_memory(namespace: &str, content: &str) -> Memory {
        let now = Utc::now();
        Memory {
            id: uuid::Uuid::new_v4().to_string(),
            namespace: namespace.to_string(),
            searchable_content: content.to_string(),
            summary: content.to_string(),
            classification: Classification::Conversational,
            importance: Importance::Medium,
            importance_score: 0.5,
            confidence_score: 0.5,
            topic: None,
            entities: vec![],
            keywords: vec![],
            category_primary: "general".into(),
            classification_reason: "test".into(),
            retention_type: RetentionType::LongTerm,
            extraction_timestamp: now,
            created_at: now,
            duplicate_of: None,
            related_memories: vec![],
            consolidation_timestamp: None,
            processed_data: BTreeMap::new(),
        }
    }

    #[test]
    fn detect_duplicate_memories_returns_bounded_confidence() {
        let store = Store::open_in_memory().expect("open");
        let m1 = sample_memory("t", "TypeScript provides type safety");
        let m2 = sample_memory("t", "JavaScript is for the web");
        let m3 = sample_memory("t", "React is a UI framework");
        store.insert(&m1).unwrap();
        store.insert(&m2).unwrap();
        store.insert(&m3).unwrap();

        let service = ConsolidationService::new(&store);
        let detected = service
            .detect_duplicate_memories("TypeScript and JavaScript power the web", 0.5, "t")
            .expect("detect");

        assert!(detected.len() >= 2);
        for d in &detected {
            assert!(d.confidence >= 0.0 && d.confidence <= 1.0);
        }
    }

    #[test]
    fn consolidate_then_rollback_via_token_round_trips() {
        let store = Store::open_in_memory().expect("open");
        let m1 = sample_memory("t", "primary memory");
        let m2 = sample_memory("t", "duplicate memory");
        store.insert(&m1).unwrap();
        store.insert(&m2).unwrap();

        let service = ConsolidationService::new(&store);
        let result = service.consolidate_memories(&m1.id, &[m2.id.clone()], "t").expect("consolidate");
        assert!(result.success);
        let token = result.data_integrity_hash.expect("hash present");

        let outcome = service.rollback_consolidation(&m1.id, &token, "t").expect("rollback");
        assert!(outcome.success);

        let second_attempt = service.rollback_consolidation(&m1.id, &token, "t").expect("second rollback call");
        assert!(!second_attempt.success);
    }

    #[test]
    fn optimization_recommendations_escalate_with_duplicate_ratio() {
        let store = Store::open_in_memory().expect("open");
        for i in 0..10 {
            let mut m = sample_memory("t", &format!("memory number {i}"));
            if i < 5 {
                m.duplicate_of = Some("some-primary".to_string());
            }
            store.insert(&m).unwrap();
        }

        let service = ConsolidationService::new(&store);
        let recommendation = service.get_optimization_recommendations("t").expect("recommendations");
        assert_eq!(recommendation.health, HealthRating::Critical);
    }
}
