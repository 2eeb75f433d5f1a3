//! Consolidation Repository
//!
//! Transactional duplicate/merge operations on the Store, with backup and
//! rollback. Business policy (confidence scoring, recommendations) lives
//! one layer up in the Consolidation Service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::error::{MemoriError, Result};
use crate::memory::Memory;
use crate::storage::Store;

/// A duplicate candidate with the repo's stub similarity score. The
/// Service refines this into a policy-aware confidence.
#[derive(Debug, Clone)]
pub struct DuplicateCandidate {
    pub memory: Memory,
    pub similarity: f64,
}

/// Hard-coded similarity assigned to every lexical match in
/// `find_duplicate_candidates`, a stub the design notes call out as a
/// placeholder for real BM25 ranking.
pub const TOKEN_OVERLAP_STUB_SCORE: f64 = 0.8;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreConsolidationValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidateResult {
    pub success: bool,
    pub consolidated_count: usize,
    pub data_integrity_hash: Option<String>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationStatistics {
    pub total_memories: i64,
    pub duplicate_count: i64,
    pub consolidated_memories: i64,
    pub last_consolidation_activity: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResult {
    pub deleted_count: usize,
    pub dry_run: bool,
}

/// A pre-op snapshot used to restore state on rollback.
pub type Snapshot = BTreeMap<String, Memory>;

pub struct ConsolidationRepo<'a> {
    store: &'a Store,
}

impl<'a> ConsolidationRepo<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Tokenizes `content`, drops tokens of length <= 3, keeps the first 5,
    /// and returns rows in `namespace` whose `searchableContent` matches
    /// any surviving token, scored at or above `threshold`.
    pub fn find_duplicate_candidates(
        &self,
        content: &str,
        threshold: f64,
        namespace: &str,
    ) -> Result<Vec<DuplicateCandidate>> {
        let tokens: Vec<String> = content
            .split_whitespace()
            .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|t| t.len() > 3)
            .take(5)
            .collect();

        if tokens.is_empty() || TOKEN_OVERLAP_STUB_SCORE < threshold {
            return Ok(Vec::new());
        }

        let all = self.store.find_all(namespace)?;
        let candidates = all
            .into_iter()
            .filter(|memory| {
                let lower = memory.searchable_content.to_lowercase();
                tokens.iter().any(|tok| lower.contains(tok.as_str()))
            })
            .map(|memory| DuplicateCandidate { memory, similarity: TOKEN_OVERLAP_STUB_SCORE })
            .filter(|candidate| candidate.similarity >= threshold)
            .collect();

        Ok(candidates)
    }

    /// Validates that both sides of a prospective consolidation exist in
    /// the same namespace, and that the primary isn't listed among its own
    /// duplicates. Never throws; callers branch on `is_valid`.
    pub fn validate_pre_consolidation(
        &self,
        primary_id: &str,
        duplicate_ids: &[String],
        namespace: &str,
    ) -> Result<PreConsolidationValidation> {
        let mut errors = Vec::new();

        match self.store.get_by_id(namespace, primary_id)? {
            Some(primary) if primary.duplicate_of.is_some() => {
                errors.push(format!("primary '{primary_id}' is itself a duplicate"));
            }
            None => errors.push(format!("primary memory '{primary_id}' not found in namespace '{namespace}'")),
            _ => {}
        }

        if duplicate_ids.contains(&primary_id.to_string()) {
            errors.push(format!("duplicate set may not contain the primary id '{primary_id}'"));
        }

        for dup_id in duplicate_ids {
            if self.store.get_by_id(namespace, dup_id)?.is_none() {
                errors.push(format!("duplicate memory '{dup_id}' not found in namespace '{namespace}'"));
            }
        }

        Ok(PreConsolidationValidation { is_valid: errors.is_empty(), errors })
    }

    /// Marks `duplicate_id` as absorbed by `primary_id`.
    pub fn mark_as_duplicate(
        &self,
        duplicate_id: &str,
        primary_id: &str,
        reason: Option<&str>,
        namespace: &str,
    ) -> Result<()> {
        let validation = self.validate_pre_consolidation(primary_id, &[duplicate_id.to_string()], namespace)?;
        if !validation.is_valid {
            return Err(MemoriError::ConsolidationFailed { message: validation.errors.join("; ") });
        }

        self.store.with_transaction(|tx| {
            Store::mark_duplicate_tx(tx, duplicate_id, primary_id)?;
            if let Some(reason) = reason {
                tx.execute(
                    "UPDATE memories SET classification_reason = ?1 WHERE id = ?2",
                    rusqlite::params![reason, duplicate_id],
                )?;
            }
            Ok(())
        })
    }

    /// Consolidates a set of duplicates into `primary_id`, returning a
    /// SHA-256 integrity hash over the canonical descriptor.
    pub fn consolidate(&self, primary_id: &str, duplicate_ids: &[String], namespace: &str) -> Result<ConsolidateResult> {
        let validation = self.validate_pre_consolidation(primary_id, duplicate_ids, namespace)?;
        if !validation.is_valid {
            return Ok(ConsolidateResult {
                success: false,
                consolidated_count: 0,
                data_integrity_hash: None,
                errors: validation.errors,
            });
        }

        let timestamp = Utc::now();
        let hash = generate_data_integrity_hash(primary_id, duplicate_ids, timestamp);

        self.store.with_transaction(|tx| {
            for dup_id in duplicate_ids {
                Store::mark_duplicate_tx(tx, dup_id, primary_id)?;
            }
            Store::set_related_memories_tx(tx, primary_id, duplicate_ids, timestamp)?;
            Ok(())
        })?;

        Ok(ConsolidateResult {
            success: true,
            consolidated_count: duplicate_ids.len(),
            data_integrity_hash: Some(hash),
            errors: Vec::new(),
        })
    }

    pub fn get_statistics(&self, namespace: &str) -> Result<ConsolidationStatistics> {
        let all = self.store.find_all(namespace)?;
        let total_memories = all.len() as i64;
        let duplicate_count = all.iter().filter(|m| m.is_duplicate()).count() as i64;
        let consolidated_memories = all.iter().filter(|m| m.is_consolidated_primary()).count() as i64;
        let last_consolidation_activity = all
            .iter()
            .filter_map(|m| m.consolidation_timestamp)
            .max();

        Ok(ConsolidationStatistics { total_memories, duplicate_count, consolidated_memories, last_consolidation_activity })
    }

    /// Deletes consolidated duplicates (rows absorbed into a primary, i.e.
    /// `is_duplicate()`, never the primary itself) older than
    /// `older_than_days`. `dry_run` returns the count without deleting.
    /// Exposed via `ConsolidationService::cleanup_consolidated_memories`.
    pub(crate) fn cleanup(&self, older_than_days: i64, dry_run: bool, namespace: &str) -> Result<CleanupResult> {
        let cutoff = Utc::now() - chrono::Duration::days(older_than_days);
        let all = self.store.find_all(namespace)?;
        let targets: Vec<String> = all
            .iter()
            .filter(|m| m.is_duplicate() && m.extraction_timestamp < cutoff)
            .map(|m| m.id.clone())
            .collect();

        if !dry_run {
            self.store.delete_many(namespace, &targets)?;
        }

        Ok(CleanupResult { deleted_count: targets.len(), dry_run })
    }

    /// Captures full rows before a risky operation.
    pub fn backup(&self, ids: &[String], namespace: &str) -> Result<Snapshot> {
        let mut snapshot = Snapshot::new();
        for id in ids {
            if let Some(memory) = self.store.get_by_id(namespace, id)? {
                snapshot.insert(id.clone(), memory);
            }
        }
        Ok(snapshot)
    }

    /// Restores `duplicateOf` / `relatedMemoriesJson` / `classificationReason`
    /// atomically from a prior backup. Idempotent: applying twice with the
    /// same snapshot leaves the same state as applying it once.
    pub fn rollback(&self, primary_id: &str, duplicate_ids: &[String], snapshot: &Snapshot, namespace: &str) -> Result<()> {
        let _ = namespace;
        self.store.with_transaction(|tx| {
            if let Some(original) = snapshot.get(primary_id) {
                Store::set_related_memories_tx(
                    tx,
                    primary_id,
                    &original.related_memories,
                    original.consolidation_timestamp.unwrap_or(original.created_at),
                )?;
                tx.execute(
                    "UPDATE memories SET consolidation_timestamp = ?1 WHERE id = ?2",
                    rusqlite::params![original.consolidation_timestamp.map(|t| t.to_rfc3339()), primary_id],
                )?;
            }
            for dup_id in duplicate_ids {
                let original = snapshot.get(dup_id);
                tx.execute(
                    "UPDATE memories SET duplicate_of = ?1, classification_reason = ?2 WHERE id = ?3",
                    rusqlite::params![
                        original.and_then(|m| m.duplicate_of.clone()),
                        original.map(|m| m.classification_reason.clone()).unwrap_or_default(),
                        dup_id,
                    ],
                )?;
            }
            Ok(())
        })
    }
}

/// SHA-256 over `{"primaryId":…, "duplicateIds":[…], "timestamp":<ISO-8601>}`
/// with keys in that exact order, lowercase hex encoded.
pub fn generate_data_integrity_hash(primary_id: &str, duplicate_ids: &[String], timestamp: DateTime<Utc>) -> String {
    let descriptor = format!(
        "{{\"primaryId\":{},\"duplicateIds\":{},\"timestamp\":{}}}",
        serde_json::to_string(primary_id).unwrap_or_default(),
        serde_json::to_string(duplicate_ids).unwrap_or_default(),
        serde_json::to_string(&timestamp.to_rfc3339()).unwrap_or_default(),
    );
    let mut hasher = Sha256::new();
    hasher.update(descriptor.as_bytes());
    format!("{:x}", hasher.finalize())
}
