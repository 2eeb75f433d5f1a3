//! Classifier — external-adjacent component the Capture layer calls.
//!
//! The core treats classification as polymorphic over one capability,
//! `classify`; concrete implementations vary by LLM provider and live
//! outside this crate. The only contract the core depends on is the shape
//! of `ProcessedMemory` and the fixed classification/importance/retention
//! enumerations.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::memory::{Classification, Importance, JsonValue, RetentionType};

/// The output a Classifier must produce for one exchange — everything a
/// `Memory` row needs except the bookkeeping columns the Store fills in
/// itself (id, timestamps, duplicate/consolidation state).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedMemory {
    pub searchable_content: String,
    pub summary: String,
    pub classification: Classification,
    pub importance: Importance,
    pub importance_score: f64,
    pub confidence_score: f64,
    pub topic: Option<String>,
    pub entities: Vec<String>,
    pub keywords: Vec<String>,
    pub category_primary: String,
    pub classification_reason: String,
    pub retention_type: RetentionType,
    pub processed_data: BTreeMap<String, JsonValue>,
}

/// Context handed to the classifier alongside the raw exchange: the
/// namespace it's scoped to and whatever surrounding chat history the
/// caller thinks is relevant.
#[derive(Debug, Clone, Default)]
pub struct ClassifyContext {
    pub namespace: String,
    pub recent_history: Vec<String>,
}

/// Polymorphic over one capability: turning an exchange into a
/// classified memory. Implementations are provider-specific and live
/// outside the core.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        user_input: &str,
        assistant_output: &str,
        context: &ClassifyContext,
    ) -> Result<ProcessedMemory>;
}

/// The deterministic output used whenever classification fails to parse.
/// Not a `Classifier` in its own right — a pure function any
/// implementation should fall back to on a JSON parse error.
pub fn fallback_processed_memory(user_input: &str) -> ProcessedMemory {
    const SUMMARY_CHARS: usize = 100;
    let summary: String = if user_input.chars().count() > SUMMARY_CHARS {
        format!("{}...", user_input.chars().take(SUMMARY_CHARS).collect::<String>())
    } else {
        user_input.to_string()
    };

    ProcessedMemory {
        searchable_content: user_input.to_string(),
        summary,
        classification: Classification::Conversational,
        importance: Importance::Medium,
        importance_score: 0.5,
        confidence_score: 0.5,
        topic: None,
        entities: Vec::new(),
        keywords: Vec::new(),
        category_primary: "general".to_string(),
        classification_reason: "Fallback processing due to error".to_string(),
        retention_type: RetentionType::ShortTerm,
        processed_data: BTreeMap::new(),
    }
}

/// A classifier that always returns the deterministic fallback, useful
/// as a null object in tests and as the default when no provider-backed
/// implementation is configured.
pub struct FallbackClassifier;

#[async_trait]
impl Classifier for FallbackClassifier {
    async fn classify(&self, user_input: &str, _assistant_output: &str, _context: &ClassifyContext) -> Result<ProcessedMemory> {
        Ok(fallback_processed_memory(user_input))
    }
}
