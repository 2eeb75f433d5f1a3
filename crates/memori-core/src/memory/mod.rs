//! Memory module — the central persisted entity and its enumerations.
//!
//! A `Memory` is a single classified exchange captured from a provider call,
//! or inserted directly. All queries and writes are scoped to exactly one
//! namespace.

mod value;

pub use value::JsonValue;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// ENUMERATIONS
// ============================================================================

/// Classification bucket assigned by the classifier.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Essential,
    Contextual,
    #[default]
    Conversational,
    Reference,
    Personal,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Essential => "essential",
            Classification::Contextual => "contextual",
            Classification::Conversational => "conversational",
            Classification::Reference => "reference",
            Classification::Personal => "personal",
        }
    }

    /// Parses a classification, normalizing any-case input to the
    /// canonical lowercase enumeration.
    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "essential" => Some(Classification::Essential),
            "contextual" => Some(Classification::Contextual),
            "conversational" => Some(Classification::Conversational),
            "reference" => Some(Classification::Reference),
            "personal" => Some(Classification::Personal),
            _ => None,
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Classification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Classification::parse_name(s).ok_or_else(|| format!("unknown classification: {s}"))
    }
}

/// Importance bucket assigned by the classifier.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl Importance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Importance::Critical => "critical",
            Importance::High => "high",
            Importance::Medium => "medium",
            Importance::Low => "low",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "critical" => Some(Importance::Critical),
            "high" => Some(Importance::High),
            "medium" => Some(Importance::Medium),
            "low" => Some(Importance::Low),
            _ => None,
        }
    }
}

impl std::fmt::Display for Importance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Importance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Importance::parse_name(s).ok_or_else(|| format!("unknown importance: {s}"))
    }
}

/// Whether a memory is retained briefly or indefinitely.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetentionType {
    ShortTerm,
    #[default]
    LongTerm,
}

impl RetentionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetentionType::ShortTerm => "short_term",
            RetentionType::LongTerm => "long_term",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "short_term" => Some(RetentionType::ShortTerm),
            "long_term" => Some(RetentionType::LongTerm),
            _ => None,
        }
    }
}

impl std::fmt::Display for RetentionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RetentionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RetentionType::parse_name(s).ok_or_else(|| format!("unknown retention type: {s}"))
    }
}

// ============================================================================
// MEMORY
// ============================================================================

/// The central persisted entity: a single classified exchange.
///
/// The Store is the only component that mutates a row's `duplicate_of` /
/// `related_memories` pair; everything else holds transient references by
/// id. A memory is either a duplicate (`duplicate_of` set, `related_memories`
/// empty) or a primary (the reverse), never both.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    pub id: String,
    pub namespace: String,
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
    pub extraction_timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,

    /// Set when this row was absorbed into another memory during
    /// consolidation. Mutually exclusive with a non-empty `related_memories`.
    pub duplicate_of: Option<String>,
    /// Populated on a primary memory after `consolidate` — ids of the
    /// duplicates it absorbed.
    pub related_memories: Vec<String>,
    /// Set whenever this memory becomes a primary. Tracked as its own
    /// column rather than reusing `extraction_timestamp` as a proxy for
    /// "last consolidation activity".
    pub consolidation_timestamp: Option<DateTime<Utc>>,

    /// Free-form metadata, keys unique, values arbitrary JSON.
    pub processed_data: BTreeMap<String, JsonValue>,
}

impl Memory {
    /// True if this row is a duplicate absorbed by another memory.
    pub fn is_duplicate(&self) -> bool {
        self.duplicate_of.is_some()
    }

    /// True if this row is a primary that has absorbed at least one
    /// duplicate.
    pub fn is_consolidated_primary(&self) -> bool {
        !self.related_memories.is_empty()
    }

    /// Looks up a dotted metadata path, returning `None` for an unresolved
    /// segment (the "undefined" comparator state the filter executor
    /// treats as unequal to everything except `null`).
    pub fn metadata_path(&self, path: &str) -> Option<&JsonValue> {
        let mut segments = path.splitn(2, '.');
        let head = segments.next()?;
        let value = self.processed_data.get(head)?;
        match segments.next() {
            Some(rest) => value.get_path(rest),
            None => Some(value),
        }
    }
}

/// A row backing the Capture layer's chat-history write, capped at 500
/// chars for the user turn and 2000 for the assistant turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistory {
    pub id: String,
    pub namespace: String,
    pub user_message: String,
    pub assistant_message: String,
    pub created_at: DateTime<Utc>,
}

impl ChatHistory {
    pub const USER_CAP: usize = 500;
    pub const ASSISTANT_CAP: usize = 2000;

    pub fn new(namespace: impl Into<String>, user_message: &str, assistant_message: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            namespace: namespace.into(),
            user_message: truncate_chars(user_message, Self::USER_CAP),
            assistant_message: truncate_chars(assistant_message, Self::ASSISTANT_CAP),
            created_at: Utc::now(),
        }
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
