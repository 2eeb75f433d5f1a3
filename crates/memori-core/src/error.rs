//! Error taxonomy
//!
//! A single tagged enum rather than a hierarchy of exception types, per the
//! error kinds table in the design spec: validation, parse, search, timeout,
//! consolidation, and classifier-fallback failures each carry the context
//! their policy requires.

use std::fmt;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, MemoriError>;

/// The engine's error taxonomy.
///
/// Kept flat and tagged (never encoded as an inheritance hierarchy): each
/// variant carries exactly the context its handling policy needs.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum MemoriError {
    /// Sanitization or a data-model invariant was violated.
    #[error("validation failed: {rule} on field '{field}' (value: {value})")]
    Validation {
        field: String,
        value: String,
        rule: String,
    },

    /// A filter expression could not be parsed.
    #[error("parse error at position {position}: {message} (near '{fragment}')")]
    Parse {
        message: String,
        fragment: String,
        position: usize,
    },

    /// A search strategy failed against the underlying store.
    #[error("search error in strategy '{strategy}': {message} (sql: {sql_fragment})")]
    Search {
        strategy: String,
        message: String,
        sql_fragment: String,
    },

    /// A deadline passed before the operation completed.
    #[error("operation timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// A consolidation pipeline step failed.
    #[error("consolidation failed: {message}")]
    ConsolidationFailed { message: String },

    /// The classifier returned output that could not be parsed; the caller
    /// still receives a deterministic fallback `Memory`, this variant is
    /// only logged, never surfaced as a hard failure.
    #[error("classifier fallback: {message}")]
    FallbackClassification { message: String },

    /// The underlying SQLite layer returned an error not otherwise wrapped.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A background mutex guarding shared state was poisoned by a panicking
    /// holder.
    #[error("internal lock poisoned: {0}")]
    LockPoisoned(String),

    /// JSON (de)serialization failure at a storage boundary.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No row exists for the given id/namespace pair.
    #[error("not found: {0}")]
    NotFound(String),
}

impl MemoriError {
    pub fn validation(field: impl Into<String>, value: impl fmt::Display, rule: impl Into<String>) -> Self {
        MemoriError::Validation {
            field: field.into(),
            value: value.to_string(),
            rule: rule.into(),
        }
    }

    pub fn parse(message: impl Into<String>, fragment: impl Into<String>, position: usize) -> Self {
        MemoriError::Parse {
            message: message.into(),
            fragment: fragment.into(),
            position,
        }
    }

    /// Wraps a search failure, truncating the SQL fragment to 500 chars per
    /// the error-handling policy.
    pub fn search(strategy: impl Into<String>, message: impl Into<String>, sql_fragment: &str) -> Self {
        let truncated: String = sql_fragment.chars().take(500).collect();
        MemoriError::Search {
            strategy: strategy.into(),
            message: message.into(),
            sql_fragment: truncated,
        }
    }
}
