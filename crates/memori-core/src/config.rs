//! Configuration surfaces
//!
//! Plain, `serde`-deserializable structs with documented defaults, the same
//! shape the teacher crate uses for `HybridSearchConfig` / `VectorIndexConfig`.

use serde::{Deserialize, Serialize};

/// Field-path handling options for the Metadata Strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldsConfig {
    pub enable_nested_access: bool,
    pub max_depth: u8,
    pub enable_type_validation: bool,
    pub enable_field_discovery: bool,
}

impl Default for FieldsConfig {
    fn default() -> Self {
        Self {
            enable_nested_access: true,
            max_depth: 5,
            enable_type_validation: true,
            enable_field_discovery: true,
        }
    }
}

/// Group-aggregation options for the Metadata Strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationConfig {
    pub enable_aggregation: bool,
    pub max_group_fields: u8,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            enable_aggregation: false,
            max_group_fields: 3,
        }
    }
}

/// Validation policy for matched metadata rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationConfig {
    pub strict_validation: bool,
    pub enable_custom_validators: bool,
    pub fail_on_invalid_metadata: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            strict_validation: false,
            enable_custom_validators: false,
            fail_on_invalid_metadata: false,
        }
    }
}

/// Performance-related knobs for the Metadata Strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceConfig {
    pub enable_query_optimization: bool,
    pub enable_result_caching: bool,
    pub max_execution_time_ms: u32,
    pub batch_size: u16,
    pub cache_size: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            enable_query_optimization: true,
            enable_result_caching: true,
            max_execution_time_ms: 5_000,
            batch_size: 100,
            cache_size: 256,
        }
    }
}

/// The full Metadata Strategy configuration recognized by `spec.md` §6.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataStrategyConfig {
    #[serde(default)]
    pub fields: FieldsConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
}

/// Capture-layer configuration: hook timeout and environment resolution.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Upper bound on hook processing time before the write is dropped.
    pub hook_timeout: std::time::Duration,
    pub chat_memory_enabled: bool,
    pub embedding_memory_enabled: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            hook_timeout: std::time::Duration::from_secs(30),
            chat_memory_enabled: true,
            embedding_memory_enabled: true,
        }
    }
}

/// Resolves the database location the same way the capture layer does:
/// `MEMORI_DATABASE_URL`, then `DATABASE_URL`, then a local file.
pub fn resolve_database_path() -> String {
    std::env::var("MEMORI_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .unwrap_or_else(|_| "memori.db".to_string())
}
