//! # Memori Core
//!
//! A conversational memory engine for LLM-backed applications: a
//! namespace-scoped Store over SQLite/FTS5, a Filter/Search subsystem
//! (a hand-rolled predicate language plus a strategy-fused search
//! dispatcher), a Consolidation subsystem for duplicate detection and
//! merge with backup/rollback, and a thin Capture layer that binds
//! provider calls to an external classifier.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use memori_core::{Store, Memory};
//!
//! let store = Store::open(None)?;
//! let memories = store.find_all("my-namespace")?;
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

pub mod capture;
pub mod config;
pub mod consolidation;
pub mod error;
pub mod filter;
pub mod memory;
pub mod search;
pub mod storage;

pub use capture::{CaptureLayer, ChatExchange, Classifier, EmbeddingCall, ProcessedMemory};
pub use config::{CaptureConfig, MetadataStrategyConfig};
pub use consolidation::{ConsolidationRepo, ConsolidationService};
pub use error::{MemoriError, Result};
pub use filter::{FilterNode, Operator};
pub use memory::{ChatHistory, Classification, Importance, Memory, RetentionType};
pub use search::{SearchDispatcher, SearchQuery, SearchResult};
pub use storage::Store;

/// Crate version, surfaced for diagnostics/telemetry.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::{
        CaptureLayer, ChatExchange, Classification, Classifier, FilterNode, Importance, Memory,
        MemoriError, Result, SearchDispatcher, SearchQuery, SearchResult, Store,
    };
}
