//! Consolidation subsystem
//!
//! Duplicate detection and merge, split into a transactional Repository
//! (storage-facing) and a Service (policy-facing: confidence scoring,
//! recommendations, analytics).

pub mod repo;
pub mod service;

pub use repo::{
    generate_data_integrity_hash, CleanupResult, ConsolidateResult, ConsolidationRepo,
    ConsolidationStatistics, DuplicateCandidate, PreConsolidationValidation, Snapshot,
    TOKEN_OVERLAP_STUB_SCORE,
};
pub use service::{
    ConsolidationAnalytics, ConsolidationRecommendation, ConsolidationService, DetectedDuplicate,
    EligibilityCheck, HealthRating, OptimizationRecommendation, RollbackOutcome,
};
