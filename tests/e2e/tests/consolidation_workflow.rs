//! End-to-end consolidation workflow: detect, preview, consolidate,
//! analyze, and roll back by token.

use memori_core::consolidation::ConsolidationService;
use memori_core::storage::Store;
use memori_e2e_tests::mocks::TestDataFactory;

#[test]
fn full_consolidation_lifecycle() {
    let store = Store::open_in_memory().expect("open store");
    let m1 = TestDataFactory::create_memory(&store, "t", "primary content about databases").expect("m1");
    let m2 = TestDataFactory::create_memory(&store, "t", "duplicate content about databases").expect("m2");

    let service = ConsolidationService::new(&store);

    let eligibility = service.validate_consolidation_eligibility(&m1.id, &[m2.id.clone()], "t").expect("eligibility");
    assert!(eligibility.eligible);

    let preview = service.preview_consolidation(&m1.id, &[m2.id.clone()], "t").expect("preview");
    assert!(preview.fields_that_would_change.contains(&"relatedMemoriesJson".to_string()));

    let result = service.consolidate_memories(&m1.id, &[m2.id.clone()], "t").expect("consolidate");
    assert!(result.success);
    let token = result.data_integrity_hash.expect("hash");

    let analytics = service.get_consolidation_analytics("t").expect("analytics");
    assert_eq!(analytics.statistics.consolidated_memories, 1);
    assert_eq!(analytics.statistics.duplicate_count, 1);

    let outcome = service.rollback_consolidation(&m1.id, &token, "t").expect("rollback");
    assert!(outcome.success);

    let analytics_after = service.get_consolidation_analytics("t").expect("analytics after rollback");
    assert_eq!(analytics_after.statistics.consolidated_memories, 0);
}

#[test]
fn ineligible_consolidation_reports_reasons_without_mutating() {
    let store = Store::open_in_memory().expect("open store");
    let m1 = TestDataFactory::create_memory(&store, "t", "solo memory").expect("m1");

    let service = ConsolidationService::new(&store);
    let eligibility = service
        .validate_consolidation_eligibility(&m1.id, &["missing-id".to_string()], "t")
        .expect("eligibility");

    assert!(!eligibility.eligible);
    assert!(!eligibility.reasons.is_empty());

    let stored = store.get_by_id("t", &m1.id).unwrap().unwrap();
    assert!(stored.related_memories.is_empty());
}

#[test]
fn cleanup_only_removes_consolidated_duplicates() {
    let store = Store::open_in_memory().expect("open store");
    let m1 = TestDataFactory::create_memory(&store, "t", "primary content about databases").expect("m1");
    let m2 = TestDataFactory::create_memory(&store, "t", "duplicate content about databases").expect("m2");

    let service = ConsolidationService::new(&store);
    let result = service.consolidate_memories(&m1.id, &[m2.id.clone()], "t").expect("consolidate");
    assert!(result.success);

    let cleanup = service.cleanup_consolidated_memories(0, false, "t").expect("cleanup");
    assert_eq!(cleanup.deleted_count, 1);

    assert!(store.get_by_id("t", &m1.id).unwrap().is_some(), "primary must survive cleanup");
    assert!(store.get_by_id("t", &m2.id).unwrap().is_none(), "duplicate must be removed");
}

#[test]
fn optimization_recommendations_reflect_duplicate_ratio() {
    let store = Store::open_in_memory().expect("open store");
    for i in 0..20 {
        TestDataFactory::create_memory(&store, "t", &format!("memory {i}"));
    }

    let service = ConsolidationService::new(&store);
    let recommendation = service.get_optimization_recommendations("t").expect("recommendations");
    assert!(recommendation.next_maintenance_at > chrono::Utc::now());
    assert!(!recommendation.notes.is_empty());
}
