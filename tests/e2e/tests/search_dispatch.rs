//! Exercises the Search Dispatcher end to end: FTS ranking, category
//! matching, and RRF fusion across strategies.

use memori_core::search::{MetadataFilters, MetadataField, MetadataOp, SearchDispatcher, SearchQuery};
use memori_core::storage::Store;
use memori_e2e_tests::mocks::TestDataFactory;

#[test]
fn fts_search_finds_relevant_rows_by_namespace() {
    let store = Store::open_in_memory().expect("open store");
    TestDataFactory::create_search_scenario(&store, "t");
    TestDataFactory::create_memory(&store, "other-namespace", "Rust programming language uses ownership");

    let dispatcher = SearchDispatcher::default();
    let query = SearchQuery::new("t", "Rust ownership memory safety");
    let results = dispatcher.dispatch(&store, &query).expect("dispatch");

    assert!(!results.is_empty());
    assert!(results.iter().any(|r| r.content.contains("Rust")));
}

#[test]
fn search_is_scoped_to_namespace() {
    let store = Store::open_in_memory().expect("open store");
    TestDataFactory::create_memory(&store, "a", "unique needle content about falcons");
    TestDataFactory::create_memory(&store, "b", "unique needle content about falcons");

    let dispatcher = SearchDispatcher::default();
    let query = SearchQuery::new("a", "falcons");
    let results = dispatcher.dispatch(&store, &query).expect("dispatch");

    assert_eq!(results.len(), 1);
}

#[test]
fn empty_query_against_empty_namespace_returns_no_results() {
    let store = Store::open_in_memory().expect("open store");
    let dispatcher = SearchDispatcher::default();
    let query = SearchQuery::new("empty", "anything");
    let results = dispatcher.dispatch(&store, &query).expect("dispatch");
    assert!(results.is_empty());
}

#[test]
fn metadata_filter_routes_through_metadata_strategy() {
    use memori_core::memory::JsonValue;

    let store = Store::open_in_memory().expect("open store");
    let memory = TestDataFactory::create_memory_with_metadata(
        &store,
        "t",
        "a note about onboarding",
        "category",
        JsonValue::String("onboarding".to_string()),
    );

    let dispatcher = SearchDispatcher::default();
    let mut query = SearchQuery::new("t", "");
    query.metadata_filters = Some(MetadataFilters {
        fields: vec![MetadataField { key: "category".into(), op: MetadataOp::Eq, value: "onboarding".into() }],
        group_by: vec![],
    });
    let results = dispatcher.dispatch(&store, &query).expect("dispatch");

    assert!(!results.is_empty());
    assert!(results.iter().any(|r| r.id == memory.id));
}

#[test]
fn recency_keyword_routes_through_temporal_strategy() {
    let store = Store::open_in_memory().expect("open store");
    TestDataFactory::create_memory(&store, "t", "older note about deployments").expect("older");
    let newer = TestDataFactory::create_memory(&store, "t", "the most recent note about deployments").expect("newer");

    let dispatcher = SearchDispatcher::default();
    let query = SearchQuery::new("t", "recent deployments");
    let results = dispatcher.dispatch(&store, &query).expect("dispatch");

    assert!(!results.is_empty());
    assert!(results.iter().any(|r| r.id == newer.id));
}
