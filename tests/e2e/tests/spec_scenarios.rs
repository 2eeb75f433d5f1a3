//! Integration-level coverage of the six concrete scenarios the core's
//! public API contract is built around: duplicate detection, consolidate
//! + rollback, filter parse/execute, metadata SQL pushdown, validator
//! redundancy warnings, and cross-namespace isolation.

use memori_core::consolidation::{ConsolidationRepo, ConsolidationService};
use memori_core::filter::executor::{to_sql, Executor};
use memori_core::filter::parser::Parser;
use memori_core::filter::validator::validate;
use memori_core::storage::Store;
use memori_e2e_tests::mocks::TestDataFactory;

#[test]
fn basic_duplicate_detection() {
    let store = Store::open_in_memory().expect("open store");
    TestDataFactory::create_duplicate_candidate_scenario(&store, "t");

    let service = ConsolidationService::new(&store);
    let detected = service
        .detect_duplicate_memories("TypeScript and JavaScript power the web", 0.5, "t")
        .expect("detect duplicates");

    assert!(detected.len() >= 2, "expected at least the TypeScript and JavaScript rows");
    for d in &detected {
        assert!(d.confidence >= 0.0 && d.confidence <= 1.0);
    }
}

#[test]
fn consolidate_then_rollback() {
    let store = Store::open_in_memory().expect("open store");
    let m1 = TestDataFactory::create_memory(&store, "t", "primary memory").expect("m1");
    let m2 = TestDataFactory::create_memory(&store, "t", "duplicate one").expect("m2");
    let m3 = TestDataFactory::create_memory(&store, "t", "duplicate two").expect("m3");

    let repo = ConsolidationRepo::new(&store);
    let snapshot = repo.backup(&[m1.id.clone(), m2.id.clone(), m3.id.clone()], "t").expect("backup");

    let result = repo.consolidate(&m1.id, &[m2.id.clone(), m3.id.clone()], "t").expect("consolidate");
    assert!(result.success);
    assert_eq!(result.consolidated_count, 2);

    let primary = store.get_by_id("t", &m1.id).unwrap().unwrap();
    assert_eq!(primary.related_memories, vec![m2.id.clone(), m3.id.clone()]);
    let dup2 = store.get_by_id("t", &m2.id).unwrap().unwrap();
    let dup3 = store.get_by_id("t", &m3.id).unwrap().unwrap();
    assert_eq!(dup2.duplicate_of, Some(m1.id.clone()));
    assert_eq!(dup3.duplicate_of, Some(m1.id.clone()));

    repo.rollback(&m1.id, &[m2.id.clone(), m3.id.clone()], &snapshot, "t").expect("rollback");
    let primary_after = store.get_by_id("t", &m1.id).unwrap().unwrap();
    let dup2_after = store.get_by_id("t", &m2.id).unwrap().unwrap();
    assert!(primary_after.related_memories.is_empty());
    assert_eq!(dup2_after.duplicate_of, None);
}

#[test]
fn filter_parse_and_execute() {
    let store = Store::open_in_memory().expect("open store");
    let mut m1 = row(&store, "t", "row one");
    m1.category_primary = "important".into();
    let mut m2 = row(&store, "t", "row two");
    m2.category_primary = "important".into();
    let mut m3 = row(&store, "t", "row three");
    m3.category_primary = "misc".into();

    let node = Parser::parse("category = \"important\" AND priority >= 8").expect("parse");
    let rows = vec![with_field(m1.clone(), "priority", 9.0), with_field(m2.clone(), "priority", 7.0), with_field(m3.clone(), "priority", 9.0)];
    let matched = Executor::execute(&node, &rows);

    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].id, m1.id);
}

#[test]
fn metadata_pushdown_sql() {
    let node = Parser::parse("category = \"work\"").expect("parse");
    let pushdown = to_sql(&node);
    assert!(pushdown.sql.contains("json_extract(processed_data,'$.category') = ?"));
    assert_eq!(pushdown.parameters.len(), 1);
}

#[test]
fn validator_redundancy_warning() {
    let node = Parser::parse("x = 1 AND x = 1").expect("parse");
    let result = validate(&node);
    assert!(result.is_valid());
    assert_eq!(result.warnings.iter().filter(|w| w.code == "redundant_filters").count(), 1);
}

#[test]
fn cross_namespace_isolation() {
    let store = Store::open_in_memory().expect("open store");
    let m = TestDataFactory::create_memory(&store, "a", "namespaced memory").expect("m");

    assert!(store.get_by_id("b", &m.id).unwrap().is_none());

    let repo = ConsolidationRepo::new(&store);
    let result = repo.consolidate(&m.id, &[], "b").expect("consolidate call completes");
    assert!(!result.success);
    assert!(result.errors.iter().any(|e| e.contains(&m.id)));
}

fn row(store: &Store, namespace: &str, content: &str) -> memori_core::memory::Memory {
    TestDataFactory::create_memory(store, namespace, content).expect("row")
}

fn with_field(mut memory: memori_core::memory::Memory, key: &str, value: f64) -> memori_core::memory::Memory {
    memory.processed_data.insert(key.to_string(), memori_core::memory::JsonValue::Number(value));
    memory
}
