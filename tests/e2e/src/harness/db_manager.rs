//! Test Database Manager
//!
//! Provides isolated Store instances for integration tests: temporary
//! databases that are cleaned up on drop, plus seeding helpers.

use std::path::PathBuf;

use memori_core::memory::{Classification, Importance, JsonValue, Memory, RetentionType};
use memori_core::storage::Store;
use tempfile::TempDir;

/// Manager for test databases.
///
/// Creates an isolated `Store` per test to prevent interference, backed
/// by a temp directory that is removed when the manager is dropped.
pub struct TestDatabaseManager {
    pub store: Store,
    _temp_dir: Option<TempDir>,
    db_path: PathBuf,
}

fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).try_init();
    });
}

impl TestDatabaseManager {
    /// Create a new test database in a temporary directory.
    pub fn new_temp() -> Self {
        init_test_logging();
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let db_path = temp_dir.path().join("test_memori.db");
        let store = Store::open(Some(db_path.clone())).expect("failed to open test store");

        Self { store, _temp_dir: Some(temp_dir), db_path }
    }

    /// Create a database entirely in memory — faster, no filesystem touch.
    pub fn new_in_memory() -> Self {
        init_test_logging();
        let store = Store::open_in_memory().expect("failed to open in-memory store");
        Self { store, _temp_dir: None, db_path: PathBuf::from(":memory:") }
    }

    pub fn path(&self) -> &PathBuf {
        &self.db_path
    }

    pub fn is_empty(&self, namespace: &str) -> bool {
        self.node_count(namespace) == 0
    }

    pub fn node_count(&self, namespace: &str) -> usize {
        self.store.find_all(namespace).map(|rows| rows.len()).unwrap_or(0)
    }

    /// Seed `count` plain conversational memories into `namespace`.
    pub fn seed_memories(&mut self, namespace: &str, count: usize) -> Vec<String> {
        let mut ids = Vec::with_capacity(count);
        for i in 0..count {
            let memory = build_memory(namespace, &format!("Test memory content {i}"), Classification::Conversational, Importance::Medium);
            let id = memory.id.clone();
            if self.store.insert(&memory).is_ok() {
                ids.push(id);
            }
        }
        ids
    }

    /// Seed one memory per classification, evenly spread across the
    /// enumeration.
    pub fn seed_diverse_classifications(&mut self, namespace: &str, count_per_type: usize) -> Vec<String> {
        let classifications = [
            Classification::Essential,
            Classification::Contextual,
            Classification::Conversational,
            Classification::Reference,
            Classification::Personal,
        ];
        let mut ids = Vec::with_capacity(count_per_type * classifications.len());
        for classification in classifications {
            for i in 0..count_per_type {
                let memory = build_memory(
                    namespace,
                    &format!("Test {} content {i}", classification.as_str()),
                    classification,
                    Importance::Medium,
                );
                let id = memory.id.clone();
                if self.store.insert(&memory).is_ok() {
                    ids.push(id);
                }
            }
        }
        ids
    }

    /// Seed a memory carrying a `processed_data` field, for metadata
    /// search and filter tests.
    pub fn seed_with_metadata(&mut self, namespace: &str, content: &str, key: &str, value: &str) -> String {
        let mut memory = build_memory(namespace, content, Classification::Conversational, Importance::Medium);
        memory.processed_data.insert(key.to_string(), JsonValue::String(value.to_string()));
        let id = memory.id.clone();
        self.store.insert(&memory).expect("insert with metadata");
        id
    }

    /// Delete every row in `namespace`.
    pub fn clear(&mut self, namespace: &str) {
        if let Ok(rows) = self.store.find_all(namespace) {
            for row in rows {
                let _ = self.store.delete(namespace, &row.id);
            }
        }
    }
}

fn build_memory(namespace: &str, content: &str, classification: Classification, importance: Importance) -> Memory {
    let now = chrono::Utc::now();
    Memory {
        id: uuid::Uuid::new_v4().to_string(),
        namespace: namespace.to_string(),
        searchable_content: content.to_string(),
        summary: content.to_string(),
        classification,
        importance,
        importance_score: 0.5,
        confidence_score: 0.5,
        topic: None,
        entities: vec![],
        keywords: vec![],
        category_primary: "general".to_string(),
        classification_reason: "test fixture".to_string(),
        retention_type: RetentionType::LongTerm,
        extraction_timestamp: now,
        created_at: now,
        duplicate_of: None,
        related_memories: vec![],
        consolidation_timestamp: None,
        processed_data: std::collections::BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_database_starts_empty() {
        let db = TestDatabaseManager::new_temp();
        assert!(db.is_empty("t"));
        assert!(db.path().exists());
    }

    #[test]
    fn seed_memories_inserts_requested_count() {
        let mut db = TestDatabaseManager::new_in_memory();
        let ids = db.seed_memories("t", 10);
        assert_eq!(ids.len(), 10);
        assert_eq!(db.node_count("t"), 10);
    }

    #[test]
    fn clear_removes_all_rows() {
        let mut db = TestDatabaseManager::new_in_memory();
        db.seed_memories("t", 5);
        assert_eq!(db.node_count("t"), 5);
        db.clear("t");
        assert!(db.is_empty("t"));
    }
}
