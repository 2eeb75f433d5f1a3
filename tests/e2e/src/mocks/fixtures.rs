//! Test Data Factory
//!
//! Generates realistic rows for integration tests: single memories,
//! batches, and pre-built scenarios (search categories, duplicate
//! candidates, metadata-bearing rows).

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use memori_core::memory::{Classification, Importance, JsonValue, Memory, RetentionType};
use memori_core::storage::Store;

pub struct TestDataFactory;

/// A named group of inserted memory ids plus free-form metadata for
/// assertions (e.g. which id maps to which role in the scenario).
#[derive(Debug)]
pub struct TestScenario {
    pub memory_ids: Vec<String>,
    pub description: String,
    pub metadata: HashMap<String, String>,
}

impl TestDataFactory {
    /// A single conversational memory with default fields.
    pub fn create_memory(store: &Store, namespace: &str, content: &str) -> Option<Memory> {
        let memory = Self::build(namespace, content, Classification::Conversational, Importance::Medium, "general");
        store.insert(&memory).ok()?;
        Some(memory)
    }

    /// A memory with the caller's classification/importance/category.
    pub fn create_memory_full(
        store: &Store,
        namespace: &str,
        content: &str,
        classification: Classification,
        importance: Importance,
        category: &str,
    ) -> Option<Memory> {
        let memory = Self::build(namespace, content, classification, importance, category);
        store.insert(&memory).ok()?;
        Some(memory)
    }

    /// A batch of `count` memories cycling through every classification.
    pub fn create_batch(store: &Store, namespace: &str, count: usize) -> Vec<String> {
        let classifications = [
            Classification::Essential,
            Classification::Contextual,
            Classification::Conversational,
            Classification::Reference,
            Classification::Personal,
        ];
        let mut ids = Vec::with_capacity(count);
        for i in 0..count {
            let classification = classifications[i % classifications.len()];
            let memory = Self::build(namespace, &format!("Test memory {i}"), classification, Importance::Medium, "general");
            let id = memory.id.clone();
            if store.insert(&memory).is_ok() {
                ids.push(id);
            }
        }
        ids
    }

    /// Three lexically related memories, the setup used by the basic
    /// duplicate-detection scenario: two overlap on "TypeScript"/
    /// "JavaScript" tokens, one doesn't.
    pub fn create_duplicate_candidate_scenario(store: &Store, namespace: &str) -> TestScenario {
        let mut ids = Vec::new();
        let mut metadata = HashMap::new();

        if let Some(m) = Self::create_memory(store, namespace, "TypeScript provides type safety") {
            metadata.insert("typescript".to_string(), m.id.clone());
            ids.push(m.id);
        }
        if let Some(m) = Self::create_memory(store, namespace, "JavaScript is for the web") {
            metadata.insert("javascript".to_string(), m.id.clone());
            ids.push(m.id);
        }
        if let Some(m) = Self::create_memory(store, namespace, "React is a UI framework") {
            metadata.insert("react".to_string(), m.id.clone());
            ids.push(m.id);
        }

        TestScenario { memory_ids: ids, description: "duplicate candidate scenario".to_string(), metadata }
    }

    /// Three topic categories, three rows each, for search/category tests.
    pub fn create_search_scenario(store: &Store, namespace: &str) -> TestScenario {
        let mut ids = Vec::new();
        let mut metadata = HashMap::new();

        for content in [
            "Rust programming language uses ownership for memory safety",
            "Python is great for data science and machine learning",
            "JavaScript runs in web browsers and Node.js",
        ] {
            if let Some(m) = Self::create_memory_full(store, namespace, content, Classification::Reference, Importance::Medium, "programming") {
                ids.push(m.id);
            }
        }
        metadata.insert("programming_count".to_string(), "3".to_string());

        for content in [
            "Mitochondria is the powerhouse of the cell",
            "DNA contains genetic information",
            "Gravity is the force of attraction between masses",
        ] {
            if let Some(m) = Self::create_memory_full(store, namespace, content, Classification::Reference, Importance::Medium, "science") {
                ids.push(m.id);
            }
        }
        metadata.insert("science_count".to_string(), "3".to_string());

        TestScenario { memory_ids: ids, description: "search scenario with categorized content".to_string(), metadata }
    }

    /// A memory carrying one `processed_data` field, for filter/metadata
    /// strategy tests.
    pub fn create_memory_with_metadata(store: &Store, namespace: &str, content: &str, key: &str, value: JsonValue) -> Memory {
        let mut memory = Self::build(namespace, content, Classification::Conversational, Importance::Medium, "general");
        memory.processed_data.insert(key.to_string(), value);
        store.insert(&memory).expect("insert with metadata");
        memory
    }

    fn build(namespace: &str, content: &str, classification: Classification, importance: Importance, category: &str) -> Memory {
        let now = Utc::now();
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
            category_primary: category.to_string(),
            classification_reason: "test fixture".to_string(),
            retention_type: RetentionType::LongTerm,
            extraction_timestamp: now,
            created_at: now,
            duplicate_of: None,
            related_memories: vec![],
            consolidation_timestamp: None,
            processed_data: BTreeMap::new(),
        }
    }

    /// Lorem-ipsum-like content of a given word count, deterministic by
    /// seed so tests stay reproducible without RNG.
    pub fn lorem_content(words: usize, seed: usize) -> String {
        const WORDS: [&str; 20] = [
            "the", "memory", "learning", "knowledge", "algorithm", "data", "system", "process",
            "function", "method", "class", "object", "variable", "constant", "type", "structure",
            "pattern", "design", "architecture", "code",
        ];
        (0..words).map(|i| WORDS[(seed + i * 7) % WORDS.len()]).collect::<Vec<_>>().join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_memory_round_trips_content() {
        let store = Store::open_in_memory().unwrap();
        let memory = TestDataFactory::create_memory(&store, "t", "hello world").expect("created");
        assert_eq!(memory.searchable_content, "hello world");
    }

    #[test]
    fn create_batch_inserts_requested_count() {
        let store = Store::open_in_memory().unwrap();
        let ids = TestDataFactory::create_batch(&store, "t", 10);
        assert_eq!(ids.len(), 10);
        assert_eq!(store.find_all("t").unwrap().len(), 10);
    }

    #[test]
    fn duplicate_candidate_scenario_creates_three_rows() {
        let store = Store::open_in_memory().unwrap();
        let scenario = TestDataFactory::create_duplicate_candidate_scenario(&store, "t");
        assert_eq!(scenario.memory_ids.len(), 3);
        assert!(scenario.metadata.contains_key("typescript"));
    }

    #[test]
    fn lorem_content_has_exact_word_count() {
        let content = TestDataFactory::lorem_content(10, 42);
        assert_eq!(content.split_whitespace().count(), 10);
    }
}
