//! Exercises the Capture layer's after-hooks: classification, fallback
//! on classifier failure, and the never-block-the-caller timeout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use memori_core::capture::{ChatExchange, ClassifyContext, Classifier, EmbeddingCall, ProcessedMemory};
use memori_core::config::CaptureConfig;
use memori_core::error::{MemoriError, Result};
use memori_core::memory::{Classification, Importance, RetentionType};
use memori_core::storage::Store;
use memori_core::CaptureLayer;

struct AlwaysEssential;

#[async_trait]
impl Classifier for AlwaysEssential {
    async fn classify(&self, user_input: &str, _assistant_output: &str, _context: &ClassifyContext) -> Result<ProcessedMemory> {
        Ok(ProcessedMemory {
            searchable_content: user_input.to_string(),
            summary: user_input.to_string(),
            classification: Classification::Essential,
            importance: Importance::Critical,
            importance_score: 0.95,
            confidence_score: 0.9,
            topic: Some("test-topic".to_string()),
            entities: vec![],
            keywords: vec![],
            category_primary: "essential".to_string(),
            classification_reason: "always essential for tests".to_string(),
            retention_type: RetentionType::LongTerm,
            processed_data: Default::default(),
        })
    }
}

struct AlwaysFails;

#[async_trait]
impl Classifier for AlwaysFails {
    async fn classify(&self, _user_input: &str, _assistant_output: &str, _context: &ClassifyContext) -> Result<ProcessedMemory> {
        Err(MemoriError::FallbackClassification { message: "simulated parse failure".to_string() })
    }
}

struct NeverResponds;

#[async_trait]
impl Classifier for NeverResponds {
    async fn classify(&self, _user_input: &str, _assistant_output: &str, _context: &ClassifyContext) -> Result<ProcessedMemory> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        unreachable!("timeout should have fired first")
    }
}

#[tokio::test]
async fn after_chat_persists_classifier_output() {
    let store = Arc::new(Store::open_in_memory().expect("open store"));
    let capture = CaptureLayer::new(store.clone(), Arc::new(AlwaysEssential), CaptureConfig::default());

    let chat_id = uuid::Uuid::new_v4().to_string();
    capture
        .after_chat(ChatExchange {
            namespace: "t".into(),
            chat_id: chat_id.clone(),
            last_user_message: "remember my favorite color is teal".into(),
            assistant_content: "noted, your favorite color is teal".into(),
        })
        .await;

    let stored = store.get_by_id("t", &chat_id).expect("lookup").expect("row present");
    assert_eq!(stored.classification, Classification::Essential);
    assert_eq!(stored.importance, Importance::Critical);
}

#[tokio::test]
async fn after_chat_falls_back_when_classifier_errors() {
    let store = Arc::new(Store::open_in_memory().expect("open store"));
    let capture = CaptureLayer::new(store.clone(), Arc::new(AlwaysFails), CaptureConfig::default());

    let chat_id = uuid::Uuid::new_v4().to_string();
    capture
        .after_chat(ChatExchange {
            namespace: "t".into(),
            chat_id: chat_id.clone(),
            last_user_message: "this will fail to classify".into(),
            assistant_content: "response".into(),
        })
        .await;

    let stored = store.get_by_id("t", &chat_id).expect("lookup").expect("row present despite classifier failure");
    assert_eq!(stored.classification_reason, "Fallback processing due to error");
}

#[tokio::test]
async fn after_chat_is_abandoned_after_timeout_without_panicking() {
    let store = Arc::new(Store::open_in_memory().expect("open store"));
    let mut config = CaptureConfig::default();
    config.hook_timeout = Duration::from_millis(50);
    let capture = CaptureLayer::new(store.clone(), Arc::new(NeverResponds), config);

    let chat_id = uuid::Uuid::new_v4().to_string();
    capture
        .after_chat(ChatExchange {
            namespace: "t".into(),
            chat_id: chat_id.clone(),
            last_user_message: "this classifier hangs forever".into(),
            assistant_content: "response".into(),
        })
        .await;

    assert!(store.get_by_id("t", &chat_id).unwrap().is_none());
}

#[tokio::test]
async fn after_embedding_synthesizes_a_surrogate_exchange() {
    let store = Arc::new(Store::open_in_memory().expect("open store"));
    let capture = CaptureLayer::new(store.clone(), Arc::new(AlwaysEssential), CaptureConfig::default());

    let chat_id = uuid::Uuid::new_v4().to_string();
    capture
        .after_embedding(EmbeddingCall {
            namespace: "t".into(),
            chat_id: chat_id.clone(),
            input_text: "embed this document".into(),
            model: "test-embed-model".into(),
        })
        .await;

    assert!(store.get_by_id("t", &chat_id).unwrap().is_some());
}
