//! Capture layer
//!
//! Wraps a provider call with an `after` hook that classifies the
//! exchange and persists it, without ever changing the provider's return
//! value and without ever surfacing its own failures to the caller.

pub mod classifier;

pub use classifier::{fallback_processed_memory, ClassifyContext, Classifier, FallbackClassifier, ProcessedMemory};

use std::sync::Arc;

use tracing::{error, trace, warn};

use crate::config::CaptureConfig;
use crate::memory::ChatHistory;
use crate::storage::Store;

/// The inputs and provider response an `afterChat` hook observes. The
/// hook reads these; it never mutates `response`.
#[derive(Debug, Clone)]
pub struct ChatExchange {
    pub namespace: String,
    pub chat_id: String,
    pub last_user_message: String,
    pub assistant_content: String,
}

/// The inputs an `afterEmbedding` hook observes, collapsed into a
/// surrogate exchange so it can go through the same classify/persist path
/// as a chat turn.
#[derive(Debug, Clone)]
pub struct EmbeddingCall {
    pub namespace: String,
    pub chat_id: String,
    pub input_text: String,
    pub model: String,
}

impl EmbeddingCall {
    fn as_surrogate_exchange(&self) -> ChatExchange {
        ChatExchange {
            namespace: self.namespace.clone(),
            chat_id: self.chat_id.clone(),
            last_user_message: self.input_text.clone(),
            assistant_content: format!("[embedding request via {}]", self.model),
        }
    }
}

/// Wraps every provider call with a classify-then-persist hook, bounded
/// by a timeout so a slow or hung classifier never blocks the caller
/// beyond the configured budget.
pub struct CaptureLayer {
    store: Arc<Store>,
    classifier: Arc<dyn Classifier>,
    config: CaptureConfig,
}

impl CaptureLayer {
    pub fn new(store: Arc<Store>, classifier: Arc<dyn Classifier>, config: CaptureConfig) -> Self {
        Self { store, classifier, config }
    }

    /// `afterChat(params, response)`: submits the exchange to the
    /// classifier and persists the result, if chat-memory capture is
    /// enabled and the exchange is non-empty.
    pub async fn after_chat(&self, exchange: ChatExchange) {
        if !self.config.chat_memory_enabled {
            return;
        }
        if exchange.last_user_message.trim().is_empty() && exchange.assistant_content.trim().is_empty() {
            return;
        }
        self.run_hook(exchange).await;
    }

    /// `afterEmbedding(params, response)`: synthesizes a surrogate
    /// exchange describing the embedding request and submits it the same
    /// way as a chat turn.
    pub async fn after_embedding(&self, call: EmbeddingCall) {
        if !self.config.embedding_memory_enabled {
            return;
        }
        if call.input_text.trim().is_empty() {
            return;
        }
        self.run_hook(call.as_surrogate_exchange()).await;
    }

    /// Never changes the provider's return value and never surfaces a
    /// failure; only the time budget and final log line are observable.
    async fn run_hook(&self, exchange: ChatExchange) {
        let namespace = exchange.namespace.clone();
        let chat_id = exchange.chat_id.clone();
        trace!(namespace = %namespace, chat_id = %chat_id, "capture hook entered");
        let outcome = tokio::time::timeout(self.config.hook_timeout, self.classify_and_persist(exchange)).await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(namespace = %namespace, chat_id = %chat_id, error = %e, "capture hook failed"),
            Err(_) => warn!(namespace = %namespace, chat_id = %chat_id, timeout_ms = %self.config.hook_timeout.as_millis(), "capture hook abandoned after timeout"),
        }
    }

    async fn classify_and_persist(&self, exchange: ChatExchange) -> crate::error::Result<()> {
        let context = ClassifyContext { namespace: exchange.namespace.clone(), recent_history: Vec::new() };
        let processed = match self
            .classifier
            .classify(&exchange.last_user_message, &exchange.assistant_content, &context)
            .await
        {
            Ok(processed) => processed,
            Err(e) => {
                warn!(error = %e, "classifier failed, using deterministic fallback");
                fallback_processed_memory(&exchange.last_user_message)
            }
        };

        self.persist(&exchange.namespace, &exchange.chat_id, processed, &exchange.last_user_message, &exchange.assistant_content)
    }

    /// Within a single Store transaction: (a) writes a ChatHistory row
    /// capped at 500/2000 chars — a failure here is logged and ignored —
    /// then (b) writes the Memory row, whose failure is fatal to the hook.
    /// Declared relationships are the memory's own `related_memories`
    /// list, since this schema has no separate relationships table.
    fn persist(
        &self,
        namespace: &str,
        chat_id: &str,
        processed: ProcessedMemory,
        user_message: &str,
        assistant_message: &str,
    ) -> crate::error::Result<()> {
        let history = ChatHistory::new(namespace, user_message, assistant_message);
        let memory = crate::memory::Memory {
            id: chat_id.to_string(),
            namespace: namespace.to_string(),
            searchable_content: processed.searchable_content,
            summary: processed.summary,
            classification: processed.classification,
            importance: processed.importance,
            importance_score: processed.importance_score,
            confidence_score: processed.confidence_score,
            topic: processed.topic,
            entities: processed.entities,
            keywords: processed.keywords,
            category_primary: processed.category_primary,
            classification_reason: processed.classification_reason,
            retention_type: processed.retention_type,
            extraction_timestamp: chrono::Utc::now(),
            created_at: chrono::Utc::now(),
            duplicate_of: None,
            related_memories: Vec::new(),
            consolidation_timestamp: None,
            processed_data: processed.processed_data,
        };

        self.store.with_transaction(|tx| {
            if let Err(e) = Store::insert_chat_history_tx(tx, &history) {
                warn!(error = %e, "chat history write failed, continuing without it");
            }
            Store::insert_tx(tx, &memory)?;
            Ok(())
        })
    }
}
