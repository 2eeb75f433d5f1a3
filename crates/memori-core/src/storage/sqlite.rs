//! SQLite storage implementation
//!
//! Uses separate reader/writer connections for interior mutability. All
//! methods take `&self`, making `Store` `Send + Sync` so callers can share
//! it behind an `Arc` instead of an `Arc<Mutex<Store>>`.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::error::{MemoriError, Result};
use crate::memory::{ChatHistory, Classification, Importance, JsonValue, Memory, RetentionType};

/// A single FTS5 match: the memory and its BM25 rank (more negative is a
/// stronger match, matching SQLite's convention).
#[derive(Debug, Clone)]
pub struct FtsHit {
    pub memory: Memory,
    pub bm25_rank: f64,
}

/// SQLite-backed store for memories and chat history.
pub struct Store {
    writer: Arc<Mutex<Connection>>,
    reader: Arc<Mutex<Connection>>,
}

impl Store {
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;
             PRAGMA mmap_size = 268435456;
             PRAGMA journal_size_limit = 67108864;",
        )?;
        Ok(())
    }

    /// Opens (creating if absent) the database at `db_path`, or at the
    /// environment-resolved default when `None`, and applies migrations.
    pub fn open(db_path: Option<PathBuf>) -> Result<Self> {
        let path = db_path.unwrap_or_else(|| PathBuf::from(crate::config::resolve_database_path()));
        tracing::info!(path = %path.display(), "opening store");

        let writer_conn = Connection::open(&path)?;
        Self::configure_connection(&writer_conn)?;
        super::migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Arc::new(Mutex::new(writer_conn)),
            reader: Arc::new(Mutex::new(reader_conn)),
        })
    }

    /// Opens an in-memory database, primarily for tests. A single
    /// connection backs both the reader and writer handle, since SQLite's
    /// private in-memory databases aren't visible across connections.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure_connection(&conn)?;
        super::migrations::apply_migrations(&conn)?;
        let shared = Arc::new(Mutex::new(conn));
        Ok(Self {
            writer: shared.clone(),
            reader: shared,
        })
    }

    fn writer(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| MemoriError::LockPoisoned("writer connection".into()))
    }

    fn reader(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| MemoriError::LockPoisoned("reader connection".into()))
    }

    // ------------------------------------------------------------------
    // CRUD
    // ------------------------------------------------------------------

    /// Inserts a new memory row.
    pub fn insert(&self, memory: &Memory) -> Result<()> {
        validate_memory_bounds(memory)?;
        let conn = self.writer()?;
        conn.execute(
            "INSERT INTO memories (
                id, namespace, searchable_content, summary, classification, importance,
                importance_score, confidence_score, topic, entities, keywords,
                category_primary, classification_reason, retention_type,
                extraction_timestamp, created_at, duplicate_of, related_memories,
                consolidation_timestamp, processed_data
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20)",
            params![
                memory.id,
                memory.namespace,
                memory.searchable_content,
                memory.summary,
                memory.classification.as_str(),
                memory.importance.as_str(),
                memory.importance_score,
                memory.confidence_score,
                memory.topic,
                serde_json::to_string(&memory.entities)?,
                serde_json::to_string(&memory.keywords)?,
                memory.category_primary,
                memory.classification_reason,
                memory.retention_type.as_str(),
                memory.extraction_timestamp.to_rfc3339(),
                memory.created_at.to_rfc3339(),
                memory.duplicate_of,
                serde_json::to_string(&memory.related_memories)?,
                memory.consolidation_timestamp.map(|t| t.to_rfc3339()),
                serialize_processed_data(&memory.processed_data)?,
            ],
        )?;
        Ok(())
    }

    /// Fetches one memory by namespace + id.
    pub fn get_by_id(&self, namespace: &str, id: &str) -> Result<Option<Memory>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM memories WHERE namespace = ?1 AND id = ?2",
        )?;
        let memory = stmt
            .query_row(params![namespace, id], row_to_memory)
            .optional()?;
        Ok(memory)
    }

    /// Fetches all memories in a namespace, ordered by creation time
    /// descending. Intended for small namespaces and test fixtures; filter
    /// execution and search go through dedicated paths.
    pub fn find_all(&self, namespace: &str) -> Result<Vec<Memory>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM memories WHERE namespace = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt
            .query_map(params![namespace], row_to_memory)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Fetches memories eligible as consolidation candidates: same
    /// namespace, not already a duplicate, optionally restricted to one
    /// classification.
    pub fn find_candidates(&self, namespace: &str, classification: Option<Classification>) -> Result<Vec<Memory>> {
        let conn = self.reader()?;
        let rows = match classification {
            Some(c) => {
                let mut stmt = conn.prepare(
                    "SELECT * FROM memories WHERE namespace = ?1 AND classification = ?2 AND duplicate_of IS NULL ORDER BY created_at",
                )?;
                stmt.query_map(params![namespace, c.as_str()], row_to_memory)?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT * FROM memories WHERE namespace = ?1 AND duplicate_of IS NULL ORDER BY created_at",
                )?;
                stmt.query_map(params![namespace], row_to_memory)?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
        };
        Ok(rows)
    }

    /// Runs `f` inside a single write transaction, committing on `Ok` and
    /// rolling back on `Err`. This is the transactional boundary the
    /// consolidation repository and the capture layer both build on.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction) -> Result<T>,
    {
        let mut conn = self.writer()?;
        let tx = conn.transaction()?;
        match f(&tx) {
            Ok(result) => {
                tx.commit()?;
                Ok(result)
            }
            Err(e) => {
                tracing::warn!(error = %e, "transaction rolled back");
                Err(e)
            }
        }
    }

    /// Marks `duplicate_id` as absorbed by `primary_id` within an existing
    /// transaction.
    pub fn mark_duplicate_tx(tx: &rusqlite::Transaction, duplicate_id: &str, primary_id: &str) -> Result<()> {
        tx.execute(
            "UPDATE memories SET duplicate_of = ?1 WHERE id = ?2",
            params![primary_id, duplicate_id],
        )?;
        Ok(())
    }

    /// Sets a primary's `related_memories` and `consolidation_timestamp`
    /// within an existing transaction.
    pub fn set_related_memories_tx(
        tx: &rusqlite::Transaction,
        primary_id: &str,
        related: &[String],
        consolidated_at: DateTime<Utc>,
    ) -> Result<()> {
        tx.execute(
            "UPDATE memories SET related_memories = ?1, consolidation_timestamp = ?2 WHERE id = ?3",
            params![
                serde_json::to_string(related)?,
                consolidated_at.to_rfc3339(),
                primary_id,
            ],
        )?;
        Ok(())
    }

    /// Fetches a single memory by id within an existing transaction.
    pub fn get_by_id_tx(tx: &rusqlite::Transaction, id: &str) -> Result<Option<Memory>> {
        let mut stmt = tx.prepare("SELECT * FROM memories WHERE id = ?1")?;
        let memory = stmt.query_row(params![id], row_to_memory).optional()?;
        Ok(memory)
    }

    /// Deletes a memory row scoped to `namespace`. Errs with `NotFound` if
    /// `id` doesn't exist or belongs to a different namespace, so a caller
    /// can never delete across a namespace boundary even by accident.
    pub fn delete(&self, namespace: &str, id: &str) -> Result<()> {
        let conn = self.writer()?;
        let affected = conn.execute("DELETE FROM memories WHERE namespace = ?1 AND id = ?2", params![namespace, id])?;
        if affected == 0 {
            return Err(MemoriError::NotFound(format!("{namespace}/{id}")));
        }
        Ok(())
    }

    /// Deletes a memory row within an existing transaction, scoped to
    /// `namespace`. Mirrors `delete`'s namespace check so batch callers
    /// fail atomically if any id is outside the namespace.
    pub fn delete_tx(tx: &rusqlite::Transaction, namespace: &str, id: &str) -> Result<()> {
        let affected = tx.execute("DELETE FROM memories WHERE namespace = ?1 AND id = ?2", params![namespace, id])?;
        if affected == 0 {
            return Err(MemoriError::NotFound(format!("{namespace}/{id}")));
        }
        Ok(())
    }

    /// Deletes every row in `ids` within one transaction; fails atomically
    /// (no rows deleted) if any id doesn't exist in `namespace`.
    pub fn delete_many(&self, namespace: &str, ids: &[String]) -> Result<()> {
        self.with_transaction(|tx| {
            for id in ids {
                Self::delete_tx(tx, namespace, id)?;
            }
            Ok(())
        })
    }

    /// Merges `patch` into one row's `processed_data`, overwriting any keys
    /// it shares with the existing map. The only supported mutation path
    /// outside consolidation, per the data model's "explicit metadata
    /// updates scoped to one row" lifecycle rule.
    pub fn update_processed_data(&self, namespace: &str, id: &str, patch: BTreeMap<String, JsonValue>) -> Result<()> {
        let conn = self.writer()?;
        let mut stmt = conn.prepare("SELECT processed_data FROM memories WHERE namespace = ?1 AND id = ?2")?;
        let existing_raw: Option<String> = stmt
            .query_row(params![namespace, id], |row| row.get(0))
            .optional()?;
        let Some(existing_raw) = existing_raw else {
            return Err(MemoriError::NotFound(format!("{namespace}/{id}")));
        };

        let mut merged = deserialize_processed_data(&existing_raw)?;
        merged.extend(patch);
        let serialized = serialize_processed_data(&merged)?;

        conn.execute(
            "UPDATE memories SET processed_data = ?1 WHERE namespace = ?2 AND id = ?3",
            params![serialized, namespace, id],
        )?;
        Ok(())
    }

    /// Fetches memories in a namespace matching a caller-built `WHERE`
    /// fragment (already parameterized with `?` placeholders). Used by the
    /// Metadata Strategy, never exposed to raw, unparameterized text.
    pub fn find_by_predicate(
        &self,
        namespace: &str,
        where_sql: &str,
        params: &[rusqlite::types::Value],
    ) -> Result<Vec<Memory>> {
        let conn = self.reader()?;
        let sql = format!("SELECT * FROM memories WHERE namespace = ? AND ({where_sql})");
        let mut stmt = conn.prepare(&sql).map_err(|e| MemoriError::search("metadata", e.to_string(), &sql))?;

        let mut bound: Vec<rusqlite::types::Value> = vec![rusqlite::types::Value::Text(namespace.to_string())];
        bound.extend(params.iter().cloned());

        let rows = stmt
            .query_map(rusqlite::params_from_iter(bound.iter()), row_to_memory)
            .map_err(|e| MemoriError::search("metadata", e.to_string(), &sql))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // FULL-TEXT SEARCH
    // ------------------------------------------------------------------

    /// Runs a sanitized FTS5 query against `memory_fts`, scoped to a
    /// namespace, ranked by BM25.
    pub fn fts_query(&self, namespace: &str, query: &str, limit: usize) -> Result<Vec<FtsHit>> {
        let sanitized = sanitize_fts5_query(query);
        if sanitized.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.reader()?;
        let sql = "SELECT m.*, bm25(memory_fts) AS rank
                    FROM memory_fts
                    JOIN memories m ON m.rowid = memory_fts.rowid
                    WHERE memory_fts MATCH ?1 AND m.namespace = ?2
                    ORDER BY rank
                    LIMIT ?3";
        let mut stmt = conn.prepare(sql).map_err(|e| {
            MemoriError::search("fts", e.to_string(), sql)
        })?;
        let rank_col = stmt.column_count() - 1;
        let rows = stmt
            .query_map(params![sanitized, namespace, limit as i64], move |row| {
                let rank: f64 = row.get(rank_col)?;
                Ok((row_to_memory(row)?, rank))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows
            .into_iter()
            .map(|(memory, bm25_rank)| FtsHit { memory, bm25_rank })
            .collect())
    }

    // ------------------------------------------------------------------
    // CHAT HISTORY
    // ------------------------------------------------------------------

    /// Inserts a chat history row within an existing transaction.
    pub fn insert_chat_history_tx(tx: &rusqlite::Transaction, history: &ChatHistory) -> Result<()> {
        tx.execute(
            "INSERT INTO chat_history (id, namespace, user_message, assistant_message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                history.id,
                history.namespace,
                history.user_message,
                history.assistant_message,
                history.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Inserts a memory row within an existing transaction.
    pub fn insert_tx(tx: &rusqlite::Transaction, memory: &Memory) -> Result<()> {
        validate_memory_bounds(memory)?;
        tx.execute(
            "INSERT INTO memories (
                id, namespace, searchable_content, summary, classification, importance,
                importance_score, confidence_score, topic, entities, keywords,
                category_primary, classification_reason, retention_type,
                extraction_timestamp, created_at, duplicate_of, related_memories,
                consolidation_timestamp, processed_data
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20)",
            params![
                memory.id,
                memory.namespace,
                memory.searchable_content,
                memory.summary,
                memory.classification.as_str(),
                memory.importance.as_str(),
                memory.importance_score,
                memory.confidence_score,
                memory.topic,
                serde_json::to_string(&memory.entities)?,
                serde_json::to_string(&memory.keywords)?,
                memory.category_primary,
                memory.classification_reason,
                memory.retention_type.as_str(),
                memory.extraction_timestamp.to_rfc3339(),
                memory.created_at.to_rfc3339(),
                memory.duplicate_of,
                serde_json::to_string(&memory.related_memories)?,
                memory.consolidation_timestamp.map(|t| t.to_rfc3339()),
                serialize_processed_data(&memory.processed_data)?,
            ],
        )?;
        Ok(())
    }
}

const MAX_ID_BYTES: usize = 100;
const MAX_CONTENT_BYTES: usize = 10_000;

/// Sanitization boundary: ids and content cross into SQL here, so bounds
/// are enforced once, at the write path, rather than trusted from callers.
fn validate_memory_bounds(memory: &Memory) -> Result<()> {
    if memory.id.len() > MAX_ID_BYTES {
        return Err(MemoriError::validation("id", &memory.id, format!("length must be <= {MAX_ID_BYTES} bytes")));
    }
    if memory.searchable_content.len() > MAX_CONTENT_BYTES {
        return Err(MemoriError::validation(
            "searchable_content",
            memory.searchable_content.len(),
            format!("length must be <= {MAX_CONTENT_BYTES} bytes"),
        ));
    }
    if memory.summary.len() > MAX_CONTENT_BYTES {
        return Err(MemoriError::validation(
            "summary",
            memory.summary.len(),
            format!("length must be <= {MAX_CONTENT_BYTES} bytes"),
        ));
    }
    Ok(())
}

fn serialize_processed_data(data: &BTreeMap<String, JsonValue>) -> Result<String> {
    let raw: BTreeMap<String, serde_json::Value> = data
        .iter()
        .map(|(k, v)| (k.clone(), v.clone().into()))
        .collect();
    Ok(serde_json::to_string(&raw)?)
}

fn deserialize_processed_data(raw: &str) -> Result<BTreeMap<String, JsonValue>> {
    let parsed: BTreeMap<String, serde_json::Value> = serde_json::from_str(raw)?;
    Ok(parsed.into_iter().map(|(k, v)| (k, v.into())).collect())
}

fn row_to_memory(row: &Row) -> rusqlite::Result<Memory> {
    let classification_raw: String = row.get("classification")?;
    let importance_raw: String = row.get("importance")?;
    let retention_raw: String = row.get("retention_type")?;
    let entities_raw: String = row.get("entities")?;
    let keywords_raw: String = row.get("keywords")?;
    let related_raw: String = row.get("related_memories")?;
    let processed_raw: String = row.get("processed_data")?;
    let extraction_raw: String = row.get("extraction_timestamp")?;
    let created_raw: String = row.get("created_at")?;
    let consolidation_raw: Option<String> = row.get("consolidation_timestamp")?;

    let parse_ts = |s: &str| {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
    };

    Ok(Memory {
        id: row.get("id")?,
        namespace: row.get("namespace")?,
        searchable_content: row.get("searchable_content")?,
        summary: row.get("summary")?,
        classification: Classification::parse_name(&classification_raw).unwrap_or_default(),
        importance: Importance::parse_name(&importance_raw).unwrap_or_default(),
        importance_score: row.get("importance_score")?,
        confidence_score: row.get("confidence_score")?,
        topic: row.get("topic")?,
        entities: serde_json::from_str(&entities_raw).unwrap_or_default(),
        keywords: serde_json::from_str(&keywords_raw).unwrap_or_default(),
        category_primary: row.get("category_primary")?,
        classification_reason: row.get("classification_reason")?,
        retention_type: RetentionType::parse_name(&retention_raw).unwrap_or_default(),
        extraction_timestamp: parse_ts(&extraction_raw)?,
        created_at: parse_ts(&created_raw)?,
        duplicate_of: row.get("duplicate_of")?,
        related_memories: serde_json::from_str(&related_raw).unwrap_or_default(),
        consolidation_timestamp: consolidation_raw.map(|s| parse_ts(&s)).transpose()?,
        processed_data: deserialize_processed_data(&processed_raw)
            .map_err(|_| rusqlite::Error::InvalidColumnType(0, "processed_data".into(), rusqlite::types::Type::Text))?,
    })
}

/// Strips FTS5 operator characters the query layer doesn't intend to expose
/// to callers, then wraps each surviving token in quotes so stray `-`/`*`/`:`
/// in user content can't be read back as FTS5 syntax.
pub fn sanitize_fts5_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|token| {
            let cleaned: String = token.chars().filter(|c| c.is_alphanumeric()).collect();
            cleaned
        })
        .filter(|token| !token.is_empty())
        .map(|token| format!("\"{token}\""))
        .collect::<Vec<_>>()
        .join(" ")
}
