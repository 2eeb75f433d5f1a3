//! Database migrations
//!
//! Schema migration definitions for the storage layer, applied in order and
//! tracked in `schema_version`.

/// Migration definitions, applied in ascending version order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: memories, FTS5 mirror, chat history",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Indexes supporting consolidation candidate scans",
        up: MIGRATION_V2_UP,
    },
];

/// A single forward-only database migration.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

/// V1: memories table, its FTS5 external-content mirror, and chat history.
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    namespace TEXT NOT NULL,
    searchable_content TEXT NOT NULL,
    summary TEXT NOT NULL,
    classification TEXT NOT NULL DEFAULT 'conversational',
    importance TEXT NOT NULL DEFAULT 'medium',
    importance_score REAL NOT NULL DEFAULT 0.5,
    confidence_score REAL NOT NULL DEFAULT 0.5,
    topic TEXT,
    entities TEXT NOT NULL DEFAULT '[]',
    keywords TEXT NOT NULL DEFAULT '[]',
    category_primary TEXT NOT NULL DEFAULT 'general',
    classification_reason TEXT NOT NULL DEFAULT '',
    retention_type TEXT NOT NULL DEFAULT 'long_term',
    extraction_timestamp TEXT NOT NULL,
    created_at TEXT NOT NULL,
    duplicate_of TEXT REFERENCES memories(id) ON DELETE SET NULL,
    related_memories TEXT NOT NULL DEFAULT '[]',
    consolidation_timestamp TEXT,
    processed_data TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_memories_namespace ON memories(namespace);
CREATE INDEX IF NOT EXISTS idx_memories_classification ON memories(namespace, classification);
CREATE INDEX IF NOT EXISTS idx_memories_importance ON memories(namespace, importance);
CREATE INDEX IF NOT EXISTS idx_memories_created ON memories(namespace, created_at);
CREATE INDEX IF NOT EXISTS idx_memories_duplicate_of ON memories(duplicate_of);

CREATE VIRTUAL TABLE IF NOT EXISTS memory_fts USING fts5(
    id UNINDEXED,
    namespace UNINDEXED,
    searchable_content,
    summary,
    content='memories',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
    INSERT INTO memory_fts(rowid, id, namespace, searchable_content, summary)
    VALUES (NEW.rowid, NEW.id, NEW.namespace, NEW.searchable_content, NEW.summary);
END;

CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON memories BEGIN
    INSERT INTO memory_fts(memory_fts, rowid, id, namespace, searchable_content, summary)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.namespace, OLD.searchable_content, OLD.summary);
END;

CREATE TRIGGER IF NOT EXISTS memories_au AFTER UPDATE ON memories BEGIN
    INSERT INTO memory_fts(memory_fts, rowid, id, namespace, searchable_content, summary)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.namespace, OLD.searchable_content, OLD.summary);
    INSERT INTO memory_fts(rowid, id, namespace, searchable_content, summary)
    VALUES (NEW.rowid, NEW.id, NEW.namespace, NEW.searchable_content, NEW.summary);
END;

CREATE TABLE IF NOT EXISTS chat_history (
    id TEXT PRIMARY KEY,
    namespace TEXT NOT NULL,
    user_message TEXT NOT NULL,
    assistant_message TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chat_history_namespace ON chat_history(namespace, created_at);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

/// V2: composite indexes that speed up duplicate-candidate scans, which
/// filter on namespace + classification and exclude already-consolidated
/// rows.
const MIGRATION_V2_UP: &str = r#"
CREATE INDEX IF NOT EXISTS idx_memories_candidates
    ON memories(namespace, classification, duplicate_of);

UPDATE schema_version SET version = 2, applied_at = datetime('now');
"#;

/// Applies every migration whose version exceeds the connection's current
/// `schema_version`, in order. Safe to call on every open since each
/// statement is idempotent (`IF NOT EXISTS` / `INSERT OR IGNORE`).
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version > current {
            conn.execute_batch(migration.up)?;
            tracing::info!(version = migration.version, description = migration.description, "applied migration");
        }
    }
    Ok(())
}
