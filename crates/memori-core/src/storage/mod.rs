//! Storage module
//!
//! SQLite-backed persistence for memories and chat history, with an FTS5
//! mirror kept in sync by triggers.

mod migrations;
mod sqlite;

pub use migrations::{Migration, MIGRATIONS};
pub use sqlite::{sanitize_fts5_query, FtsHit, Store};
