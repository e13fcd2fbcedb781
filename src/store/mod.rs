//! Row-oriented persistence for all memory entities.
//!
//! The [`Store`] is the sole mutator of persisted state. It owns one
//! SQLite connection behind a mutex; managers hold a cloned handle and
//! acquire short-lived access per operation (scoped acquisition with
//! guaranteed release). Vector similarity runs inside SQLite through the
//! registered `cosine_distance` function.

pub mod backup;
mod files;
mod memories;
pub mod vector;

pub use memories::StoreStats;

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;

use crate::error::MemoryError;

/// Shared handle to the SQLite-backed store.
///
/// Cloning is cheap; all clones share one connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

/// How a row query selects and orders candidates.
///
/// Column names come from manager-side field enums (static strings), so
/// they are never attacker-controlled.
#[derive(Debug, Clone, Copy)]
pub enum RowFilter<'a> {
    /// Most recently created rows first.
    Recent,
    /// Case-insensitive substring match on one column, recency order.
    Contains {
        /// Column to match against.
        column: &'a str,
        /// Needle, matched case-insensitively.
        needle: &'a str,
    },
    /// Cosine distance ascending against one embedding column, with
    /// `created_at ASC, id ASC` tie-breaks.
    Nearest {
        /// Embedding column to rank against.
        embedding_column: &'a str,
        /// Padded query vector.
        vector: &'a [f32],
    },
    /// All rows, insertion order. Used by fuzzy search and exports.
    All,
}

impl Store {
    /// Opens (or creates) a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, MemoryError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Opens an in-memory store. Used by tests and ephemeral sessions.
    pub fn in_memory() -> Result<Self, MemoryError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, MemoryError> {
        vector::register_functions(&conn)?;
        conn.execute_batch(SCHEMA_DDL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs a closure against the connection under the store mutex.
    ///
    /// The closure must not block on anything but SQLite itself; network
    /// calls never happen under this lock.
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, MemoryError> {
        let guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(f(&guard)?)
    }
}

/// Formats a timestamp for storage.
///
/// Fixed-width RFC 3339 (microseconds, UTC) so that lexicographic order
/// in SQL equals chronological order.
#[must_use]
pub(crate) fn ts_to_sql(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a stored timestamp back into UTC.
pub(crate) fn ts_from_sql(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

/// Parses an optional stored timestamp.
pub(crate) fn opt_ts_from_sql(raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| ts_from_sql(&s)).transpose()
}

const SCHEMA_DDL: &str = r"
CREATE TABLE IF NOT EXISTS episodic_events (
    id                TEXT PRIMARY KEY,
    organization_id   TEXT NOT NULL,
    occurred_at       TEXT NOT NULL,
    actor             TEXT NOT NULL,
    event_type        TEXT NOT NULL,
    summary           TEXT NOT NULL,
    details           TEXT NOT NULL,
    metadata          TEXT NOT NULL,
    created_at        TEXT NOT NULL,
    updated_at        TEXT,
    summary_embedding BLOB,
    details_embedding BLOB
);

CREATE TABLE IF NOT EXISTS semantic_items (
    id                   TEXT PRIMARY KEY,
    organization_id      TEXT NOT NULL,
    concept              TEXT NOT NULL,
    definition           TEXT NOT NULL,
    details              TEXT NOT NULL,
    source               TEXT NOT NULL,
    metadata             TEXT NOT NULL,
    created_at           TEXT NOT NULL,
    updated_at           TEXT,
    concept_embedding    BLOB,
    definition_embedding BLOB,
    details_embedding    BLOB
);

CREATE TABLE IF NOT EXISTS procedural_items (
    id                    TEXT PRIMARY KEY,
    organization_id       TEXT NOT NULL,
    entry_type            TEXT NOT NULL,
    description           TEXT NOT NULL,
    steps                 TEXT NOT NULL,
    metadata              TEXT NOT NULL,
    created_at            TEXT NOT NULL,
    updated_at            TEXT,
    description_embedding BLOB,
    steps_embedding       BLOB
);

CREATE TABLE IF NOT EXISTS resource_items (
    id                TEXT PRIMARY KEY,
    organization_id   TEXT NOT NULL,
    title             TEXT NOT NULL,
    summary           TEXT NOT NULL,
    content           TEXT NOT NULL,
    resource_type     TEXT NOT NULL,
    metadata          TEXT NOT NULL,
    created_at        TEXT NOT NULL,
    updated_at        TEXT,
    summary_embedding BLOB
);

CREATE TABLE IF NOT EXISTS vault_items (
    id                    TEXT PRIMARY KEY,
    organization_id       TEXT NOT NULL,
    entry_type            TEXT NOT NULL,
    source                TEXT NOT NULL,
    sensitivity           TEXT NOT NULL,
    secret_value          TEXT NOT NULL,
    description           TEXT NOT NULL,
    metadata              TEXT NOT NULL,
    created_at            TEXT NOT NULL,
    updated_at            TEXT,
    description_embedding BLOB
);

CREATE TABLE IF NOT EXISTS core_blocks (
    id              TEXT PRIMARY KEY,
    organization_id TEXT NOT NULL,
    agent_id        TEXT NOT NULL,
    label           TEXT NOT NULL,
    value           TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    updated_at      TEXT,
    UNIQUE (agent_id, label)
);

CREATE TABLE IF NOT EXISTS messages (
    id              TEXT PRIMARY KEY,
    organization_id TEXT NOT NULL,
    agent_id        TEXT NOT NULL,
    role            TEXT NOT NULL,
    text            TEXT,
    tool_calls      TEXT,
    step_id         TEXT,
    created_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_agent_time ON messages (agent_id, created_at);

CREATE TABLE IF NOT EXISTS cloud_file_mappings (
    id              TEXT PRIMARY KEY,
    organization_id TEXT NOT NULL,
    local_file_id   TEXT NOT NULL,
    cloud_file_id   TEXT NOT NULL,
    uri             TEXT NOT NULL,
    timestamp       TEXT NOT NULL,
    status          TEXT NOT NULL,
    created_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cloud_local ON cloud_file_mappings (local_file_id);

CREATE TABLE IF NOT EXISTS provider_keys (
    provider TEXT PRIMARY KEY,
    value    TEXT NOT NULL
);
";

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory_applies_schema() {
        let store = Store::in_memory().unwrap_or_else(|e| panic!("open failed: {e}"));
        let count: i64 = store
            .with_conn(|conn| {
                conn.query_row("SELECT COUNT(*) FROM episodic_events", [], |row| row.get(0))
            })
            .unwrap_or_else(|e| panic!("query failed: {e}"));
        assert_eq!(count, 0);
    }

    #[test]
    fn test_ts_roundtrip_fixed_width() {
        let now = Utc::now();
        let raw = ts_to_sql(now);
        let back = ts_from_sql(&raw).unwrap_or_else(|e| panic!("parse failed: {e}"));
        assert_eq!(ts_to_sql(back), raw);
        // Lexicographic comparability requires equal widths.
        let later = ts_to_sql(now + chrono::Duration::seconds(1));
        assert_eq!(raw.len(), later.len());
        assert!(later > raw);
    }
}
