//! Canonical SQLite schema for the history store.
//!
//! One row per persisted log entry. The merge structure (parent/child
//! links) is encoded purely through `entry_hash`/`parent_entry_hash`;
//! the tree is reconstructed in memory, never joined in SQL.
//!
//! `AUTOINCREMENT` is deliberate: node ids must never be reused, even
//! after rows are deleted.

/// Migration v1: the entry table.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS history_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id TEXT NOT NULL CHECK (length(document_id) > 0),
    entry_hash TEXT NOT NULL CHECK (entry_hash LIKE 'blake3:%'),
    parent_entry_hash TEXT NOT NULL,
    owned_version_id INTEGER,
    ts_us INTEGER NOT NULL,
    author TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    UNIQUE (document_id, entry_hash)
);
";

/// Migration v2: read-path indexes.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_history_entries_document
    ON history_entries(document_id);

CREATE INDEX IF NOT EXISTS idx_history_entries_owned_version
    ON history_entries(owned_version_id)
    WHERE owned_version_id IS NOT NULL;
";

/// Index names asserted by migration tests.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_history_entries_document",
    "idx_history_entries_owned_version",
];
