//! SQLite-backed [`HistoryStore`].
//!
//! Runtime defaults are intentionally conservative:
//! - `journal_mode = WAL` (file-backed databases) so readers are not
//!   blocked while an import commits
//! - `busy_timeout = 5s` to absorb transient lock contention
//! - `foreign_keys = ON`
//!
//! Transactions map 1:1 onto the trait's imperative boundary:
//! `BEGIN IMMEDIATE` / `COMMIT` / `ROLLBACK`. The engine opens exactly one
//! transaction per import and one per deletion.

pub mod schema;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use annals_core::canonical::canonical_json;
use annals_core::entry::{DocumentId, LogEntry, VersionId};
use annals_core::store::{HistoryStore, NodeId, PersistedNode, StoreError};

/// Busy timeout applied to every connection.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Latest schema version understood by this build.
pub const LATEST_SCHEMA_VERSION: u32 = 2;

const MIGRATIONS: &[(u32, &str)] = &[
    (1, schema::MIGRATION_V1_SQL),
    (2, schema::MIGRATION_V2_SQL),
];

/// SQLite implementation of the persistence collaborator.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    in_txn: bool,
}

impl SqliteStore {
    /// Open (or create) a file-backed store, apply runtime pragmas, and
    /// migrate the schema to the latest version.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create store directory {}", parent.display()))?;
        }

        let mut conn = Connection::open(path)
            .with_context(|| format!("open history database {}", path.display()))?;
        configure_connection(&conn, true).context("configure sqlite pragmas")?;
        migrate(&mut conn).context("apply history store migrations")?;

        debug!(path = %path.display(), "history store opened");
        Ok(Self {
            conn,
            in_txn: false,
        })
    }

    /// Open an in-memory store. Used by tests and ephemeral imports.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory().context("open in-memory database")?;
        configure_connection(&conn, false).context("configure sqlite pragmas")?;
        migrate(&mut conn).context("apply history store migrations")?;
        Ok(Self {
            conn,
            in_txn: false,
        })
    }

    /// The applied schema version, from `PRAGMA user_version`.
    pub fn schema_version(&self) -> Result<u32> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .context("query user_version")?;
        u32::try_from(version).context("user_version out of range")
    }

    /// Direct access to the underlying connection, for diagnostics.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn require_txn(&self) -> Result<(), StoreError> {
        if self.in_txn {
            Ok(())
        } else {
            Err(StoreError::NoTransaction)
        }
    }
}

fn configure_connection(conn: &Connection, wal: bool) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    if wal {
        let _journal_mode: String =
            conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    }
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

/// Apply all pending migrations in ascending order, guarded by
/// `PRAGMA user_version`. Idempotent: each migration only runs when its
/// version is newer, and the DDL itself uses `IF NOT EXISTS`.
fn migrate(conn: &mut Connection) -> rusqlite::Result<u32> {
    let mut current: u32 = conn
        .pragma_query_value(None, "user_version", |row| row.get::<_, i64>(0))?
        .try_into()
        .unwrap_or(0);

    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", i64::from(*version))?;
        tx.commit()?;
        current = *version;
    }

    Ok(current)
}

fn backend(err: rusqlite::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

impl HistoryStore for SqliteStore {
    fn begin(&mut self) -> Result<(), StoreError> {
        if self.in_txn {
            return Err(StoreError::NestedTransaction);
        }
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(backend)?;
        self.in_txn = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.require_txn()?;
        self.conn.execute_batch("COMMIT").map_err(backend)?;
        self.in_txn = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        self.require_txn()?;
        self.conn.execute_batch("ROLLBACK").map_err(backend)?;
        self.in_txn = false;
        Ok(())
    }

    fn insert_node(&mut self, entry: &LogEntry) -> Result<NodeId, StoreError> {
        self.require_txn()?;
        self.conn
            .execute(
                "INSERT INTO history_entries (
                    document_id,
                    entry_hash,
                    parent_entry_hash,
                    owned_version_id,
                    ts_us,
                    author,
                    payload_json
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    entry.document_id.as_str(),
                    entry.entry_hash,
                    entry.parent_entry_hash,
                    entry.owned_version_id.map(VersionId::get),
                    entry.ts_us,
                    entry.author,
                    canonical_json(&entry.payload),
                ],
            )
            .map_err(backend)?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_owned_version(
        &mut self,
        id: NodeId,
        version: Option<VersionId>,
    ) -> Result<(), StoreError> {
        self.require_txn()?;
        let affected = self
            .conn
            .execute(
                "UPDATE history_entries SET owned_version_id = ?1 WHERE id = ?2",
                params![version.map(VersionId::get), id],
            )
            .map_err(backend)?;
        if affected == 0 {
            return Err(StoreError::UnknownNode(id));
        }
        Ok(())
    }

    fn load_nodes(&self, document_id: &DocumentId) -> Result<Vec<PersistedNode>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT id, entry_hash, parent_entry_hash, owned_version_id
                 FROM history_entries
                 WHERE document_id = ?1",
            )
            .map_err(backend)?;

        let rows = stmt
            .query_map(params![document_id.as_str()], |row| {
                Ok(PersistedNode {
                    id: row.get(0)?,
                    document_id: document_id.clone(),
                    entry_hash: row.get(1)?,
                    parent_entry_hash: row.get(2)?,
                    owned_version_id: row
                        .get::<_, Option<i64>>(3)?
                        .map(VersionId::new),
                })
            })
            .map_err(backend)?;

        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(backend)
    }

    fn delete_nodes(&mut self, ids: &[NodeId]) -> Result<(), StoreError> {
        self.require_txn()?;
        let mut stmt = self
            .conn
            .prepare_cached("DELETE FROM history_entries WHERE id = ?1")
            .map_err(backend)?;
        for &id in ids {
            let affected = stmt.execute(params![id]).map_err(backend)?;
            if affected == 0 {
                return Err(StoreError::UnknownNode(id));
            }
        }
        Ok(())
    }

    fn document_for_version(
        &self,
        version: VersionId,
    ) -> Result<Option<DocumentId>, StoreError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT document_id FROM history_entries WHERE owned_version_id = ?1",
                params![version.get()],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend)?;

        raw.map(|id| DocumentId::new(id).map_err(|err| StoreError::Backend(err.to_string())))
            .transpose()
    }
}
