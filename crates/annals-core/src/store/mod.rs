//! Persistence collaborator contract.
//!
//! The engine never talks to a database directly: it consumes this trait,
//! and the caller decides what backs it. Every mutating operation happens
//! between [`HistoryStore::begin`] and [`HistoryStore::commit`]; the
//! orchestrator opens exactly one transaction per import and one per
//! deletion, and rolls back on any fatal error.
//!
//! [`MemoryStore`] is the in-crate reference implementation; the SQLite
//! implementation lives in the `annals-store` crate.

pub mod memory;

pub use memory::MemoryStore;

use crate::entry::{DocumentId, LogEntry, VersionId};

/// Storage-assigned node identifier. Never reused, even after deletion.
pub type NodeId = i64;

/// A persistence failure. Always fatal.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// A mutating call arrived outside a transaction.
    #[error("no transaction is active")]
    NoTransaction,

    /// `begin` was called while a transaction was already open.
    #[error("a transaction is already active")]
    NestedTransaction,

    /// An update or delete referenced an id the store does not hold.
    #[error("unknown node id {0}")]
    UnknownNode(NodeId),

    /// The backend itself failed.
    #[error("storage backend failed: {0}")]
    Backend(String),
}

/// Projection of a persisted log entry into the merge structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedNode {
    /// Storage id, assigned on insert.
    pub id: NodeId,
    /// The logical document the node belongs to.
    pub document_id: DocumentId,
    /// Declared fingerprint of the underlying entry.
    pub entry_hash: String,
    /// Fingerprint of the parent entry, or the sentinel for the head.
    pub parent_entry_hash: String,
    /// Version whose import made this node the head of its branch, if any.
    pub owned_version_id: Option<VersionId>,
}

/// Storage operations the engine needs, within a caller-controlled
/// transaction boundary.
pub trait HistoryStore {
    /// Open a transaction. At most one may be active.
    ///
    /// # Errors
    ///
    /// [`StoreError::NestedTransaction`] when one is already open.
    fn begin(&mut self) -> Result<(), StoreError>;

    /// Make all changes since [`begin`](Self::begin) durable.
    fn commit(&mut self) -> Result<(), StoreError>;

    /// Discard all changes since [`begin`](Self::begin).
    fn rollback(&mut self) -> Result<(), StoreError>;

    /// Persist a new node for the entry and return its storage id.
    ///
    /// The entry carries the document id, parent linkage, and (for the
    /// terminal entry) the owned version tag.
    fn insert_node(&mut self, entry: &LogEntry) -> Result<NodeId, StoreError>;

    /// Set or clear a node's owned version tag.
    fn update_owned_version(
        &mut self,
        id: NodeId,
        version: Option<VersionId>,
    ) -> Result<(), StoreError>;

    /// Load every persisted node for a document. Order is unspecified.
    fn load_nodes(&self, document_id: &DocumentId) -> Result<Vec<PersistedNode>, StoreError>;

    /// Remove the given nodes. Ids are never reused afterwards.
    fn delete_nodes(&mut self, ids: &[NodeId]) -> Result<(), StoreError>;

    /// The document whose history contains the node owned by `version`,
    /// if that version owns one.
    fn document_for_version(
        &self,
        version: VersionId,
    ) -> Result<Option<DocumentId>, StoreError>;
}
