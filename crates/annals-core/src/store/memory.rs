//! In-memory store: reference implementation and test double.
//!
//! Rollback is snapshot-based: `begin` clones the row set, `rollback`
//! restores it. Good enough for tests and small embedded use; the SQLite
//! store is the production backend.

use serde_json::Value;

use crate::entry::{DocumentId, LogEntry, VersionId};

use super::{HistoryStore, NodeId, PersistedNode, StoreError};

#[derive(Debug, Clone)]
struct Row {
    node: PersistedNode,
    ts_us: i64,
    author: String,
    payload: Value,
}

/// Vec-backed [`HistoryStore`] with snapshot rollback.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Vec<Row>,
    next_id: NodeId,
    snapshot: Option<(Vec<Row>, NodeId)>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of persisted nodes across all documents.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.rows.len()
    }

    fn row_mut(&mut self, id: NodeId) -> Result<&mut Row, StoreError> {
        self.rows
            .iter_mut()
            .find(|row| row.node.id == id)
            .ok_or(StoreError::UnknownNode(id))
    }

    fn require_txn(&self) -> Result<(), StoreError> {
        if self.snapshot.is_none() {
            return Err(StoreError::NoTransaction);
        }
        Ok(())
    }
}

impl HistoryStore for MemoryStore {
    fn begin(&mut self) -> Result<(), StoreError> {
        if self.snapshot.is_some() {
            return Err(StoreError::NestedTransaction);
        }
        self.snapshot = Some((self.rows.clone(), self.next_id));
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.require_txn()?;
        self.snapshot = None;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        let Some((rows, next_id)) = self.snapshot.take() else {
            return Err(StoreError::NoTransaction);
        };
        self.rows = rows;
        self.next_id = next_id;
        Ok(())
    }

    fn insert_node(&mut self, entry: &LogEntry) -> Result<NodeId, StoreError> {
        self.require_txn()?;
        let id = self.next_id;
        self.next_id += 1;
        self.rows.push(Row {
            node: PersistedNode {
                id,
                document_id: entry.document_id.clone(),
                entry_hash: entry.entry_hash.clone(),
                parent_entry_hash: entry.parent_entry_hash.clone(),
                owned_version_id: entry.owned_version_id,
            },
            ts_us: entry.ts_us,
            author: entry.author.clone(),
            payload: entry.payload.clone(),
        });
        Ok(id)
    }

    fn update_owned_version(
        &mut self,
        id: NodeId,
        version: Option<VersionId>,
    ) -> Result<(), StoreError> {
        self.require_txn()?;
        self.row_mut(id)?.node.owned_version_id = version;
        Ok(())
    }

    fn load_nodes(&self, document_id: &DocumentId) -> Result<Vec<PersistedNode>, StoreError> {
        Ok(self
            .rows
            .iter()
            .filter(|row| &row.node.document_id == document_id)
            .map(|row| row.node.clone())
            .collect())
    }

    fn delete_nodes(&mut self, ids: &[NodeId]) -> Result<(), StoreError> {
        self.require_txn()?;
        for &id in ids {
            if !self.rows.iter().any(|row| row.node.id == id) {
                return Err(StoreError::UnknownNode(id));
            }
        }
        self.rows.retain(|row| !ids.contains(&row.node.id));
        Ok(())
    }

    fn document_for_version(
        &self,
        version: VersionId,
    ) -> Result<Option<DocumentId>, StoreError> {
        Ok(self
            .rows
            .iter()
            .find(|row| row.node.owned_version_id == Some(version))
            .map(|row| row.node.document_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{SENTINEL_HASH, stamp_entry_hash};
    use serde_json::json;

    fn doc() -> DocumentId {
        DocumentId::new("doc-mem").expect("valid id")
    }

    fn entry(parent: &str, seq: i64) -> LogEntry {
        let mut entry = LogEntry {
            entry_hash: String::new(),
            parent_entry_hash: parent.to_owned(),
            document_id: doc(),
            ts_us: seq,
            author: "tester".into(),
            payload: json!({"seq": seq}),
            owned_version_id: None,
        };
        stamp_entry_hash(&mut entry);
        entry
    }

    #[test]
    fn mutations_require_a_transaction() {
        let mut store = MemoryStore::new();
        let head = entry(SENTINEL_HASH, 0);
        assert!(matches!(
            store.insert_node(&head),
            Err(StoreError::NoTransaction)
        ));
        assert!(matches!(store.commit(), Err(StoreError::NoTransaction)));
        assert!(matches!(store.rollback(), Err(StoreError::NoTransaction)));
    }

    #[test]
    fn begin_twice_is_rejected() {
        let mut store = MemoryStore::new();
        store.begin().expect("begin");
        assert!(matches!(store.begin(), Err(StoreError::NestedTransaction)));
    }

    #[test]
    fn insert_assigns_monotonic_ids() {
        let mut store = MemoryStore::new();
        store.begin().expect("begin");
        let head = entry(SENTINEL_HASH, 0);
        let next = entry(&head.entry_hash, 1);
        let a = store.insert_node(&head).expect("insert");
        let b = store.insert_node(&next).expect("insert");
        assert!(b > a);
        store.commit().expect("commit");
        assert_eq!(store.node_count(), 2);
    }

    #[test]
    fn rollback_restores_rows_and_ids() {
        let mut store = MemoryStore::new();
        store.begin().expect("begin");
        let head = entry(SENTINEL_HASH, 0);
        let first_id = store.insert_node(&head).expect("insert");
        store.commit().expect("commit");

        store.begin().expect("begin");
        let next = entry(&head.entry_hash, 1);
        store.insert_node(&next).expect("insert");
        store.rollback().expect("rollback");
        assert_eq!(store.node_count(), 1);

        // Ids restart from the snapshot point but never collide with
        // surviving rows.
        store.begin().expect("begin");
        let other = entry(&head.entry_hash, 2);
        let new_id = store.insert_node(&other).expect("insert");
        assert!(new_id > first_id);
        store.commit().expect("commit");
    }

    #[test]
    fn version_lookup_and_tag_updates() {
        let mut store = MemoryStore::new();
        store.begin().expect("begin");
        let mut head = entry(SENTINEL_HASH, 0);
        head.owned_version_id = Some(VersionId::new(7));
        let id = store.insert_node(&head).expect("insert");
        store.commit().expect("commit");

        assert_eq!(
            store
                .document_for_version(VersionId::new(7))
                .expect("lookup"),
            Some(doc())
        );

        store.begin().expect("begin");
        store
            .update_owned_version(id, None)
            .expect("clear tag");
        store.commit().expect("commit");
        assert_eq!(
            store
                .document_for_version(VersionId::new(7))
                .expect("lookup"),
            None
        );
    }

    #[test]
    fn delete_unknown_id_fails_cleanly() {
        let mut store = MemoryStore::new();
        store.begin().expect("begin");
        assert!(matches!(
            store.delete_nodes(&[42]),
            Err(StoreError::UnknownNode(42))
        ));
    }
}
