//! Merge orchestrator.
//!
//! Drives one import (or deletion) at a time: prerequisite checks, drain
//! and verify the parsed entries, walk the version tree persisting only the
//! suffix not already present, then validate the end-to-end root digest —
//! all inside a single store transaction, so a fatal error anywhere leaves
//! previously committed versions untouched.
//!
//! Imports of the same document are not safe to run concurrently; the
//! caller serializes them (one import per document id at a time).

use tracing::{debug, warn};

use crate::entry::{DocumentId, LogEntry, VersionId};
use crate::error::{HistoryError, IntegrityViolation, StructuralError};
use crate::policy::{IntegrityLevel, IntegrityPolicy};
use crate::source::LogSource;
use crate::store::{HistoryStore, NodeId, StoreError};
use crate::tree::{DeletionPlan, VersionTree};
use crate::verify::{RootDigest, check_root_digest, verify_chain};

// ---------------------------------------------------------------------------
// Version catalog collaborator
// ---------------------------------------------------------------------------

/// External knowledge about which sibling revisions of a document exist.
///
/// The store only knows about persisted history nodes; whether *other*
/// versions of a document exist at all is the document system's business.
pub trait VersionCatalog {
    /// Whether any version of `document_id` other than `excluding` exists
    /// and is expected to carry history.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the catalog backend fails.
    fn has_other_versions(
        &self,
        document_id: &DocumentId,
        excluding: VersionId,
    ) -> Result<bool, StoreError>;
}

/// Catalog for deployments importing isolated documents: reports no
/// siblings, so the sibling-history prerequisite never triggers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSiblings;

impl VersionCatalog for NoSiblings {
    fn has_other_versions(
        &self,
        _document_id: &DocumentId,
        _excluding: VersionId,
    ) -> Result<bool, StoreError> {
        Ok(false)
    }
}

// ---------------------------------------------------------------------------
// Importer
// ---------------------------------------------------------------------------

/// Caller-facing operation surface over one store and one policy.
pub struct Importer<'a, S, C> {
    store: &'a mut S,
    catalog: &'a C,
    policy: IntegrityPolicy,
}

impl<'a, S: HistoryStore, C: VersionCatalog> Importer<'a, S, C> {
    /// Build an importer. The policy is injected, never ambient, so tests
    /// can run permissive and strict configurations deterministically.
    #[must_use]
    pub fn new(store: &'a mut S, catalog: &'a C, policy: IntegrityPolicy) -> Self {
        Self {
            store,
            catalog,
            policy,
        }
    }

    /// Import one version's change log into the document's shared history.
    ///
    /// Returns the number of newly persisted entries. Entries already
    /// recorded by an earlier version's import are advanced over, not
    /// duplicated. `source` and `document_id` are optional because their
    /// absence is the policy-gated "missing evidence" case: tolerated
    /// below [`IntegrityLevel::Strict`] with a result of 0.
    ///
    /// # Errors
    ///
    /// [`StructuralError`] and parse failures are always fatal;
    /// [`IntegrityViolation`] is fatal per the configured policy. Any
    /// fatal error rolls the transaction back.
    pub fn import_log<L: LogSource>(
        &mut self,
        source: Option<L>,
        document_id: Option<&DocumentId>,
        version_id: VersionId,
    ) -> Result<u64, HistoryError> {
        let Some(mut source) = source else {
            self.policy.report_or_fail(
                IntegrityViolation::MissingLog { version_id },
                IntegrityLevel::Strict,
            )?;
            return Ok(0);
        };
        let Some(document_id) = document_id else {
            self.policy.report_or_fail(
                IntegrityViolation::MissingDocumentId { version_id },
                IntegrityLevel::Strict,
            )?;
            return Ok(0);
        };

        let mut tree = self.build_tree(document_id)?;

        // Other versions exist but none left a trace here: their audit
        // history is gone, so this import cannot be trusted either.
        if tree.subtree_size(VersionTree::ROOT) <= 1
            && self.catalog.has_other_versions(document_id, version_id)?
        {
            self.policy.report_or_fail(
                IntegrityViolation::MissingSiblingHistory {
                    document_id: document_id.clone(),
                },
                IntegrityLevel::HashChecked,
            )?;
            return Ok(0);
        }

        // Drain the source (newest first), then reverse into chronological
        // order. The source is single-pass; buffering happens here.
        let declared_digest = source.trailing_digest().map(str::to_owned);
        let mut entries = Vec::new();
        let drained = Self::drain(&mut source, &mut entries);
        source.close();
        drained?;
        entries.reverse();

        if entries.is_empty() {
            debug!(document = %document_id, version = %version_id, "change log has no entries");
            return Ok(0);
        }

        let digest = verify_chain(&entries, &self.policy)?;

        // The most recent entry becomes this version's terminal node.
        if let Some(last) = entries.last_mut() {
            last.owned_version_id = Some(version_id);
        }

        self.store.begin()?;
        let merged = self.merge_and_check(
            &mut tree,
            document_id,
            version_id,
            &entries,
            &digest,
            declared_digest.as_deref(),
        );
        match merged {
            Ok(persisted) => {
                self.store.commit()?;
                debug!(
                    document = %document_id,
                    version = %version_id,
                    persisted,
                    "change log imported"
                );
                Ok(persisted)
            }
            Err(err) => {
                self.abort(&err);
                Err(err)
            }
        }
    }

    /// Reconstruct the full branching history of a document from storage.
    ///
    /// # Errors
    ///
    /// [`StructuralError::OrphanNode`] on corrupt persisted linkage;
    /// [`StoreError`] on backend failure.
    pub fn build_tree(&self, document_id: &DocumentId) -> Result<VersionTree, HistoryError> {
        let nodes = self.store.load_nodes(document_id)?;
        Ok(VersionTree::from_persisted(document_id.clone(), &nodes)?)
    }

    /// Delete one version's log, preserving ancestry still referenced by
    /// sibling versions.
    ///
    /// A version that owns no persisted node is a no-op.
    ///
    /// # Errors
    ///
    /// [`StructuralError`] on corrupt persisted linkage; [`StoreError`] on
    /// backend failure. Either rolls the transaction back.
    pub fn delete_version_log(&mut self, version_id: VersionId) -> Result<(), HistoryError> {
        let Some(document_id) = self.store.document_for_version(version_id)? else {
            debug!(version = %version_id, "version owns no persisted history");
            return Ok(());
        };
        let tree = self.build_tree(&document_id)?;
        let Some(plan) = tree.deletion_plan(version_id) else {
            return Ok(());
        };

        self.store.begin()?;
        let applied = self.apply_deletion(&tree, &plan);
        match applied {
            Ok(()) => {
                self.store.commit()?;
                debug!(document = %document_id, version = %version_id, "version log deleted");
                Ok(())
            }
            Err(err) => {
                self.abort(&err);
                Err(err)
            }
        }
    }

    /// Delete every persisted entry of a document, all versions included.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on backend failure; rolls the transaction back.
    pub fn delete_all_logs_for_document(
        &mut self,
        document_id: &DocumentId,
    ) -> Result<(), HistoryError> {
        let nodes = self.store.load_nodes(document_id)?;
        if nodes.is_empty() {
            return Ok(());
        }
        let ids: Vec<NodeId> = nodes.iter().map(|n| n.id).collect();

        self.store.begin()?;
        let deleted = self.store.delete_nodes(&ids).map_err(HistoryError::from);
        match deleted {
            Ok(()) => {
                self.store.commit()?;
                debug!(document = %document_id, count = ids.len(), "document history deleted");
                Ok(())
            }
            Err(err) => {
                self.abort(&err);
                Err(err)
            }
        }
    }

    // -------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------

    fn drain<L: LogSource>(
        source: &mut L,
        entries: &mut Vec<LogEntry>,
    ) -> Result<(), HistoryError> {
        while let Some(entry) = source.next_entry()? {
            entries.push(entry);
        }
        Ok(())
    }

    /// The transactional middle of an import: walk the tree consuming the
    /// chronological sequence, persist the missing suffix, re-tag on a
    /// fully duplicate history, then validate the root digest.
    fn merge_and_check(
        &mut self,
        tree: &mut VersionTree,
        document_id: &DocumentId,
        version_id: VersionId,
        entries: &[LogEntry],
        digest: &RootDigest,
        declared_digest: Option<&str>,
    ) -> Result<u64, HistoryError> {
        let mut position = VersionTree::ROOT;
        let mut persisted: u64 = 0;

        for entry in entries {
            if let Some(next) = tree.child(position, &entry.entry_hash) {
                // Already recorded by a prior version's import.
                position = next;
                continue;
            }

            // A document's first entry is invariant across all versions:
            // forking directly under the sentinel is corruption, not a
            // branch.
            if position == VersionTree::ROOT && !tree.node(position).is_leaf() {
                return Err(StructuralError::FirstEntryMismatch {
                    document_id: document_id.clone(),
                    incoming_hash: entry.entry_hash.clone(),
                }
                .into());
            }

            let id = self.store.insert_node(entry)?;
            position = tree.insert(position, id, entry)?;
            persisted += 1;
        }

        if persisted == 0 {
            // The whole history already existed from an earlier import.
            // Move the version tag onto the existing terminal node so the
            // version stays discoverable (an update, not an insert).
            debug_assert!(position != VersionTree::ROOT, "entries were non-empty");
            if let Some(id) = tree.node(position).id {
                self.store.update_owned_version(id, Some(version_id))?;
                tree.set_owned_version(position, Some(version_id));
            }
        }

        check_root_digest(digest, declared_digest, &self.policy)?;
        Ok(persisted)
    }

    fn apply_deletion(
        &mut self,
        tree: &VersionTree,
        plan: &DeletionPlan,
    ) -> Result<(), HistoryError> {
        match plan {
            DeletionPlan::Untag(idx) => {
                if let Some(id) = tree.node(*idx).id {
                    self.store.update_owned_version(id, None)?;
                }
                Ok(())
            }
            DeletionPlan::Remove(indices) => {
                let ids: Vec<NodeId> =
                    indices.iter().filter_map(|idx| tree.node(*idx).id).collect();
                self.store.delete_nodes(&ids)?;
                Ok(())
            }
        }
    }

    /// Roll back after a fatal error; a rollback failure is logged, the
    /// original error wins.
    fn abort(&mut self, cause: &HistoryError) {
        if let Err(rollback_err) = self.store.rollback() {
            warn!(
                code = %cause.code(),
                "rollback failed after fatal error: {rollback_err}"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests (scenario coverage lives in tests/)
// ---------------------------------------------------------------------------
