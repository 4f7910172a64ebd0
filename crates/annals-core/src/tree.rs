//! In-memory version tree: branching history reconstruction and mutation.
//!
//! All revisions of one logical document share a single tree of change-log
//! entries, keyed by entry hash. Histories that share a prefix share those
//! nodes; they diverge into branches below the last common entry. The tree
//! is rooted at a synthetic sentinel ("before any entry") whose hash and
//! parent hash are both [`SENTINEL_HASH`].
//!
//! # Representation
//!
//! An arena: nodes live in a `Vec`, linked by index. Child lookup is an
//! O(1) map from child entry hash to index on each node, and every node
//! except the sentinel keeps a parent back-index. No embedded references,
//! so there is never ambiguity about who owns a node.
//!
//! # Mutation discipline
//!
//! Nodes are only ever added (by the merge walk) — deletion is *planned*
//! here ([`VersionTree::deletion_plan`]) but applied through the store,
//! after which callers reconstruct. That keeps the arena free of holes.

use std::collections::HashMap;

use crate::entry::{DocumentId, LogEntry, SENTINEL_HASH, VersionId};
use crate::error::StructuralError;
use crate::store::{NodeId, PersistedNode};

// ---------------------------------------------------------------------------
// Handles and nodes
// ---------------------------------------------------------------------------

/// Handle to a node in one [`VersionTree`]'s arena.
///
/// Only meaningful for the tree that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeIdx(usize);

/// One node of the version tree.
#[derive(Debug, Clone)]
pub struct TreeNode {
    /// Storage id; `None` only for the sentinel root.
    pub id: Option<NodeId>,
    /// Declared fingerprint of the underlying entry.
    pub entry_hash: String,
    /// Fingerprint of the parent entry ([`SENTINEL_HASH`] under the root).
    pub parent_entry_hash: String,
    /// Version whose import made this node the head of its branch, if any.
    pub owned_version_id: Option<VersionId>,
    parent: Option<NodeIdx>,
    children: HashMap<String, NodeIdx>,
}

impl TreeNode {
    /// Number of direct children.
    #[must_use]
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Whether this node has no children.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Deletion planning
// ---------------------------------------------------------------------------

/// What deleting one version's log amounts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionPlan {
    /// The owned node still has descendants in use by other versions:
    /// clear its tag, keep the chain.
    Untag(NodeIdx),
    /// Remove these nodes, ordered leaf to ancestor. Everything else —
    /// shared prefixes, other branches, other versions' tags — survives.
    Remove(Vec<NodeIdx>),
}

// ---------------------------------------------------------------------------
// VersionTree
// ---------------------------------------------------------------------------

/// Branching change history of one logical document.
#[derive(Debug, Clone)]
pub struct VersionTree {
    document_id: DocumentId,
    /// Arena; index 0 is always the sentinel.
    nodes: Vec<TreeNode>,
}

impl VersionTree {
    /// Handle to the sentinel root.
    pub const ROOT: NodeIdx = NodeIdx(0);

    /// Create a tree containing only the sentinel.
    #[must_use]
    pub fn new(document_id: DocumentId) -> Self {
        Self {
            document_id,
            nodes: vec![TreeNode {
                id: None,
                entry_hash: SENTINEL_HASH.to_owned(),
                parent_entry_hash: SENTINEL_HASH.to_owned(),
                owned_version_id: None,
                parent: None,
                children: HashMap::new(),
            }],
        }
    }

    /// Reconstruct the tree from every persisted node of a document.
    ///
    /// Nodes may arrive in any order. Each non-root node is attached under
    /// its parent by hash; nodes declaring the sentinel attach under the
    /// root.
    ///
    /// # Errors
    ///
    /// - [`StructuralError::OrphanNode`] when a node's parent hash is
    ///   absent from the set, or when a node is unreachable from the
    ///   sentinel (a parent loop never reaches the root). Corruption is
    ///   never silently dropped.
    /// - [`StructuralError::ChildHashCollision`] when two loaded nodes
    ///   claim the same (parent, hash) slot.
    pub fn from_persisted(
        document_id: DocumentId,
        persisted: &[PersistedNode],
    ) -> Result<Self, StructuralError> {
        let mut tree = Self::new(document_id);

        // Phase 1: materialize arena nodes and the hash → index map.
        let mut by_hash: HashMap<&str, NodeIdx> = HashMap::with_capacity(persisted.len() + 1);
        by_hash.insert(SENTINEL_HASH, Self::ROOT);
        for node in persisted {
            let idx = NodeIdx(tree.nodes.len());
            tree.nodes.push(TreeNode {
                id: Some(node.id),
                entry_hash: node.entry_hash.clone(),
                parent_entry_hash: node.parent_entry_hash.clone(),
                owned_version_id: node.owned_version_id,
                parent: None,
                children: HashMap::new(),
            });
            if by_hash.insert(&node.entry_hash, idx).is_some() {
                // Same hash twice means two rows claim one chain position.
                return Err(StructuralError::ChildHashCollision {
                    parent_hash: node.parent_entry_hash.clone(),
                    child_hash: node.entry_hash.clone(),
                });
            }
        }

        // Phase 2: link children under parents.
        for raw in persisted {
            let Some(&idx) = by_hash.get(raw.entry_hash.as_str()) else {
                continue; // unreachable: phase 1 inserted every hash
            };
            let Some(&parent_idx) = by_hash.get(raw.parent_entry_hash.as_str()) else {
                return Err(StructuralError::OrphanNode {
                    document_id: tree.document_id,
                    entry_hash: raw.entry_hash.clone(),
                    parent_hash: raw.parent_entry_hash.clone(),
                });
            };
            tree.nodes[idx.0].parent = Some(parent_idx);
            if tree.nodes[parent_idx.0]
                .children
                .insert(raw.entry_hash.clone(), idx)
                .is_some()
            {
                return Err(StructuralError::ChildHashCollision {
                    parent_hash: raw.parent_entry_hash.clone(),
                    child_hash: raw.entry_hash.clone(),
                });
            }
        }

        // Phase 3: every node must be reachable from the sentinel. A parent
        // loop disconnected from the root passes phase 2 but not this.
        let reachable = tree.subtree_size(Self::ROOT);
        if reachable != tree.nodes.len() {
            let unreached = tree
                .nodes
                .iter()
                .skip(1)
                .find(|n| !tree.is_reachable_from_root(n))
                .map(|n| (n.entry_hash.clone(), n.parent_entry_hash.clone()))
                .unwrap_or_default();
            return Err(StructuralError::OrphanNode {
                document_id: tree.document_id,
                entry_hash: unreached.0,
                parent_hash: unreached.1,
            });
        }

        Ok(tree)
    }

    fn is_reachable_from_root(&self, node: &TreeNode) -> bool {
        let mut current = node.parent;
        let mut steps = 0usize;
        while let Some(idx) = current {
            if idx == Self::ROOT {
                return true;
            }
            current = self.nodes[idx.0].parent;
            steps += 1;
            if steps > self.nodes.len() {
                return false; // parent loop
            }
        }
        false
    }

    /// The document this tree belongs to.
    #[must_use]
    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    /// Borrow a node by handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle came from a different tree and is out of range.
    #[must_use]
    pub fn node(&self, idx: NodeIdx) -> &TreeNode {
        &self.nodes[idx.0]
    }

    /// Number of real entries in the tree (the sentinel is not counted).
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.nodes.len() - 1
    }

    /// O(1): whether `idx` has a direct child with the given hash.
    #[must_use]
    pub fn has_child(&self, idx: NodeIdx, entry_hash: &str) -> bool {
        self.nodes[idx.0].children.contains_key(entry_hash)
    }

    /// O(1): direct child of `idx` with the given hash.
    #[must_use]
    pub fn child(&self, idx: NodeIdx, entry_hash: &str) -> Option<NodeIdx> {
        self.nodes[idx.0].children.get(entry_hash).copied()
    }

    /// Attach a newly persisted entry under `parent`.
    ///
    /// The node's parent hash is taken from the parent node, not from the
    /// entry — the merge walk guarantees they agree, and the tree is the
    /// authority on structure.
    ///
    /// # Errors
    ///
    /// [`StructuralError::ChildHashCollision`] if `parent` already has a
    /// child with this hash.
    pub fn insert(
        &mut self,
        parent: NodeIdx,
        id: NodeId,
        entry: &LogEntry,
    ) -> Result<NodeIdx, StructuralError> {
        if self.has_child(parent, &entry.entry_hash) {
            return Err(StructuralError::ChildHashCollision {
                parent_hash: self.nodes[parent.0].entry_hash.clone(),
                child_hash: entry.entry_hash.clone(),
            });
        }
        let idx = NodeIdx(self.nodes.len());
        let parent_entry_hash = self.nodes[parent.0].entry_hash.clone();
        self.nodes.push(TreeNode {
            id: Some(id),
            entry_hash: entry.entry_hash.clone(),
            parent_entry_hash,
            owned_version_id: entry.owned_version_id,
            parent: Some(parent),
            children: HashMap::new(),
        });
        self.nodes[parent.0]
            .children
            .insert(entry.entry_hash.clone(), idx);
        Ok(idx)
    }

    /// Set or clear a node's owned version tag.
    pub fn set_owned_version(&mut self, idx: NodeIdx, version: Option<VersionId>) {
        self.nodes[idx.0].owned_version_id = version;
    }

    /// Count of nodes in `idx`'s subtree, including `idx` itself.
    #[must_use]
    pub fn subtree_size(&self, idx: NodeIdx) -> usize {
        let mut count = 0;
        let mut stack = vec![idx];
        while let Some(current) = stack.pop() {
            count += 1;
            stack.extend(self.nodes[current.0].children.values().copied());
        }
        count
    }

    /// Depth-first search for the node owned by `version`.
    #[must_use]
    pub fn find_version_entry(&self, version: VersionId) -> Option<NodeIdx> {
        let mut stack = vec![Self::ROOT];
        while let Some(current) = stack.pop() {
            if self.nodes[current.0].owned_version_id == Some(version) {
                return Some(current);
            }
            stack.extend(self.nodes[current.0].children.values().copied());
        }
        None
    }

    /// Compute what deleting `version`'s log amounts to, or `None` when the
    /// version owns no node in this tree.
    ///
    /// If the owned node still has children, other versions' histories run
    /// through it: the plan clears the tag and keeps every node. Otherwise
    /// the plan removes the owned leaf and walks rootward, taking each
    /// ancestor that has no other branch and no version tag of its own,
    /// stopping at the first ancestor shared with another version (or at
    /// the sentinel).
    #[must_use]
    pub fn deletion_plan(&self, version: VersionId) -> Option<DeletionPlan> {
        let owned = self.find_version_entry(version)?;

        if !self.nodes[owned.0].is_leaf() {
            return Some(DeletionPlan::Untag(owned));
        }

        let mut remove = vec![owned];
        let mut current = owned;
        while let Some(parent) = self.nodes[current.0].parent {
            if parent == Self::ROOT
                || self.nodes[parent.0].child_count() > 1
                || self.nodes[parent.0].owned_version_id.is_some()
            {
                break;
            }
            remove.push(parent);
            current = parent;
        }
        Some(DeletionPlan::Remove(remove))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
