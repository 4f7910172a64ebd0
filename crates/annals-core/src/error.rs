//! Error taxonomy for history import, reconstruction, and deletion.
//!
//! Three failure families, matching how they propagate:
//!
//! - [`StructuralError`] — the persisted or incoming chain itself is broken.
//!   Always fatal, never policy-gated.
//! - [`IntegrityViolation`] — missing evidence or a hash mismatch. Routed
//!   through the integrity policy; fatal only at or above its threshold.
//! - Parse and store failures from collaborators — always fatal, wrapped
//!   into [`HistoryError`].

use crate::entry::{DocumentId, VersionId};
use crate::source::ParseError;
use crate::store::StoreError;

// ---------------------------------------------------------------------------
// Machine-readable error codes
// ---------------------------------------------------------------------------

/// Stable machine-readable codes for every failure the engine can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    BrokenChain,
    ChildHashCollision,
    OrphanNode,
    FirstEntryMismatch,
    EntryHashMismatch,
    RootDigestMismatch,
    MissingTrailingDigest,
    MissingLog,
    MissingDocumentId,
    MissingSiblingHistory,
    ParseFailure,
    StoreFailure,
}

impl ErrorCode {
    /// Stable `E####` identifier for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::BrokenChain => "E1001",
            Self::ChildHashCollision => "E1002",
            Self::OrphanNode => "E1003",
            Self::FirstEntryMismatch => "E1004",
            Self::EntryHashMismatch => "E2001",
            Self::RootDigestMismatch => "E2002",
            Self::MissingTrailingDigest => "E2003",
            Self::MissingLog => "E2004",
            Self::MissingDocumentId => "E2005",
            Self::MissingSiblingHistory => "E2006",
            Self::ParseFailure => "E5001",
            Self::StoreFailure => "E5002",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::BrokenChain => "Chain linkage broken",
            Self::ChildHashCollision => "Duplicate child hash in version tree",
            Self::OrphanNode => "Persisted node has unresolvable parent",
            Self::FirstEntryMismatch => "First entry differs across versions",
            Self::EntryHashMismatch => "Entry hash mismatch",
            Self::RootDigestMismatch => "Root digest mismatch",
            Self::MissingTrailingDigest => "Trailing root digest missing",
            Self::MissingLog => "Change log missing",
            Self::MissingDocumentId => "Document id missing",
            Self::MissingSiblingHistory => "Sibling versions lack history",
            Self::ParseFailure => "Change log parse failure",
            Self::StoreFailure => "Persistence failure",
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::BrokenChain | Self::FirstEntryMismatch => {
                Some("The log or store is corrupt; re-export the document history.")
            }
            Self::OrphanNode | Self::ChildHashCollision => {
                Some("Delete and re-import this document's history.")
            }
            Self::EntryHashMismatch | Self::RootDigestMismatch => {
                Some("Lower the integrity level only if this log predates hashing.")
            }
            Self::MissingTrailingDigest
            | Self::MissingLog
            | Self::MissingDocumentId
            | Self::MissingSiblingHistory => None,
            Self::ParseFailure => Some("The log file is malformed; check the exporting tool."),
            Self::StoreFailure => Some("Check storage availability and permissions."),
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

// ---------------------------------------------------------------------------
// Structural errors — always fatal
// ---------------------------------------------------------------------------

/// Corruption of the chain or tree structure itself.
///
/// These are never tolerated at any integrity level: continuing past one
/// would let a malformed history masquerade as a valid one.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StructuralError {
    /// An entry's declared parent does not match its predecessor.
    #[error(
        "chain linkage broken at {entry_hash}: declared parent {declared_parent}, \
         predecessor is {expected_parent}"
    )]
    BrokenChain {
        entry_hash: String,
        declared_parent: String,
        expected_parent: String,
    },

    /// An insert would create a second child with the same hash.
    #[error("node {parent_hash} already has a child {child_hash}")]
    ChildHashCollision {
        parent_hash: String,
        child_hash: String,
    },

    /// A persisted node's parent hash is absent from the loaded node set.
    #[error(
        "document {document_id}: node {entry_hash} references parent {parent_hash} \
         which is not persisted"
    )]
    OrphanNode {
        document_id: DocumentId,
        entry_hash: String,
        parent_hash: String,
    },

    /// A new version's first entry differs from the persisted history head.
    #[error(
        "document {document_id}: incoming first entry {incoming_hash} does not match \
         the persisted history head"
    )]
    FirstEntryMismatch {
        document_id: DocumentId,
        incoming_hash: String,
    },
}

impl StructuralError {
    /// The machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::BrokenChain { .. } => ErrorCode::BrokenChain,
            Self::ChildHashCollision { .. } => ErrorCode::ChildHashCollision,
            Self::OrphanNode { .. } => ErrorCode::OrphanNode,
            Self::FirstEntryMismatch { .. } => ErrorCode::FirstEntryMismatch,
        }
    }
}

// ---------------------------------------------------------------------------
// Integrity violations — policy-gated
// ---------------------------------------------------------------------------

/// Missing evidence or a hash mismatch, tolerable at low integrity levels.
#[derive(Debug, Clone, thiserror::Error)]
pub enum IntegrityViolation {
    /// The recomputed entry hash differs from the declared value.
    #[error("entry {entry_hash}: recomputed hash is {computed}")]
    EntryHashMismatch {
        entry_hash: String,
        computed: String,
    },

    /// The accumulated root digest differs from the trailing declared value.
    #[error("root digest mismatch: log declares {declared}, accumulated {computed}")]
    RootDigestMismatch { declared: String, computed: String },

    /// A non-empty log declared no trailing root digest.
    #[error("log declares no trailing root digest")]
    MissingTrailingDigest,

    /// No change log was supplied for the version being imported.
    #[error("no change log supplied for version {version_id}")]
    MissingLog { version_id: VersionId },

    /// No document id was supplied for the version being imported.
    #[error("no document id supplied for version {version_id}")]
    MissingDocumentId { version_id: VersionId },

    /// Sibling versions of the document exist but none has recorded history.
    #[error("sibling versions of document {document_id} have no recorded history")]
    MissingSiblingHistory { document_id: DocumentId },
}

impl IntegrityViolation {
    /// The machine-readable code for this violation.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::EntryHashMismatch { .. } => ErrorCode::EntryHashMismatch,
            Self::RootDigestMismatch { .. } => ErrorCode::RootDigestMismatch,
            Self::MissingTrailingDigest => ErrorCode::MissingTrailingDigest,
            Self::MissingLog { .. } => ErrorCode::MissingLog,
            Self::MissingDocumentId { .. } => ErrorCode::MissingDocumentId,
            Self::MissingSiblingHistory { .. } => ErrorCode::MissingSiblingHistory,
        }
    }
}

// ---------------------------------------------------------------------------
// Umbrella
// ---------------------------------------------------------------------------

/// Any failure surfaced by the caller-facing operations.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error(transparent)]
    Integrity(#[from] IntegrityViolation),

    #[error("change log parse failed: {0}")]
    Parse(#[from] ParseError),

    #[error("persistence failed: {0}")]
    Store(#[from] StoreError),
}

impl HistoryError {
    /// The machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Structural(err) => err.code(),
            Self::Integrity(err) => err.code(),
            Self::Parse(_) => ErrorCode::ParseFailure,
            Self::Store(_) => ErrorCode::StoreFailure,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
