//! annals-core: hash-chain verification and version-tree merge engine.
//!
//! Ingests per-document change-history logs produced by an external
//! authoring tool and merges them into a tamper-evident, multi-version
//! history store shared by all revisions of the same logical document.
//!
//! # Pipeline
//!
//! 1. A [`source::LogSource`] hands out parsed [`entry::LogEntry`] records,
//!    newest first; the orchestrator buffers and reverses.
//! 2. [`verify::verify_chain`] recomputes entry hashes, checks chain
//!    linkage, and accumulates the end-to-end [`verify::RootDigest`].
//! 3. [`import::Importer`] walks the document's [`tree::VersionTree`],
//!    persisting only the suffix not already present, inside one
//!    [`store::HistoryStore`] transaction.
//! 4. The accumulated digest is compared against the trailing value the
//!    log declares.
//!
//! How strictly inconsistencies are treated is decided in exactly one
//! place: [`policy::IntegrityPolicy`].

pub mod canonical;
pub mod config;
pub mod entry;
pub mod error;
pub mod import;
pub mod policy;
pub mod source;
pub mod store;
pub mod tree;
pub mod verify;

pub use entry::{DocumentId, LogEntry, SENTINEL_HASH, VersionId};
pub use error::{ErrorCode, HistoryError, IntegrityViolation, StructuralError};
pub use import::{Importer, NoSiblings, VersionCatalog};
pub use policy::{IntegrityLevel, IntegrityPolicy};
pub use source::{LogSource, MemorySource, ParseError};
pub use store::{HistoryStore, MemoryStore, NodeId, PersistedNode, StoreError};
pub use tree::{DeletionPlan, NodeIdx, TreeNode, VersionTree};
pub use verify::RootDigest;
