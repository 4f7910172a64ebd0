//! Change-log entry model.
//!
//! A [`LogEntry`] is one parsed record from an authoring tool's per-document
//! change log. Entries form a hash chain: each entry's hash covers its own
//! content *and* its parent's hash, so modifying any entry invalidates every
//! later entry in the chain.
//!
//! - Hash format: `blake3:<lowercase hex>` (64 hex chars).
//! - The chain head declares [`SENTINEL_HASH`] as its parent.
//! - Two entries with equal `entry_hash` are the same entry, regardless of
//!   which log they were parsed from.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical::canonical_json;

/// Reserved parent value for the first entry of a document's history.
///
/// Also the `entry_hash` and `parent_entry_hash` of the synthetic tree root,
/// which represents "before any entry".
pub const SENTINEL_HASH: &str =
    "blake3:0000000000000000000000000000000000000000000000000000000000000000";

const HASH_PREFIX: &str = "blake3:";
const HASH_HEX_LEN: usize = 64;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Stable identifier shared by every version of one logical document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

/// Error from [`DocumentId::new`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid document id '{0}': must be non-empty without whitespace")]
pub struct InvalidDocumentId(String);

impl DocumentId {
    /// Validate and wrap a raw document identifier.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidDocumentId`] if the input is empty or contains
    /// whitespace.
    pub fn new(raw: impl Into<String>) -> Result<Self, InvalidDocumentId> {
        let raw = raw.into();
        if raw.is_empty() || raw.chars().any(char::is_whitespace) {
            return Err(InvalidDocumentId(raw));
        }
        Ok(Self(raw))
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one specific persisted revision of a document.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct VersionId(i64);

impl VersionId {
    /// Wrap a storage-assigned revision identifier.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// The raw identifier.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for VersionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// LogEntry
// ---------------------------------------------------------------------------

/// One parsed record of a document change log.
///
/// The immutable content fields (`ts_us`, `author`, `payload`) together with
/// `parent_entry_hash` determine `entry_hash`; see [`compute_entry_hash`].
/// `owned_version_id` is linkage state set during import: it marks the
/// chain's terminal entry for one persisted document version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Declared fingerprint of this entry, `blake3:<hex>`.
    pub entry_hash: String,

    /// Fingerprint of the preceding entry; [`SENTINEL_HASH`] for the head.
    pub parent_entry_hash: String,

    /// The logical document this entry belongs to.
    pub document_id: DocumentId,

    /// Wall-clock timestamp of the change, microseconds since Unix epoch.
    pub ts_us: i64,

    /// The acting user recorded by the authoring tool.
    pub author: String,

    /// Raw record body. Hashed in canonical JSON form.
    pub payload: Value,

    /// Version whose import made this entry the head of its branch, if any.
    pub owned_version_id: Option<VersionId>,
}

impl LogEntry {
    /// Whether this entry is the first of its document's history.
    #[must_use]
    pub fn is_chain_head(&self) -> bool {
        self.parent_entry_hash == SENTINEL_HASH
    }
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ts = chrono::DateTime::from_timestamp_micros(self.ts_us)
            .map_or_else(|| self.ts_us.to_string(), |dt| dt.to_rfc3339());
        write!(
            f,
            "{ts}\t{}\t{}\t{}",
            self.author, self.document_id, self.entry_hash,
        )
    }
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// Recompute an entry's fingerprint from its content and parent hash.
///
/// The hash input is the UTF-8 bytes of
/// `{ts_us}\t{author}\t{parent_entry_hash}\t{canonical_payload}\n`, so the
/// fingerprint commits to both the entry's own content and its position in
/// the chain. `owned_version_id` is linkage state and deliberately excluded.
#[must_use]
pub fn compute_entry_hash(entry: &LogEntry) -> String {
    let payload = canonical_json(&entry.payload);
    let input = format!(
        "{}\t{}\t{}\t{}\n",
        entry.ts_us, entry.author, entry.parent_entry_hash, payload,
    );
    format!("{HASH_PREFIX}{}", blake3::hash(input.as_bytes()))
}

/// Compute and store the fingerprint on a mutable entry.
///
/// Test helpers and sources that synthesize entries use this to produce
/// self-consistent chains.
pub fn stamp_entry_hash(entry: &mut LogEntry) {
    entry.entry_hash = compute_entry_hash(entry);
}

/// Whether a string has the expected `blake3:<64 lowercase hex>` shape.
#[must_use]
pub fn is_well_formed_hash(raw: &str) -> bool {
    raw.strip_prefix(HASH_PREFIX).is_some_and(|hex| {
        hex.len() == HASH_HEX_LEN
            && hex
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
