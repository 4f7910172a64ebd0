//! Parse-source collaborator contract.
//!
//! A [`LogSource`] hands out parsed records one at a time, newest first —
//! the order authoring tools write their change logs in. The orchestrator
//! buffers and reverses; sources are single-pass and never asked to.
//!
//! The wire format behind a source is out of scope here. [`MemorySource`]
//! is the in-crate reference implementation, used by tests and by callers
//! that already hold parsed records.

use crate::entry::LogEntry;
use crate::verify::RootDigest;

/// A parse failure from the underlying log. Always fatal — a record that
/// cannot be parsed leaves no way to know what the chain claims.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseError {
    /// A record could not be decoded. `position` counts from the newest
    /// record, zero-based.
    #[error("malformed record at position {position}: {details}")]
    MalformedRecord { position: usize, details: String },

    /// The log could not be read at all.
    #[error("log source unreadable: {0}")]
    Unreadable(String),
}

/// Supplier of parsed change-log records, newest first.
pub trait LogSource {
    /// Parse and return the next record, or `None` once drained.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] for malformed input; the caller treats this
    /// as fatal regardless of integrity level.
    fn next_entry(&mut self) -> Result<Option<LogEntry>, ParseError>;

    /// The end-to-end digest the log declares after its last record, if any.
    fn trailing_digest(&self) -> Option<&str>;

    /// Release underlying resources. Called exactly once after draining,
    /// including on the error path.
    fn close(&mut self) {}
}

/// In-memory source over already-parsed entries.
#[derive(Debug)]
pub struct MemorySource {
    /// Remaining entries, oldest first; served by popping from the back.
    entries: Vec<LogEntry>,
    trailing_digest: Option<String>,
}

impl MemorySource {
    /// Build a source from chronologically ordered entries with a
    /// self-consistent trailing digest.
    #[must_use]
    pub fn from_chronological(entries: Vec<LogEntry>) -> Self {
        let mut digest = RootDigest::new();
        for entry in &entries {
            digest.fold(&entry.entry_hash);
        }
        let trailing_digest = if entries.is_empty() {
            None
        } else {
            Some(digest.finish())
        };
        Self {
            entries,
            trailing_digest,
        }
    }

    /// Build a source declaring an explicit (possibly wrong or absent)
    /// trailing digest. Tamper-detection tests use this.
    #[must_use]
    pub fn with_trailing_digest(
        entries: Vec<LogEntry>,
        trailing_digest: Option<String>,
    ) -> Self {
        Self {
            entries,
            trailing_digest,
        }
    }
}

impl LogSource for MemorySource {
    fn next_entry(&mut self) -> Result<Option<LogEntry>, ParseError> {
        Ok(self.entries.pop())
    }

    fn trailing_digest(&self) -> Option<&str> {
        self.trailing_digest.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{stamp_entry_hash, DocumentId, SENTINEL_HASH};
    use serde_json::json;

    fn chain(len: usize) -> Vec<LogEntry> {
        let mut out: Vec<LogEntry> = Vec::with_capacity(len);
        for i in 0..len {
            let parent = out
                .last()
                .map_or_else(|| SENTINEL_HASH.to_owned(), |e| e.entry_hash.clone());
            let mut entry = LogEntry {
                entry_hash: String::new(),
                parent_entry_hash: parent,
                document_id: DocumentId::new("doc-src").expect("valid id"),
                ts_us: 1_000_000 + i as i64,
                author: "tester".into(),
                payload: json!({"seq": i}),
                owned_version_id: None,
            };
            stamp_entry_hash(&mut entry);
            out.push(entry);
        }
        out
    }

    #[test]
    fn serves_newest_first() {
        let entries = chain(3);
        let newest = entries[2].entry_hash.clone();
        let oldest = entries[0].entry_hash.clone();

        let mut source = MemorySource::from_chronological(entries);
        let first = source.next_entry().expect("ok").expect("some");
        assert_eq!(first.entry_hash, newest);
        source.next_entry().expect("ok").expect("some");
        let last = source.next_entry().expect("ok").expect("some");
        assert_eq!(last.entry_hash, oldest);
        assert!(source.next_entry().expect("ok").is_none());
    }

    #[test]
    fn empty_source_has_no_digest() {
        let mut source = MemorySource::from_chronological(vec![]);
        assert!(source.trailing_digest().is_none());
        assert!(source.next_entry().expect("ok").is_none());
    }

    #[test]
    fn digest_matches_fold_of_chronological_hashes() {
        let entries = chain(4);
        let mut digest = RootDigest::new();
        for entry in &entries {
            digest.fold(&entry.entry_hash);
        }
        let source = MemorySource::from_chronological(entries);
        assert_eq!(source.trailing_digest(), Some(digest.finish().as_str()));
    }
}
