//! Hash-chain verification and the running root digest.
//!
//! Two distinct checks, with different severities:
//!
//! - **Linkage** — each entry's declared parent must be its predecessor's
//!   declared hash (the head declares the sentinel). A break means the log
//!   itself is malformed: always fatal.
//! - **Content** — each entry's hash is recomputed from its fields and
//!   compared to the declared value. Logs written before hashing was
//!   introduced legitimately mismatch, so this is gated through the
//!   integrity policy.
//!
//! Alongside both checks every declared hash is folded, in chronological
//! order, into a [`RootDigest`] — the end-to-end tamper check compared
//! against the trailing value the log declares.

use crate::entry::{LogEntry, SENTINEL_HASH, compute_entry_hash};
use crate::error::{HistoryError, IntegrityViolation, StructuralError};
use crate::policy::{IntegrityLevel, IntegrityPolicy};

/// Running digest over a log's entry hashes in chronological order.
///
/// Order-dependent by construction: feeding the same hashes in a different
/// order produces a different digest.
#[derive(Debug, Clone, Default)]
pub struct RootDigest {
    hasher: blake3::Hasher,
}

impl RootDigest {
    /// Start an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one entry hash into the running state.
    pub fn fold(&mut self, entry_hash: &str) {
        self.hasher.update(entry_hash.as_bytes());
        self.hasher.update(b"\n");
    }

    /// Encode the accumulated digest as `blake3:<hex>`.
    #[must_use]
    pub fn finish(&self) -> String {
        format!("blake3:{}", self.hasher.finalize())
    }
}

/// Verify a chronological entry sequence and accumulate its root digest.
///
/// Zero entries verify trivially and yield the empty accumulator.
///
/// # Errors
///
/// [`StructuralError::BrokenChain`] when linkage is malformed;
/// [`IntegrityViolation::EntryHashMismatch`] when a recomputed hash differs
/// and the policy is at or above [`IntegrityLevel::HashChecked`].
pub fn verify_chain(
    entries: &[LogEntry],
    policy: &IntegrityPolicy,
) -> Result<RootDigest, HistoryError> {
    let mut digest = RootDigest::new();
    let mut expected_parent: &str = SENTINEL_HASH;

    for entry in entries {
        if entry.parent_entry_hash != expected_parent {
            return Err(StructuralError::BrokenChain {
                entry_hash: entry.entry_hash.clone(),
                declared_parent: entry.parent_entry_hash.clone(),
                expected_parent: expected_parent.to_owned(),
            }
            .into());
        }

        let computed = compute_entry_hash(entry);
        if computed != entry.entry_hash {
            policy.report_or_fail(
                IntegrityViolation::EntryHashMismatch {
                    entry_hash: entry.entry_hash.clone(),
                    computed,
                },
                IntegrityLevel::HashChecked,
            )?;
        }

        // The digest folds declared hashes: it mirrors what the log claims,
        // and the trailing value was produced over the same claims.
        digest.fold(&entry.entry_hash);
        expected_parent = &entry.entry_hash;
    }

    Ok(digest)
}

/// Compare the accumulated digest against the log's trailing declaration.
///
/// # Errors
///
/// Policy-gated at [`IntegrityLevel::HashChecked`]: a missing declaration
/// reports [`IntegrityViolation::MissingTrailingDigest`], a differing one
/// [`IntegrityViolation::RootDigestMismatch`].
pub fn check_root_digest(
    digest: &RootDigest,
    declared: Option<&str>,
    policy: &IntegrityPolicy,
) -> Result<(), HistoryError> {
    match declared {
        None => policy.report_or_fail(
            IntegrityViolation::MissingTrailingDigest,
            IntegrityLevel::HashChecked,
        )?,
        Some(declared) => {
            let computed = digest.finish();
            if computed != declared {
                policy.report_or_fail(
                    IntegrityViolation::RootDigestMismatch {
                        declared: declared.to_owned(),
                        computed,
                    },
                    IntegrityLevel::HashChecked,
                )?;
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{DocumentId, stamp_entry_hash};
    use crate::error::ErrorCode;
    use serde_json::json;

    fn make_entry(parent: &str, seq: i64) -> LogEntry {
        let mut entry = LogEntry {
            entry_hash: String::new(),
            parent_entry_hash: parent.to_owned(),
            document_id: DocumentId::new("doc-verify").expect("valid id"),
            ts_us: 1_700_000_000_000_000 + seq,
            author: "editor".into(),
            payload: json!({"action": "edit", "seq": seq}),
            owned_version_id: None,
        };
        stamp_entry_hash(&mut entry);
        entry
    }

    fn make_chain(len: usize) -> Vec<LogEntry> {
        let mut out: Vec<LogEntry> = Vec::with_capacity(len);
        for i in 0..len {
            let parent = out
                .last()
                .map_or_else(|| SENTINEL_HASH.to_owned(), |e| e.entry_hash.clone());
            out.push(make_entry(&parent, i as i64));
        }
        out
    }

    fn strict() -> IntegrityPolicy {
        IntegrityPolicy::new(IntegrityLevel::Strict)
    }

    // -------------------------------------------------------------------
    // verify_chain
    // -------------------------------------------------------------------

    #[test]
    fn empty_sequence_verifies() {
        let digest = verify_chain(&[], &strict()).expect("empty chain is valid");
        // The empty accumulator still encodes to a well-formed digest.
        assert!(digest.finish().starts_with("blake3:"));
    }

    #[test]
    fn valid_chain_verifies_at_strict() {
        let entries = make_chain(5);
        verify_chain(&entries, &strict()).expect("self-consistent chain");
    }

    #[test]
    fn head_must_declare_sentinel_parent() {
        let mut entries = make_chain(2);
        entries.remove(0); // now the head declares a non-sentinel parent
        let err = verify_chain(&entries, &strict()).expect_err("broken head");
        assert_eq!(err.code(), ErrorCode::BrokenChain);
    }

    #[test]
    fn linkage_break_is_fatal_even_when_permissive() {
        let mut entries = make_chain(3);
        entries[2].parent_entry_hash = entries[0].entry_hash.clone();
        let permissive = IntegrityPolicy::new(IntegrityLevel::Permissive);
        let err = verify_chain(&entries, &permissive).expect_err("broken linkage");
        assert_eq!(err.code(), ErrorCode::BrokenChain);
    }

    #[test]
    fn content_tamper_fails_at_hash_checked() {
        let mut entries = make_chain(3);
        entries[1].author = "forger".into();
        let policy = IntegrityPolicy::new(IntegrityLevel::HashChecked);
        let err = verify_chain(&entries, &policy).expect_err("tampered content");
        assert_eq!(err.code(), ErrorCode::EntryHashMismatch);
    }

    #[test]
    fn content_tamper_tolerated_when_permissive() {
        let mut entries = make_chain(3);
        entries[1].author = "forger".into();
        let permissive = IntegrityPolicy::new(IntegrityLevel::Permissive);
        verify_chain(&entries, &permissive).expect("pre-hashing logs mismatch legitimately");
    }

    // -------------------------------------------------------------------
    // RootDigest
    // -------------------------------------------------------------------

    #[test]
    fn digest_is_deterministic() {
        let entries = make_chain(4);
        let a = verify_chain(&entries, &strict()).expect("valid").finish();
        let b = verify_chain(&entries, &strict()).expect("valid").finish();
        assert_eq!(a, b);
    }

    #[test]
    fn digest_is_order_dependent() {
        let entries = make_chain(4);
        let mut forward = RootDigest::new();
        let mut backward = RootDigest::new();
        for entry in &entries {
            forward.fold(&entry.entry_hash);
        }
        for entry in entries.iter().rev() {
            backward.fold(&entry.entry_hash);
        }
        assert_ne!(forward.finish(), backward.finish());
    }

    #[test]
    fn fold_boundaries_are_unambiguous() {
        // "ab" + "c" must not collide with "a" + "bc".
        let mut left = RootDigest::new();
        left.fold("ab");
        left.fold("c");
        let mut right = RootDigest::new();
        right.fold("a");
        right.fold("bc");
        assert_ne!(left.finish(), right.finish());
    }

    // -------------------------------------------------------------------
    // check_root_digest
    // -------------------------------------------------------------------

    #[test]
    fn matching_trailing_digest_passes() {
        let entries = make_chain(3);
        let digest = verify_chain(&entries, &strict()).expect("valid");
        let declared = digest.finish();
        check_root_digest(&digest, Some(&declared), &strict()).expect("digest matches");
    }

    #[test]
    fn mismatched_trailing_digest_gated_at_hash_checked() {
        let entries = make_chain(3);
        let digest = verify_chain(&entries, &strict()).expect("valid");

        let policy = IntegrityPolicy::new(IntegrityLevel::HashChecked);
        let err = check_root_digest(&digest, Some("blake3:feedface"), &policy)
            .expect_err("tampered digest");
        assert_eq!(err.code(), ErrorCode::RootDigestMismatch);

        let permissive = IntegrityPolicy::new(IntegrityLevel::Permissive);
        check_root_digest(&digest, Some("blake3:feedface"), &permissive)
            .expect("tolerated when permissive");
    }

    #[test]
    fn missing_trailing_digest_gated_at_hash_checked() {
        let digest = RootDigest::new();
        let policy = IntegrityPolicy::new(IntegrityLevel::HashChecked);
        let err = check_root_digest(&digest, None, &policy).expect_err("missing digest");
        assert_eq!(err.code(), ErrorCode::MissingTrailingDigest);

        let permissive = IntegrityPolicy::new(IntegrityLevel::Permissive);
        check_root_digest(&digest, None, &permissive).expect("tolerated when permissive");
    }
}
