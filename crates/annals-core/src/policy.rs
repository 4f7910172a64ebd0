//! Integrity tolerance policy.
//!
//! A deployment chooses how strictly imported logs are checked. Every
//! pass/fail decision funnels through [`IntegrityPolicy::report_or_fail`];
//! no other component decides on its own whether a violation is fatal. The
//! policy is injected into the orchestrator explicitly so tests can run
//! permissive and strict configurations side by side.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::IntegrityViolation;

/// Ordered tolerance levels. Comparison follows declaration order:
/// `Permissive < HashChecked < Strict`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum IntegrityLevel {
    /// Log and continue on any inconsistency.
    Permissive,
    /// Hash and chain inconsistencies are fatal; a missing log is tolerated.
    #[default]
    HashChecked,
    /// Missing evidence and hash inconsistencies are all fatal.
    Strict,
}

/// The single policy choke-point consulted for every tolerable violation.
#[derive(Debug, Clone)]
pub struct IntegrityPolicy {
    level: IntegrityLevel,
}

impl IntegrityPolicy {
    /// Build a policy enforcing the given level.
    #[must_use]
    pub const fn new(level: IntegrityLevel) -> Self {
        Self { level }
    }

    /// The configured level.
    #[must_use]
    pub const fn level(&self) -> IntegrityLevel {
        self.level
    }

    /// Raise `violation` as fatal when the configured level is at or above
    /// `min_level_to_fail`; otherwise record a warning and continue.
    ///
    /// # Errors
    ///
    /// Returns the violation itself when it is fatal at this level.
    pub fn report_or_fail(
        &self,
        violation: IntegrityViolation,
        min_level_to_fail: IntegrityLevel,
    ) -> Result<(), IntegrityViolation> {
        if self.level >= min_level_to_fail {
            return Err(violation);
        }
        warn!(code = %violation.code(), "tolerated integrity violation: {violation}");
        Ok(())
    }
}

impl Default for IntegrityPolicy {
    fn default() -> Self {
        Self::new(IntegrityLevel::default())
    }
}
