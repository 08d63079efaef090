//! Ruleset error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error loading or validating a ruleset.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleError {
    /// The ruleset file could not be read.
    #[error("[Rule] Cannot read ruleset '{path}': {reason}")]
    Io {
        /// Ruleset file path.
        path: String,
        /// I/O failure description.
        reason: String,
    },

    /// The ruleset file could not be parsed.
    #[error("[Rule] Parse failed: {reason}")]
    Parse {
        /// Parser failure description.
        reason: String,
    },

    /// The ruleset parsed but failed validation.
    #[error("[Rule] Invalid rule '{rule}': {reason}")]
    Invalid {
        /// Offending rule name.
        rule: String,
        /// Validation failure description.
        reason: String,
    },
}
