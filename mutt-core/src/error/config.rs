//! Configuration error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration loading and validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("[Config] Cannot read '{path}': {reason}")]
    FileRead {
        /// Configuration file path.
        path: String,
        /// I/O failure description.
        reason: String,
    },

    /// The file extension is not a recognized format.
    #[error("[Config] Unrecognized format for '{path}': {reason}")]
    InvalidFormat {
        /// Configuration file path.
        path: String,
        /// Explanation of the rejection.
        reason: String,
    },

    /// The content could not be parsed.
    #[error("[Config] Parse failed: {reason}")]
    Parse {
        /// Parser failure description.
        reason: String,
    },

    /// A configuration value failed cross-field validation.
    #[error("[Config] Invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Offending field path.
        field: String,
        /// Validation failure description.
        reason: String,
    },
}
