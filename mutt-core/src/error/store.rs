//! Coordination store error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error from the shared coordination store.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreError {
    /// The store is unreachable.
    #[error("[Store] Unavailable: {reason}")]
    Unavailable {
        /// Reason the store could not be reached.
        reason: String,
    },

    /// A stored value could not be decoded.
    #[error("[Store] Corrupt value at '{key}': {reason}")]
    CorruptValue {
        /// Key holding the undecodable value.
        key: String,
        /// Decode failure description.
        reason: String,
    },
}

impl StoreError {
    /// Returns true if retrying the operation later can succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_is_retryable() {
        let err = StoreError::Unavailable {
            reason: "connection reset".to_string(),
        };
        assert!(err.is_retryable());
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_corrupt_value_is_not_retryable() {
        let err = StoreError::CorruptValue {
            key: "mutt:lease:m-1".to_string(),
            reason: "invalid json".to_string(),
        };
        assert!(!err.is_retryable());
    }
}
