//! Queue transport and lease error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::StoreError;

/// Error from the queue transport layer.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportError {
    /// The coordination store is unreachable; the caller decides
    /// reject-vs-buffer for new events and the worker backs off.
    #[error("[Transport] Unavailable: {reason}")]
    Unavailable {
        /// Underlying store failure.
        reason: String,
    },

    /// The worker's lease was reclaimed by the janitor; the current
    /// message must be abandoned without acking or nacking.
    #[error("[Transport] Lease lost for message {message_id}")]
    LeaseLost {
        /// Message whose lease was lost.
        message_id: String,
    },

    /// A message could not be encoded or decoded.
    #[error("[Transport] Serialization failed: {reason}")]
    Serialization {
        /// Serde failure description.
        reason: String,
    },
}

impl From<StoreError> for TransportError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable { reason } => Self::Unavailable { reason },
            StoreError::CorruptValue { key, reason } => Self::Serialization {
                reason: format!("{key}: {reason}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_unavailable_maps_to_transport_unavailable() {
        let err: TransportError = StoreError::Unavailable {
            reason: "timeout".to_string(),
        }
        .into();
        assert!(matches!(err, TransportError::Unavailable { .. }));
    }

    #[test]
    fn test_display() {
        let err = TransportError::LeaseLost {
            message_id: "m-42".to_string(),
        };
        assert!(err.to_string().contains("m-42"));
    }
}
