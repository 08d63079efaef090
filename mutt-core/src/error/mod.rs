//! Error types and handling framework.
//!
//! This module provides a hierarchical error type system with
//! domain-specific error categories for the MUTT pipeline.
//!
//! # Error Hierarchy
//!
//! - `MuttError` - Top-level error type
//!   - `StoreError` - Coordination store errors
//!   - `TransportError` - Queue transport and lease errors
//!   - `DeliveryError` - Downstream send failures
//!   - `RuleError` - Ruleset parse and validation errors
//!   - `ConfigError` - Configuration errors
//!
//! Circuit-blocked and rate-limited outcomes are deliberately **not**
//! errors in this taxonomy; they are deferrals handled by the delivery
//! gate and never feed failure accounting.

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod config;
mod delivery;
mod rule;
mod store;
mod transport;

pub use config::ConfigError;
pub use delivery::DeliveryError;
pub use rule::RuleError;
pub use store::StoreError;
pub use transport::TransportError;

/// Top-level error type for the MUTT pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MuttError {
    /// Coordination store error.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// Queue transport or lease error.
    #[error("{0}")]
    Transport(#[from] TransportError),

    /// Downstream delivery failure.
    #[error("{0}")]
    Delivery(#[from] DeliveryError),

    /// Ruleset error.
    #[error("{0}")]
    Rule(#[from] RuleError),

    /// Configuration error.
    #[error("{0}")]
    Config(#[from] ConfigError),
}

impl MuttError {
    /// Returns the error category as a string.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Store(_) => "store",
            Self::Transport(_) => "transport",
            Self::Delivery(_) => "delivery",
            Self::Rule(_) => "rule",
            Self::Config(_) => "config",
        }
    }

    /// Returns true if this error means the coordination store is
    /// unreachable - fatal to the current iteration, retried with backoff,
    /// never a reason to crash the worker.
    #[must_use]
    pub fn is_store_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Store(StoreError::Unavailable { .. })
                | Self::Transport(TransportError::Unavailable { .. })
        )
    }

    /// Returns true if the current message must be abandoned without
    /// acking or nacking because its lease was reclaimed.
    #[must_use]
    pub fn is_lease_lost(&self) -> bool {
        matches!(self, Self::Transport(TransportError::LeaseLost { .. }))
    }
}

/// A specialized Result type for MUTT operations.
pub type Result<T> = std::result::Result<T, MuttError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category() {
        let err: MuttError = StoreError::Unavailable {
            reason: "connection refused".to_string(),
        }
        .into();
        assert_eq!(err.category(), "store");
        assert!(err.is_store_unavailable());
        assert!(!err.is_lease_lost());
    }

    #[test]
    fn test_lease_lost_detection() {
        let err: MuttError = TransportError::LeaseLost {
            message_id: "m-1".to_string(),
        }
        .into();
        assert!(err.is_lease_lost());
        assert!(!err.is_store_unavailable());
    }

    #[test]
    fn test_transport_unavailable_is_store_unavailable() {
        let err: MuttError = TransportError::Unavailable {
            reason: "store down".to_string(),
        }
        .into();
        assert!(err.is_store_unavailable());
    }

    #[test]
    fn test_serde_roundtrip() {
        let err: MuttError = DeliveryError::Transient {
            reason: "HTTP 503".to_string(),
        }
        .into();
        let json = serde_json::to_string(&err).unwrap();
        let parsed: MuttError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, parsed);
    }
}
