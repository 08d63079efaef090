//! Downstream delivery error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a concrete downstream send attempt.
///
/// Transient failures feed the circuit breaker's consecutive-failure count
/// and consume a delivery attempt; permanent failures dead-letter the
/// message immediately and never touch the breaker.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryError {
    /// Network-level or 5xx-class failure; retryable.
    #[error("[Delivery] Transient failure: {reason}")]
    Transient {
        /// Failure description.
        reason: String,
    },

    /// The destination rejected the message as malformed or unknown;
    /// retrying cannot succeed.
    #[error("[Delivery] Permanent failure: {reason}")]
    Permanent {
        /// Rejection description.
        reason: String,
    },

    /// The send did not complete within the configured timeout; retryable.
    #[error("[Delivery] Timeout after {timeout_ms}ms")]
    Timeout {
        /// Timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },
}

impl DeliveryError {
    /// Returns true if retrying the send can succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. })
    }

    /// Classifies an HTTP status code into a delivery error.
    ///
    /// 408, 429, and 5xx are transient; any other non-success status is a
    /// permanent rejection.
    #[must_use]
    pub fn from_status(status: u16, body_hint: &str) -> Self {
        if status == 408 || status == 429 || status >= 500 {
            Self::Transient {
                reason: format!("HTTP {status}: {body_hint}"),
            }
        } else {
            Self::Permanent {
                reason: format!("HTTP {status}: {body_hint}"),
            }
        }
    }
}
