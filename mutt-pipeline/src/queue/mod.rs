//! Queue transport, retry backoff, and lease reclamation.

mod backoff;
mod janitor;
mod transport;

pub use backoff::BackoffPolicy;
pub use janitor::{JanitorStats, LeaseJanitor};
pub use transport::{DeferReason, LeasedMessage, NackOutcome, QueueTransport};
