//! # MUTT Pipeline
//!
//! The reliability kernel of the MUTT event pipeline: leased queue
//! transport over a shared coordination store, the lease janitor, the
//! cluster-shared circuit breaker and rate limiter, outbound alert sinks,
//! the backpressure controller, and the delivery worker loop.
//!
//! Every piece of cross-replica state (leases, breaker state, rate
//! windows) lives exclusively in the [`store::CoordinationStore`] and is
//! mutated only through its atomic primitives - no replica ever holds an
//! authoritative in-memory copy.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]

pub mod backpressure;
pub mod breaker;
pub mod limiter;
pub mod queue;
pub mod sink;
pub mod store;
pub mod worker;

pub use backpressure::{BackpressureController, EnqueueOutcome, IntakeGate};
pub use breaker::{BreakerDecision, BreakerTransition, CircuitStatus, SharedCircuitBreaker};
pub use limiter::{RateDecision, SharedRateLimiter};
pub use queue::{
    BackoffPolicy, DeferReason, JanitorStats, LeaseJanitor, LeasedMessage, NackOutcome,
    QueueTransport,
};
pub use sink::{AlertSink, MemorySink, SinkRegistry, WebhookSink};
pub use store::{CoordinationStore, KeySpace, MemoryStore};
pub use worker::DeliveryWorker;
