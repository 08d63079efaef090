//! Core type definitions for the MUTT pipeline.
//!
//! All identifiers are `NewType` wrappers so that an event id, a queue
//! message id, and a destination name can never be confused at a call site.

mod alert;
mod event;
mod ids;
mod message;
mod timestamp;

pub use alert::OutboundAlert;
pub use event::{Event, EventSeverity};
pub use ids::{CorrelationId, Destination, EventId, MessageId, WorkerId};
pub use message::{AttemptRecord, DeadLetterRecord, ProcessingLease, QueueMessage};
pub use timestamp::Timestamp;
