//! Identifier newtypes used across the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from the given value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id! {
    /// Unique identifier for a normalized monitoring event.
    ///
    /// Assigned by the producing intake boundary, never by the pipeline.
    EventId
}

string_id! {
    /// Unique identifier for a queue message wrapping an event.
    MessageId
}

string_id! {
    /// Correlation identifier threading an event through log lines and
    /// downstream alerts.
    CorrelationId
}

string_id! {
    /// Identity of one worker replica, used as the lease owner.
    WorkerId
}

string_id! {
    /// Name of an outbound delivery destination.
    Destination
}

impl MessageId {
    /// Generates a new unique `MessageId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl CorrelationId {
    /// Generates a new unique `CorrelationId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl WorkerId {
    /// Generates a worker identity from the host name and a random suffix.
    #[must_use]
    pub fn generate() -> Self {
        let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "worker".to_string());
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{host}-{}", &suffix[..8]))
    }
}
