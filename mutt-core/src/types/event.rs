//! Normalized monitoring event model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::{EventId, Timestamp};

/// Severity of a normalized monitoring event.
///
/// Ordered from least to most severe so that `min_severity` rule matching
/// can use plain comparison.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    /// Clearing event - the underlying condition resolved.
    Clear,
    /// Informational event.
    #[default]
    Info,
    /// Warning level.
    Warning,
    /// Minor fault.
    Minor,
    /// Major fault.
    Major,
    /// Critical fault.
    Critical,
}

impl EventSeverity {
    /// Returns the severity as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Minor => "minor",
            Self::Major => "major",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for EventSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable normalized monitoring event.
///
/// Created by the intake boundary (syslog/SNMP collectors); the pipeline
/// never mutates one. Payload fields are opaque to the transport and only
/// interpreted by rule matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Producer-assigned unique identifier.
    pub id: EventId,
    /// Originating device or collector (e.g. `syslog://core-sw-01`).
    pub source: String,
    /// One-line event description.
    pub summary: String,
    /// Severity assigned during normalization.
    #[serde(default)]
    pub severity: EventSeverity,
    /// Opaque structured fields from normalization.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub payload: BTreeMap<String, serde_json::Value>,
    /// When the intake boundary received the raw event.
    pub received_at: Timestamp,
}

impl Event {
    /// Creates a new event with the given id, source, and summary.
    #[must_use]
    pub fn new(id: impl Into<EventId>, source: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            summary: summary.into(),
            severity: EventSeverity::default(),
            payload: BTreeMap::new(),
            received_at: Timestamp::now(),
        }
    }

    /// Sets the severity.
    #[must_use]
    pub fn with_severity(mut self, severity: EventSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// Adds a payload field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Returns a payload field as a string, if present and a string.
    #[must_use]
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(serde_json::Value::as_str)
    }
}
