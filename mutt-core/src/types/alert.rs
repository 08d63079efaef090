//! Outbound alert message produced by rule matching.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{CorrelationId, Destination, Event, EventSeverity};

/// Alert message bound for a downstream incident platform.
///
/// The alert id is derived deterministically from the source event id and
/// the producing rule name, so redelivery of the same event after a crash
/// produces byte-identical alert identities - the downstream side can
/// deduplicate at-least-once repeats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundAlert {
    /// Deterministic alert identifier (`<event_id>/<rule_name>`).
    pub alert_id: String,
    /// Delivery destination name.
    pub destination: Destination,
    /// Alert severity.
    pub severity: EventSeverity,
    /// Rendered alert summary.
    pub summary: String,
    /// Originating event source.
    pub source: String,
    /// Correlation id carried from the queue message.
    pub correlation_id: CorrelationId,
    /// Selected event payload fields.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl OutboundAlert {
    /// Builds an alert for `event` produced by the rule named `rule_name`.
    #[must_use]
    pub fn for_event(
        event: &Event,
        rule_name: &str,
        destination: Destination,
        severity: EventSeverity,
        summary: impl Into<String>,
        correlation_id: CorrelationId,
    ) -> Self {
        Self {
            alert_id: format!("{}/{rule_name}", event.id),
            destination,
            severity,
            summary: summary.into(),
            source: event.source.clone(),
            correlation_id,
            fields: event.payload.clone(),
        }
    }
}
