//! Rule and ruleset model.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use mutt_core::error::RuleError;
use mutt_core::types::{Event, EventSeverity};

/// Criteria an event must satisfy for a rule to match.
///
/// Absent criteria always match; present criteria must all hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MatchCriteria {
    /// Source to match - exact, or a prefix glob ending in `*`
    /// (`syslog://core-*`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Minimum event severity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_severity: Option<EventSeverity>,
    /// Payload fields that must equal the given values.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub field_equals: BTreeMap<String, serde_json::Value>,
    /// Substring the event summary must contain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_contains: Option<String>,
}

impl MatchCriteria {
    /// Returns true if the event satisfies every present criterion.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(source) = &self.source {
            let matched = source.strip_suffix('*').map_or_else(
                || event.source == *source,
                |prefix| event.source.starts_with(prefix),
            );
            if !matched {
                return false;
            }
        }
        if let Some(min) = self.min_severity {
            if event.severity < min {
                return false;
            }
        }
        for (field, expected) in &self.field_equals {
            if event.payload.get(field) != Some(expected) {
                return false;
            }
        }
        if let Some(needle) = &self.summary_contains {
            if !event.summary.contains(needle.as_str()) {
                return false;
            }
        }
        true
    }
}

/// What a matching rule does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleAction {
    /// Produce one outbound alert.
    Emit {
        /// Destination name the alert is routed to.
        destination: String,
        /// Severity override; the event's severity when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        severity: Option<EventSeverity>,
        /// Summary template; the event's summary when absent. Supports
        /// `{source}`, `{severity}`, `{summary}`, and `{<payload field>}`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },
    /// Yield zero alerts for this event and stop evaluation.
    Suppress,
}

/// One rule in a ruleset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique rule name; part of the deterministic alert id.
    pub name: String,
    /// Disabled rules are skipped without matching.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Match criteria.
    #[serde(default, rename = "match")]
    pub criteria: MatchCriteria,
    /// Action taken when the criteria match.
    pub action: RuleAction,
}

fn default_enabled() -> bool {
    true
}

/// An ordered, immutable set of rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RuleSet {
    /// Rules in evaluation order.
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl RuleSet {
    /// Parses a ruleset from YAML.
    pub fn parse_yaml(content: &str) -> Result<Self, RuleError> {
        let ruleset: Self = serde_yaml::from_str(content).map_err(|e| RuleError::Parse {
            reason: e.to_string(),
        })?;
        ruleset.validate()?;
        Ok(ruleset)
    }

    /// Loads and validates a ruleset from a file.
    pub fn load(path: &str) -> Result<Self, RuleError> {
        let content = std::fs::read_to_string(path).map_err(|e| RuleError::Io {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        Self::parse_yaml(&content)
    }

    /// Validates rule names and emit destinations.
    pub fn validate(&self) -> Result<(), RuleError> {
        let mut names: HashSet<&str> = HashSet::new();
        for rule in &self.rules {
            if rule.name.is_empty() {
                return Err(RuleError::Invalid {
                    rule: "<unnamed>".to_string(),
                    reason: "rule name must not be empty".to_string(),
                });
            }
            if !names.insert(rule.name.as_str()) {
                return Err(RuleError::Invalid {
                    rule: rule.name.clone(),
                    reason: "duplicate rule name".to_string(),
                });
            }
            if let RuleAction::Emit { destination, .. } = &rule.action {
                if destination.is_empty() {
                    return Err(RuleError::Invalid {
                        rule: rule.name.clone(),
                        reason: "emit destination must not be empty".to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Returns the number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if the ruleset has no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
