//! Pure rule evaluation.

use mutt_core::types::{CorrelationId, Destination, Event, OutboundAlert};

use crate::model::{RuleAction, RuleSet};

/// Evaluates an event against a ruleset snapshot.
///
/// Deterministic and side-effect-free: the same event and snapshot always
/// produce the same alert sequence. Rules run in declared order; a
/// matching suppress rule ends evaluation with zero alerts, and every
/// matching emit rule appends one alert.
#[must_use]
pub fn evaluate(
    ruleset: &RuleSet,
    event: &Event,
    correlation_id: &CorrelationId,
) -> Vec<OutboundAlert> {
    let mut alerts = Vec::new();

    for rule in &ruleset.rules {
        if !rule.enabled || !rule.criteria.matches(event) {
            continue;
        }
        match &rule.action {
            RuleAction::Suppress => return Vec::new(),
            RuleAction::Emit {
                destination,
                severity,
                summary,
            } => {
                let severity = severity.unwrap_or(event.severity);
                let summary = summary.as_ref().map_or_else(
                    || event.summary.clone(),
                    |template| render_template(template, event),
                );
                alerts.push(OutboundAlert::for_event(
                    event,
                    &rule.name,
                    Destination::new(destination.as_str()),
                    severity,
                    summary,
                    correlation_id.clone(),
                ));
            }
        }
    }

    alerts
}

/// Renders `{placeholder}` tokens from the event.
///
/// `{source}`, `{severity}`, and `{summary}` are built-ins; any other name
/// looks up a payload field. Unknown placeholders render as empty.
fn render_template(template: &str, event: &Event) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &after[..end];
        match name {
            "source" => out.push_str(&event.source),
            "severity" => out.push_str(event.severity.as_str()),
            "summary" => out.push_str(&event.summary),
            field => {
                if let Some(value) = event.payload.get(field) {
                    match value.as_str() {
                        Some(s) => out.push_str(s),
                        None => out.push_str(&value.to_string()),
                    }
                }
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MatchCriteria, Rule};
    use mutt_core::types::EventSeverity;

    fn event() -> Event {
        Event::new("ev-1", "syslog://core-sw-01", "link down")
            .with_severity(EventSeverity::Major)
            .with_field("interface", "ge-0/0/1")
    }

    fn corr() -> CorrelationId {
        CorrelationId::new("c-1")
    }

    fn emit_rule(name: &str, destination: &str) -> Rule {
        Rule {
            name: name.to_string(),
            enabled: true,
            criteria: MatchCriteria::default(),
            action: RuleAction::Emit {
                destination: destination.to_string(),
                severity: None,
                summary: None,
            },
        }
    }

    #[test]
    fn test_no_rules_yields_no_alerts() {
        let alerts = evaluate(&RuleSet::default(), &event(), &corr());
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_fan_out_in_rule_order() {
        let ruleset = RuleSet {
            rules: vec![emit_rule("to-moog", "moog"), emit_rule("to-pager", "pager")],
        };
        let alerts = evaluate(&ruleset, &event(), &corr());
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].destination, Destination::new("moog"));
        assert_eq!(alerts[1].destination, Destination::new("pager"));
        assert_eq!(alerts[0].alert_id, "ev-1/to-moog");
    }

    #[test]
    fn test_suppress_is_terminal_and_yields_zero() {
        let suppress = Rule {
            name: "suppress-all".to_string(),
            enabled: true,
            criteria: MatchCriteria::default(),
            action: RuleAction::Suppress,
        };
        // Even with an emit rule before it, a matching suppress rule
        // zeroes the event.
        let ruleset = RuleSet {
            rules: vec![emit_rule("to-moog", "moog"), suppress, emit_rule("late", "moog")],
        };
        let alerts = evaluate(&ruleset, &event(), &corr());
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_disabled_rules_are_skipped() {
        let mut rule = emit_rule("to-moog", "moog");
        rule.enabled = false;
        let ruleset = RuleSet { rules: vec![rule] };
        assert!(evaluate(&ruleset, &event(), &corr()).is_empty());
    }

    #[test]
    fn test_non_matching_rules_are_skipped() {
        let mut rule = emit_rule("to-moog", "moog");
        rule.criteria.min_severity = Some(EventSeverity::Critical);
        let ruleset = RuleSet { rules: vec![rule] };
        assert!(evaluate(&ruleset, &event(), &corr()).is_empty());
    }

    #[test]
    fn test_severity_override() {
        let rule = Rule {
            name: "escalate".to_string(),
            enabled: true,
            criteria: MatchCriteria::default(),
            action: RuleAction::Emit {
                destination: "moog".to_string(),
                severity: Some(EventSeverity::Critical),
                summary: None,
            },
        };
        let alerts = evaluate(&RuleSet { rules: vec![rule] }, &event(), &corr());
        assert_eq!(alerts[0].severity, EventSeverity::Critical);
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let ruleset = RuleSet {
            rules: vec![emit_rule("to-moog", "moog")],
        };
        let first = evaluate(&ruleset, &event(), &corr());
        let second = evaluate(&ruleset, &event(), &corr());
        assert_eq!(first, second);
    }

    #[test]
    fn test_template_rendering() {
        assert_eq!(
            render_template("{severity} on {source}: {summary}", &event()),
            "major on syslog://core-sw-01: link down"
        );
        assert_eq!(render_template("if {interface}", &event()), "if ge-0/0/1");
        assert_eq!(render_template("{missing}!", &event()), "!");
        // Unclosed braces pass through untouched.
        assert_eq!(render_template("{oops", &event()), "{oops");
    }
}
