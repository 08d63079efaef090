//! # MUTT Rules
//!
//! The rule matching engine: a pure function from a normalized event and a
//! ruleset snapshot to an ordered sequence of outbound alerts, plus the
//! hot-reloadable snapshot holder and file watcher.
//!
//! # Matching semantics
//!
//! Rules evaluate in their declared order. A matching **suppress** rule is
//! terminal: evaluation stops and the event yields zero alerts, discarding
//! anything emitted by earlier rules - place suppressions first to keep
//! rulesets readable. **Emit** rules are all-matching: every matching emit
//! rule appends one alert, in rule order.
//!
//! Evaluation is deterministic and side-effect-free, so redelivering the
//! same event after a crash reproduces the same alerts with the same
//! deterministic alert ids.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod engine;
pub mod holder;
pub mod model;
pub mod reload;

pub use engine::evaluate;
pub use holder::RuleSetHolder;
pub use model::{MatchCriteria, Rule, RuleAction, RuleSet};
pub use reload::RuleSetReloader;
