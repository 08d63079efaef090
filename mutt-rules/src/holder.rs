//! Hot-swappable ruleset snapshots.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use mutt_core::error::RuleError;

use crate::model::RuleSet;

/// Holds the current ruleset as an immutable snapshot.
///
/// Readers clone the `Arc` once per message and evaluate against a
/// consistent snapshot; a reload swaps the pointer atomically between
/// evaluations, never mid-evaluation.
pub struct RuleSetHolder {
    current: RwLock<Arc<RuleSet>>,
}

impl RuleSetHolder {
    /// Creates a holder with the given initial ruleset.
    #[must_use]
    pub fn new(ruleset: RuleSet) -> Self {
        Self {
            current: RwLock::new(Arc::new(ruleset)),
        }
    }

    /// Creates a holder with an empty ruleset.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(RuleSet::default())
    }

    /// Loads the initial ruleset from a file.
    pub fn from_file(path: &str) -> Result<Self, RuleError> {
        Ok(Self::new(RuleSet::load(path)?))
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn current(&self) -> Arc<RuleSet> {
        Arc::clone(&self.current.read())
    }

    /// Swaps in a new ruleset.
    pub fn swap(&self, ruleset: RuleSet) {
        let count = ruleset.len();
        *self.current.write() = Arc::new(ruleset);
        info!(rules = count, "Ruleset snapshot swapped");
    }

    /// Reloads from a file, keeping the previous snapshot on failure.
    pub fn reload_from(&self, path: &str) -> Result<usize, RuleError> {
        let ruleset = RuleSet::load(path)?;
        let count = ruleset.len();
        self.swap(ruleset);
        Ok(count)
    }
}

impl Default for RuleSetHolder {
    fn default() -> Self {
        Self::empty()
    }
}
