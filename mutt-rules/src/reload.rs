//! File-watching hot reload for rulesets.
//!
//! Watches the ruleset file with a debounced notify watcher and swaps the
//! holder's snapshot when the file changes. An invalid file is rejected
//! with a warning and the previous snapshot stays live, so a half-saved
//! edit can never break a running worker.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, Debouncer};
use tracing::{info, warn};

use mutt_core::error::RuleError;

use crate::holder::RuleSetHolder;

/// Default debounce for file change events.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);

/// Watches a ruleset file and hot-swaps the holder on change.
pub struct RuleSetReloader {
    path: PathBuf,
    holder: Arc<RuleSetHolder>,
    debounce: Duration,
    debouncer: Option<Debouncer<RecommendedWatcher>>,
}

impl RuleSetReloader {
    /// Creates a reloader for the given file and holder.
    #[must_use]
    pub fn new(path: impl AsRef<Path>, holder: Arc<RuleSetHolder>) -> Self {
        Self::with_debounce(path, holder, DEFAULT_DEBOUNCE)
    }

    /// Creates a reloader with a custom debounce duration.
    #[must_use]
    pub fn with_debounce(
        path: impl AsRef<Path>,
        holder: Arc<RuleSetHolder>,
        debounce: Duration,
    ) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            holder,
            debounce,
            debouncer: None,
        }
    }

    /// Starts watching the ruleset file.
    ///
    /// # Errors
    ///
    /// Returns `RuleError::Io` if the watcher cannot be created or the
    /// path cannot be watched.
    pub fn start(&mut self) -> Result<(), RuleError> {
        let holder = Arc::clone(&self.holder);
        let path = self.path.clone();

        let mut debouncer = new_debouncer(
            self.debounce,
            move |result: Result<Vec<notify_debouncer_mini::DebouncedEvent>, notify::Error>| {
                match result {
                    Ok(_events) => {
                        let shown = path.display().to_string();
                        match holder.reload_from(&shown) {
                            Ok(count) => {
                                info!(path = %shown, rules = count, "Ruleset hot-reloaded");
                            }
                            Err(e) => {
                                warn!(path = %shown, error = %e, "Ruleset reload rejected; keeping previous snapshot");
                            }
                        }
                    }
                    Err(e) => warn!(error = ?e, "Ruleset watcher error"),
                }
            },
        )
        .map_err(|e| RuleError::Io {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;

        debouncer
            .watcher()
            .watch(&self.path, RecursiveMode::NonRecursive)
            .map_err(|e| RuleError::Io {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })?;

        info!(path = %self.path.display(), "Watching ruleset for changes");
        self.debouncer = Some(debouncer);
        Ok(())
    }

    /// Stops watching.
    pub fn stop(&mut self) {
        if self.debouncer.take().is_some() {
            info!(path = %self.path.display(), "Stopped watching ruleset");
        }
    }

    /// Returns true if the watcher is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.debouncer.is_some()
    }
}

impl Drop for RuleSetReloader {
    fn drop(&mut self) {
        self.stop();
    }
}
