//! Main server implementation.
//!
//! Wires the pipeline components over one coordination store and runs the
//! delivery worker loop alongside the lease janitor and the backpressure
//! controller until shutdown.

#![allow(clippy::used_underscore_binding)]

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use mutt_core::config::ConfigLoader;
use mutt_core::types::WorkerId;
use mutt_pipeline::store::{CoordinationStore, KeySpace, MemoryStore};
use mutt_pipeline::{
    BackpressureController, DeliveryWorker, LeaseJanitor, QueueTransport, SharedCircuitBreaker,
    SharedRateLimiter, SinkRegistry,
};
use mutt_rules::{RuleSetHolder, RuleSetReloader};
use mutt_telemetry::logging::init_logging;
use mutt_telemetry::metrics::init_metrics;

use crate::config::ServerConfig;
use crate::shutdown::{listen_for_signals, ShutdownController};

/// Server lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration could not be loaded or validated.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A component failed to initialize.
    #[error("Initialization error: {0}")]
    Initialization(String),

    /// The ruleset could not be loaded.
    #[error("Ruleset error: {0}")]
    Rules(String),
}

/// The MUTT worker replica.
pub struct MuttServer {
    config: ServerConfig,
    shutdown: ShutdownController,
    _log_guards: Vec<WorkerGuard>,
}

impl MuttServer {
    /// Creates a server from a validated configuration.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        config
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))?;
        Ok(Self {
            config,
            shutdown: ShutdownController::new(),
            _log_guards: Vec::new(),
        })
    }

    /// Loads and validates a configuration file.
    pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ServerConfig, ServerError> {
        let config: ServerConfig = ConfigLoader::new()
            .load_file(path)
            .map_err(|e| ServerError::Config(e.to_string()))?;
        config
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Returns the shutdown controller.
    #[must_use]
    pub fn shutdown_controller(&self) -> &ShutdownController {
        &self.shutdown
    }

    /// Initializes logging and metrics.
    pub fn initialize(&mut self) -> Result<(), ServerError> {
        let guards = init_logging(&self.config.logging).map_err(|e| {
            ServerError::Initialization(format!("Failed to initialize logging: {e}"))
        })?;
        self._log_guards = guards;
        info!(level = %self.config.logging.level, "Logging initialized");

        if let Err(e) = init_metrics(&self.config.metrics) {
            warn!(error = %e, "Metrics initialization skipped");
        } else {
            info!("Metrics initialized");
        }
        Ok(())
    }

    /// Builds the pipeline and runs the worker loop until shutdown.
    ///
    /// Blocks until a shutdown signal arrives and the in-flight message is
    /// resolved (or the completion timeout elapses).
    pub async fn run(&self) -> Result<(), ServerError> {
        let pipeline = &self.config.pipeline;

        // The coordination store is injected behind its trait; this
        // binary ships the in-process implementation, which makes a
        // single-replica deployment self-contained. Multi-replica
        // deployments substitute a shared store implementation here.
        let store: Arc<dyn CoordinationStore> = Arc::new(MemoryStore::new());
        let keys = KeySpace::new(pipeline.store.key_prefix.clone());
        info!(key_prefix = %pipeline.store.key_prefix, "Using in-process coordination store");

        let worker_id = pipeline
            .worker
            .id
            .as_ref()
            .map_or_else(WorkerId::generate, |id| WorkerId::new(id.as_str()));
        info!(worker = %worker_id, "Worker identity assigned");

        let transport = Arc::new(QueueTransport::new(
            Arc::clone(&store),
            keys.clone(),
            pipeline.queue.clone(),
            worker_id,
        ));

        let rules = self.load_rules()?;
        let mut reloader = None;
        if self.config.pipeline.rules.watch {
            let mut watcher =
                RuleSetReloader::new(&self.config.pipeline.rules.path, Arc::clone(&rules));
            match watcher.start() {
                Ok(()) => reloader = Some(watcher),
                Err(e) => warn!(error = %e, "Ruleset watching disabled"),
            }
        }

        let sinks = Arc::new(SinkRegistry::from_config(&pipeline.delivery));
        if sinks.is_empty() {
            warn!("No delivery destinations configured; matching alerts will dead-letter");
        }

        let breaker = Arc::new(SharedCircuitBreaker::new(
            Arc::clone(&store),
            keys.clone(),
            pipeline.breaker.clone(),
        ));
        let limiter = Arc::new(SharedRateLimiter::new(
            Arc::clone(&store),
            keys,
            pipeline.rate_limit.clone(),
        ));

        let janitor = Arc::new(LeaseJanitor::new(
            Arc::clone(&transport),
            pipeline.janitor.clone(),
        ));
        let backpressure = Arc::new(BackpressureController::new(
            Arc::clone(&transport),
            pipeline.backpressure.clone(),
        ));

        let worker = DeliveryWorker::new(
            Arc::clone(&transport),
            rules,
            sinks,
            breaker,
            limiter,
            pipeline.queue.clone(),
            pipeline.delivery.send_timeout,
        );

        tokio::spawn(listen_for_signals(self.shutdown.clone()));
        let janitor_task = tokio::spawn(janitor.run(self.shutdown.subscribe()));
        let backpressure_task = tokio::spawn(backpressure.run(self.shutdown.subscribe()));

        info!("MUTT pipeline running");
        worker.run(self.shutdown.subscribe()).await;

        // The worker loop only returns once shutdown was initiated and
        // its in-flight message is resolved.
        let _ = tokio::time::timeout(
            self.config.shutdown.completion_timeout,
            async {
                let _ = janitor_task.await;
                let _ = backpressure_task.await;
            },
        )
        .await;

        if let Some(mut watcher) = reloader {
            watcher.stop();
        }
        info!("MUTT server stopped");
        Ok(())
    }

    fn load_rules(&self) -> Result<Arc<RuleSetHolder>, ServerError> {
        let path = &self.config.pipeline.rules.path;
        if Path::new(path).exists() {
            let holder =
                RuleSetHolder::from_file(path).map_err(|e| ServerError::Rules(e.to_string()))?;
            info!(path = %path, rules = holder.current().len(), "Ruleset loaded");
            Ok(Arc::new(holder))
        } else {
            warn!(path = %path, "Ruleset file not found; starting with an empty ruleset");
            Ok(Arc::new(RuleSetHolder::empty()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = ServerConfig::default();
        config.pipeline.queue.max_attempts = 0;
        assert!(matches!(
            MuttServer::new(config),
            Err(ServerError::Config(_))
        ));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mutt.yaml");
        std::fs::write(&path, "queue:\n  max_attempts: 5\n").unwrap();

        let config = MuttServer::load_config(&path).unwrap();
        assert_eq!(config.pipeline.queue.max_attempts, 5);
    }

    #[test]
    fn test_load_config_rejects_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mutt.yaml");
        std::fs::write(&path, "breaker:\n  failure_threshold: 0\n").unwrap();

        assert!(MuttServer::load_config(&path).is_err());
    }

    #[tokio::test]
    async fn test_server_runs_and_shuts_down() {
        let mut config = ServerConfig::default();
        config.pipeline.queue.dequeue_timeout = std::time::Duration::from_millis(20);
        config.pipeline.rules.watch = false;
        let server = MuttServer::new(config).unwrap();
        let controller = server.shutdown_controller().clone();

        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            controller.trigger();
        });

        tokio::time::timeout(std::time::Duration::from_secs(5), server.run())
            .await
            .expect("server should stop after shutdown")
            .unwrap();
    }
}
