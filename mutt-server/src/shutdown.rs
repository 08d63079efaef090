//! Graceful shutdown coordination.
//!
//! One watch channel carries the shutdown flag to every pipeline task:
//! the worker loop, the janitor, and the backpressure controller each
//! hold a receiver and wind down when the flag goes up. The flag only
//! ever goes from false to true.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// Raises and distributes the process-wide shutdown flag.
///
/// Clones share the same underlying channel, so any holder can trigger
/// shutdown and every subscriber observes it.
#[derive(Debug, Clone)]
pub struct ShutdownController {
    flag: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownController {
    /// Creates a controller with the flag down.
    #[must_use]
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self {
            flag: Arc::new(flag),
        }
    }

    /// Raises the shutdown flag. Idempotent; subscribers are notified
    /// once.
    pub fn trigger(&self) {
        let raised = self.flag.send_if_modified(|up| {
            if *up {
                false
            } else {
                *up = true;
                true
            }
        });
        if raised {
            info!("Shutdown initiated");
        }
    }

    /// Whether shutdown has been triggered.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.flag.borrow()
    }

    /// A receiver for the shutdown flag, for `tokio::select!` loops.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.flag.subscribe()
    }

    /// Completes once the flag is raised.
    pub async fn triggered(&self) {
        let mut rx = self.flag.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Raises the controller's flag on SIGINT or SIGTERM.
pub async fn listen_for_signals(controller: ShutdownController) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).expect("SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("SIGTERM handler");

        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT"),
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("Ctrl+C handler");
        info!("Received Ctrl+C");
    }

    controller.trigger();
}
