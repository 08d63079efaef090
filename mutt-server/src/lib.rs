//! # MUTT Server
//!
//! The worker replica binary: loads configuration, wires the pipeline
//! components together, and runs the delivery worker loop alongside the
//! lease janitor and backpressure controller until shutdown.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod server;
pub mod shutdown;

pub use config::ServerConfig;
pub use server::{MuttServer, ServerError};
pub use shutdown::{listen_for_signals, ShutdownController};
