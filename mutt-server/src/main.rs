//! MUTT worker replica entry point.
//!
//! Loads the configuration file (YAML, TOML, or JSON), applies CLI and
//! environment overrides, and runs one delivery worker replica until
//! SIGINT/SIGTERM. Scale out by starting more replicas against the same
//! coordination store.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

use mutt_server::{MuttServer, ServerConfig};

/// MUTT worker replica
#[derive(Parser, Debug)]
#[command(name = "mutt-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "mutt.yaml")]
    config: PathBuf,

    /// Override the worker identity
    #[arg(long, env = "MUTT_WORKER_ID")]
    worker_id: Option<String>,

    /// Override the ruleset file path
    #[arg(long, env = "MUTT_RULES_PATH")]
    rules: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

impl Args {
    fn resolve_config(&self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        let mut config = if self.config.exists() {
            MuttServer::load_config(&self.config)?
        } else {
            eprintln!(
                "Configuration file not found: {}, using defaults",
                self.config.display()
            );
            ServerConfig::default()
        };

        if let Some(worker_id) = &self.worker_id {
            config.pipeline.worker.id = Some(worker_id.clone());
        }
        if let Some(rules) = &self.rules {
            config.pipeline.rules.path.clone_from(rules);
        }
        if self.debug {
            config.logging.level = "debug".to_string();
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match args.resolve_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    if args.validate {
        println!("Configuration is valid");
        return ExitCode::SUCCESS;
    }

    let mut server = match MuttServer::new(config) {
        Ok(server) => server,
        Err(e) => {
            eprintln!("Failed to create server: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = server.initialize() {
        eprintln!("Failed to initialize server: {e}");
        return ExitCode::FAILURE;
    }

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
