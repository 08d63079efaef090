//! Configuration management for the MUTT pipeline.
//!
//! Pipeline timing and threshold knobs live in [`MuttConfig`]; files in
//! YAML, TOML, or JSON are loaded through [`ConfigLoader`]. Every duration
//! field accepts humantime strings (`"30s"`, `"500ms"`).

mod loader;
mod mutt_config;

pub use loader::{ConfigFormat, ConfigLoader};
pub use mutt_config::{
    BackoffConfig, BackpressureConfig, BreakerConfig, DeliveryConfig, DestinationConfig,
    JanitorConfig, MuttConfig, QueueConfig, RateLimitConfig, RulesConfig, StoreConfig,
    WorkerConfig,
};
