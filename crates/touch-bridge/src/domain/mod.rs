//! Domain layer for touch-bridge.
//!
//! Holds the runtime configuration.  Nothing here touches sockets or devices;
//! `main.rs` fills a [`BridgeConfig`] from the optional TOML file, CLI flags,
//! and environment variables.

pub mod config;

pub use config::{BridgeConfig, ConfigError, FileConfig};
