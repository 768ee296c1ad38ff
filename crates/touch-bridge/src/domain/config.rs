//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! Values are layered at startup:
//!
//! 1. Built-in defaults ([`BridgeConfig::default`]).
//! 2. An optional TOML file ([`FileConfig`], `--config <path>`).
//! 3. CLI flags and `TOUCH_BRIDGE_*` environment variables (see `main.rs`).
//!
//! Example file:
//!
//! ```toml
//! bind = "0.0.0.0:8765"
//! device = "/dev/input/event5"
//! queue_capacity = 64
//! handshake_timeout_secs = 5
//! ping_interval_secs = 15
//! rescan_interval_secs = 2
//! log_level = "info"
//! ```
//!
//! Every key is optional; a missing key keeps its default.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use touch_core::protocol::frame::MAX_INBOUND_PAYLOAD;

/// Largest accepted `max_frame_payload`, in bytes (16 MiB).
pub const MAX_FRAME_PAYLOAD_CEILING: usize = 16 * 1024 * 1024;

/// Error type for loading and validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but is outside its allowed range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// All runtime configuration for the bridge.
///
/// # Example
///
/// ```rust
/// use touch_bridge::domain::BridgeConfig;
///
/// let cfg = BridgeConfig::default();
/// assert_eq!(cfg.bind_addr.port(), 8765);
/// assert_eq!(cfg.queue_capacity, 64);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Address the push server listens on.
    pub bind_addr: SocketAddr,

    /// Touch device to read.  `None` scans `/dev/input` for the first device
    /// advertising multi-touch slots.
    pub device: Option<PathBuf>,

    /// Per-subscriber outbound queue capacity, in payloads.  A subscriber
    /// whose queue is full when an event is published is disconnected.
    pub queue_capacity: usize,

    /// How long a new connection may take to send its upgrade request.
    pub handshake_timeout: Duration,

    /// Interval between keepalive pings.  Zero disables keepalive.
    pub ping_interval: Duration,

    /// Largest inbound frame payload accepted from a client.
    pub max_frame_payload: usize,

    /// Wait between device open attempts after the device is lost.
    pub rescan_interval: Duration,

    /// Fallback `tracing` filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for BridgeConfig {
    /// | Field             | Default        |
    /// |-------------------|----------------|
    /// | bind_addr         | `0.0.0.0:8765` |
    /// | device            | scan           |
    /// | queue_capacity    | 64             |
    /// | handshake_timeout | 5 seconds      |
    /// | ping_interval     | 15 seconds     |
    /// | max_frame_payload | 64 KiB         |
    /// | rescan_interval   | 2 seconds      |
    /// | log_level         | `info`         |
    fn default() -> Self {
        FileConfig::default().into()
    }
}

impl BridgeConfig {
    /// Returns the keepalive interval, or `None` when keepalive is disabled.
    pub fn keepalive(&self) -> Option<Duration> {
        (!self.ping_interval.is_zero()).then_some(self.ping_interval)
    }

    /// Parses a TOML document into a validated config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(content)?;
        let cfg = BridgeConfig::from(file);
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads and parses the TOML file at `path`.
    ///
    /// A missing file is an error: the path was asked for explicitly.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise the
    /// errors of [`BridgeConfig::from_toml_str`].
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Checks value ranges that the type system cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "queue_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.handshake_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "handshake_timeout",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_frame_payload == 0 {
            return Err(ConfigError::Invalid {
                field: "max_frame_payload",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_frame_payload > MAX_FRAME_PAYLOAD_CEILING {
            return Err(ConfigError::Invalid {
                field: "max_frame_payload",
                reason: format!("must be at most {MAX_FRAME_PAYLOAD_CEILING}"),
            });
        }
        Ok(())
    }
}

// ── On-disk form ──────────────────────────────────────────────────────────────

/// The TOML file schema.  Durations are whole seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileConfig {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<PathBuf>,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    #[serde(default = "default_max_frame_payload")]
    pub max_frame_payload: usize,
    #[serde(default = "default_rescan_interval_secs")]
    pub rescan_interval_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8765))
}
fn default_queue_capacity() -> usize {
    64
}
fn default_handshake_timeout_secs() -> u64 {
    5
}
fn default_ping_interval_secs() -> u64 {
    15
}
fn default_max_frame_payload() -> usize {
    MAX_INBOUND_PAYLOAD
}
fn default_rescan_interval_secs() -> u64 {
    2
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            device: None,
            queue_capacity: default_queue_capacity(),
            handshake_timeout_secs: default_handshake_timeout_secs(),
            ping_interval_secs: default_ping_interval_secs(),
            max_frame_payload: default_max_frame_payload(),
            rescan_interval_secs: default_rescan_interval_secs(),
            log_level: default_log_level(),
        }
    }
}

impl From<FileConfig> for BridgeConfig {
    fn from(file: FileConfig) -> Self {
        Self {
            bind_addr: file.bind,
            device: file.device,
            queue_capacity: file.queue_capacity,
            handshake_timeout: Duration::from_secs(file.handshake_timeout_secs),
            ping_interval: Duration::from_secs(file.ping_interval_secs),
            max_frame_payload: file.max_frame_payload,
            rescan_interval: Duration::from_secs(file.rescan_interval_secs),
            log_level: file.log_level,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
