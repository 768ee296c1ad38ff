//! touch-bridge: entry point.
//!
//! Reads a Linux multi-touch screen and streams every touch to connected
//! display clients as JSON over a minimal framed push channel.
//!
//! # Usage
//!
//! ```text
//! touch-bridge [OPTIONS]
//!
//! Options:
//!   --config <PATH>              TOML config file
//!   --bind <IP>                  Listen address [default: 0.0.0.0]
//!   --port <PORT>                Listen port [default: 8765]
//!   --device <PATH>              Touch device; scans /dev/input when omitted
//!   --queue-capacity <N>         Per-client queue capacity [default: 64]
//!   --handshake-timeout <SECS>   Handshake deadline [default: 5]
//!   --ping-interval <SECS>       Keepalive interval, 0 disables [default: 15]
//!   --rescan-interval <SECS>     Device retry interval [default: 2]
//! ```
//!
//! # Precedence
//!
//! CLI flag, then `TOUCH_BRIDGE_*` environment variable, then the config
//! file, then the built-in default.
//!
//! | Variable                          | Flag                  |
//! |-----------------------------------|-----------------------|
//! | `TOUCH_BRIDGE_CONFIG`             | `--config`            |
//! | `TOUCH_BRIDGE_BIND`               | `--bind`              |
//! | `TOUCH_BRIDGE_PORT`               | `--port`              |
//! | `TOUCH_BRIDGE_DEVICE`             | `--device`            |
//! | `TOUCH_BRIDGE_QUEUE_CAPACITY`     | `--queue-capacity`    |
//! | `TOUCH_BRIDGE_HANDSHAKE_TIMEOUT`  | `--handshake-timeout` |
//! | `TOUCH_BRIDGE_PING_INTERVAL`      | `--ping-interval`     |
//! | `TOUCH_BRIDGE_RESCAN_INTERVAL`    | `--rescan-interval`   |
//!
//! `RUST_LOG` overrides the configured log level.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use touch_bridge::application::TouchBridge;
use touch_bridge::domain::BridgeConfig;
use touch_bridge::infrastructure::run_server;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Multi-touch to display-client bridge.
///
/// Every option is optional; unset options fall back to the config file and
/// then to built-in defaults.
#[derive(Debug, Parser)]
#[command(
    name = "touch-bridge",
    about = "Streams Linux multi-touch input to display clients",
    version
)]
struct Cli {
    /// TOML config file supplying base values.
    #[arg(long, env = "TOUCH_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// IP address to listen on.
    #[arg(long, env = "TOUCH_BRIDGE_BIND")]
    bind: Option<String>,

    /// TCP port to listen on.
    #[arg(long, env = "TOUCH_BRIDGE_PORT")]
    port: Option<u16>,

    /// Touch device path, e.g. /dev/input/event5.
    #[arg(long, env = "TOUCH_BRIDGE_DEVICE")]
    device: Option<PathBuf>,

    /// Per-client outbound queue capacity; a client whose queue fills is
    /// disconnected.
    #[arg(long, env = "TOUCH_BRIDGE_QUEUE_CAPACITY")]
    queue_capacity: Option<usize>,

    /// Seconds a new client has to complete the handshake.
    #[arg(long, env = "TOUCH_BRIDGE_HANDSHAKE_TIMEOUT")]
    handshake_timeout: Option<u64>,

    /// Seconds between keepalive pings; 0 disables them.
    #[arg(long, env = "TOUCH_BRIDGE_PING_INTERVAL")]
    ping_interval: Option<u64>,

    /// Seconds to wait before reopening a lost device.
    #[arg(long, env = "TOUCH_BRIDGE_RESCAN_INTERVAL")]
    rescan_interval: Option<u64>,
}

impl Cli {
    /// Layers the CLI values over the config file (or defaults).
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be loaded, `--bind` is not
    /// an IP address, or the merged values are out of range.
    fn into_bridge_config(self) -> anyhow::Result<BridgeConfig> {
        let mut config = match &self.config {
            Some(path) => BridgeConfig::from_toml_file(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => BridgeConfig::default(),
        };

        if let Some(bind) = &self.bind {
            let ip: IpAddr = bind
                .parse()
                .with_context(|| format!("invalid bind address: '{bind}'"))?;
            config.bind_addr.set_ip(ip);
        }
        if let Some(port) = self.port {
            config.bind_addr.set_port(port);
        }
        if self.device.is_some() {
            config.device = self.device;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity;
        }
        if let Some(secs) = self.handshake_timeout {
            config.handshake_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.ping_interval {
            config.ping_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.rescan_interval {
            config.rescan_interval = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }
}

// ── Device supervision ────────────────────────────────────────────────────────

/// Keeps a device pump running until shutdown, reopening the device after
/// it is lost.  Connections stay open while no device is available.
#[cfg(all(target_os = "linux", feature = "evdev"))]
async fn supervise_device(bridge: TouchBridge, device: Option<PathBuf>, rescan: Duration) {
    use touch_bridge::infrastructure::device::{scan_touch_devices, DeviceError, EvdevSource};
    use tracing::{error, warn};

    let shutdown = bridge.shutdown_token();
    while !shutdown.is_cancelled() {
        let opened = match &device {
            Some(path) => EvdevSource::open(path),
            None => {
                let found = scan_touch_devices();
                for dev in &found {
                    info!("found touch device {} ({})", dev.path.display(), dev.name);
                }
                found
                    .first()
                    .map_or(Err(DeviceError::NotFound), |dev| EvdevSource::open(&dev.path))
            }
        };

        match opened {
            Ok(source) => match bridge.spawn_device(source).await {
                Ok(Ok(())) => break,
                Ok(Err(e)) => error!("touch device lost: {e}"),
                Err(e) => error!("device task failed: {e}"),
            },
            Err(e) => warn!("no touch device available: {e}"),
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(rescan) => {}
        }
    }
}

#[cfg(not(all(target_os = "linux", feature = "evdev")))]
async fn supervise_device(bridge: TouchBridge, _device: Option<PathBuf>, _rescan: Duration) {
    tracing::warn!("built without evdev support; no touch device will be read");
    bridge.shutdown_token().cancelled().await;
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.into_bridge_config()?;

    // `RUST_LOG` wins over the configured level when present.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(
        "touch bridge starting - bind={}, device={}, queue={}",
        config.bind_addr,
        config
            .device
            .as_ref()
            .map_or_else(|| "scan".to_string(), |p| p.display().to_string()),
        config.queue_capacity
    );

    let bridge = TouchBridge::new(config.queue_capacity);

    let signal_bridge = bridge.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, initiating graceful shutdown");
                signal_bridge.shutdown();
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    let device_task = tokio::spawn(supervise_device(
        bridge.clone(),
        config.device.clone(),
        config.rescan_interval,
    ));

    let served = run_server(config, &bridge).await;

    // A failed bind must not leave the device task running.
    bridge.shutdown();
    let _ = device_task.await;
    served?;

    info!("touch bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
