//! Touch event sources.
//!
//! The device pump reads raw events through the [`EventSource`] trait so the
//! rest of the bridge never touches a device file directly.
//!
//! - [`ChannelSource`] is fed from a tokio channel.  Tests and replay tools
//!   use it to inject synthetic traces.
//! - `EvdevSource` (Linux, `evdev` feature) reads `/dev/input/eventN`.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use touch_core::RawEvent;

pub mod channel;

#[cfg(all(target_os = "linux", feature = "evdev"))]
pub mod evdev;

pub use channel::{ChannelSource, ChannelSourceHandle};

#[cfg(all(target_os = "linux", feature = "evdev"))]
pub use self::evdev::{scan_touch_devices, DeviceInfo, EvdevSource};

/// Failures reading from a touch device.  All of them end the device task.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The device went away (unplugged, or the feeding channel closed).
    #[error("device disconnected")]
    Disconnected,

    /// Reading from an open device failed.
    #[error("device read failed: {0}")]
    Io(#[from] std::io::Error),

    /// The device file could not be opened.
    #[error("failed to open device {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No device advertising multi-touch slots was found.
    #[error("no multi-touch device found")]
    NotFound,
}

/// An async stream of raw input events from one device.
#[async_trait]
pub trait EventSource: Send {
    /// Waits for the next raw event.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError`] when the device can no longer be read.  The
    /// caller must not call `next_event` again after an error.
    async fn next_event(&mut self) -> Result<RawEvent, DeviceError>;

    /// Human-readable device name for logs.
    fn name(&self) -> &str;

    /// Number of slots the device advertises, if known.
    fn max_slots(&self) -> Option<u32> {
        None
    }
}
