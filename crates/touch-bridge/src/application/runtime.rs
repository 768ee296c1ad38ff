//! The bridge runtime: one bus, one shutdown signal.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::application::bus::TouchBus;
use crate::application::device_pump::pump_device;
use crate::infrastructure::device::{DeviceError, EventSource};

/// Owns the [`TouchBus`] and the shutdown token shared by the device task,
/// the accept loop, and every connection.
#[derive(Clone)]
pub struct TouchBridge {
    bus: Arc<TouchBus>,
    shutdown: CancellationToken,
}

impl TouchBridge {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            bus: Arc::new(TouchBus::new(queue_capacity)),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn bus(&self) -> Arc<TouchBus> {
        Arc::clone(&self.bus)
    }

    /// A token cancelled by [`TouchBridge::shutdown`].
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Starts a device pump for `source` on the tokio runtime.
    pub fn spawn_device<S>(&self, source: S) -> JoinHandle<Result<(), DeviceError>>
    where
        S: EventSource + 'static,
    {
        tokio::spawn(pump_device(source, self.bus(), self.shutdown_token()))
    }

    /// Stops the device task and every connection.  Safe to call repeatedly.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!("bridge shutting down");
        }
        self.shutdown.cancel();
    }
}
