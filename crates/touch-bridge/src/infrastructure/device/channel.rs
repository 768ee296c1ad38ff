//! Channel-backed event source for tests and trace replay.

use async_trait::async_trait;
use tokio::sync::mpsc;

use touch_core::RawEvent;

use super::{DeviceError, EventSource};

/// An [`EventSource`] fed through a [`ChannelSourceHandle`].
///
/// Dropping every handle reads as [`DeviceError::Disconnected`], just like an
/// unplugged device.
pub struct ChannelSource {
    name: String,
    rx: mpsc::UnboundedReceiver<RawEvent>,
    max_slots: Option<u32>,
}

/// Sending half of a [`ChannelSource`].
#[derive(Clone)]
pub struct ChannelSourceHandle {
    tx: mpsc::UnboundedSender<RawEvent>,
}

impl ChannelSource {
    /// Creates a source and the handle that feeds it.
    pub fn new(name: impl Into<String>) -> (Self, ChannelSourceHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = Self {
            name: name.into(),
            rx,
            max_slots: None,
        };
        (source, ChannelSourceHandle { tx })
    }

    /// Advertises a slot count, as a real device would.
    pub fn with_max_slots(mut self, max_slots: u32) -> Self {
        self.max_slots = Some(max_slots);
        self
    }
}

impl ChannelSourceHandle {
    /// Injects one event.  Returns `false` once the source has been dropped.
    pub fn inject(&self, event: RawEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Injects a sequence of events in order.
    pub fn inject_all(&self, events: impl IntoIterator<Item = RawEvent>) -> bool {
        events.into_iter().all(|ev| self.inject(ev))
    }
}

#[async_trait]
impl EventSource for ChannelSource {
    async fn next_event(&mut self) -> Result<RawEvent, DeviceError> {
        self.rx.recv().await.ok_or(DeviceError::Disconnected)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn max_slots(&self) -> Option<u32> {
        self.max_slots
    }
}
