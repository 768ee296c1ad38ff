//! The device task: raw events in, touch batches out.
//!
//! Exactly one pump runs per device, and it is the only owner of that
//! device's [`SlotTracker`].  Everything downstream sees immutable
//! [`TouchEvent`](touch_core::TouchEvent) batches through the bus.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use touch_core::SlotTracker;

use crate::application::bus::TouchBus;
use crate::infrastructure::device::{DeviceError, EventSource};

/// Runs until `shutdown` is cancelled or the device fails.
///
/// Non-empty flushes are published as they happen.  On the way out every
/// live touch is ended so subscribers are never left with a stuck contact.
///
/// # Errors
///
/// Returns the [`DeviceError`] that stopped the device.  Shutdown is `Ok`.
pub async fn pump_device<S>(
    mut source: S,
    bus: Arc<TouchBus>,
    shutdown: CancellationToken,
) -> Result<(), DeviceError>
where
    S: EventSource,
{
    let tracker = match source.max_slots() {
        Some(slots) => SlotTracker::with_max_slots(slots),
        None => SlotTracker::new(),
    };
    let mut tracker = tracker.resume_seq(bus.next_seq());
    info!(
        device = source.name(),
        max_slots = tracker.max_slots(),
        next_seq = tracker.next_seq(),
        "device pump started"
    );

    let result = loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break Ok(()),
            next = source.next_event() => next,
        };

        match next {
            Ok(raw) => {
                let events = tracker.process(raw);
                if !events.is_empty() {
                    bus.publish(&events);
                }
            }
            Err(e) => break Err(e),
        }
    };

    let released = tracker.release_all();
    if !released.is_empty() {
        debug!(count = released.len(), "releasing touches left on the surface");
        bus.publish(&released);
    }
    info!(device = source.name(), "device pump stopped");

    result
}
