//! Reconstruction of discrete touches from the multi-touch "type B" protocol.
//!
//! # How the slot protocol works
//!
//! A type-B multi-touch device does not report touches as self-contained
//! records.  Instead it streams tiny per-field updates and relies on the
//! reader to remember context:
//!
//! ```text
//! ABS_MT_SLOT         1      ← "the following fields are about slot 1"
//! ABS_MT_TRACKING_ID  45     ← a new contact (id 45) landed in slot 1
//! ABS_MT_POSITION_X   812
//! ABS_MT_POSITION_Y   301
//! ABS_MT_SLOT         0
//! ABS_MT_POSITION_X   120    ← contact in slot 0 moved horizontally
//! SYN_REPORT                 ← everything above describes one instant
//! ```
//!
//! Individual field updates are not meaningful on their own: an X update
//! without its Y counterpart is a half-written position.  The tracker
//! therefore only *stages* changes while reading a frame and turns them into
//! [`TouchEvent`]s when the device commits the frame with `SYN_REPORT`.
//!
//! # Identity
//!
//! Slots are routing state only.  The kernel may hand a slot to a new contact
//! right after the previous one lifted, so live touches are keyed by their
//! tracking id and every emitted event carries that id.
//!
//! # Flush order
//!
//! Within one commit the tracker emits all `end` events, then all `start`
//! events, then at most one `move` per touch.  A subscriber therefore never
//! sees a move for a contact that has already ended.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::raw_event::{codes, EventKind, RawEvent};
use super::touch::{TouchEvent, TouchPoint};

/// Slot limit used when the device does not advertise one.
pub const DEFAULT_MAX_SLOTS: u32 = 32;

/// Changes staged since the last frame commit.
#[derive(Debug, Default)]
struct PendingFrame {
    /// Touches lifted during this frame, with their final coordinates.
    ended: Vec<TouchPoint>,
    /// Tracking ids created during this frame, in arrival order.
    started: Vec<i32>,
    /// Tracking ids whose coordinates were updated, in first-update order.
    dirty: Vec<i32>,
}

impl PendingFrame {
    fn mark_dirty(&mut self, id: i32) {
        if !self.dirty.contains(&id) {
            self.dirty.push(id);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Axis {
    X,
    Y,
}

/// Stateful converter from raw device events to touch events.
///
/// A tracker must be owned by a single execution context: the task that
/// reads the device.  Other components only ever receive the immutable
/// [`TouchEvent`] values it returns.
///
/// # Examples
///
/// ```rust
/// use touch_core::{RawEvent, SlotTracker, TouchEvent};
///
/// let mut tracker = SlotTracker::new();
/// let mut emitted = Vec::new();
/// for ev in [
///     RawEvent::slot(0),
///     RawEvent::tracking_id(5),
///     RawEvent::position_x(10),
///     RawEvent::position_y(20),
///     RawEvent::commit(),
/// ] {
///     emitted.extend(tracker.process(ev));
/// }
///
/// assert_eq!(
///     emitted,
///     vec![TouchEvent::start(5, 0, 0, 0), TouchEvent::moved(5, 10, 20, 1)]
/// );
/// ```
#[derive(Debug)]
pub struct SlotTracker {
    max_slots: u32,
    /// `None` after a slot select outside `0..max_slots`; slot-scoped events
    /// are ignored until the device selects a valid slot again.
    current_slot: Option<u32>,
    /// Slot → tracking id of the touch currently occupying it.
    slots: HashMap<u32, i32>,
    /// Live touches keyed by tracking id.
    touches: HashMap<i32, TouchPoint>,
    pending: PendingFrame,
    /// Set by `SYN_DROPPED`; cleared by the next `SYN_REPORT`.
    dropping: bool,
    next_seq: u64,
}

impl SlotTracker {
    /// Creates a tracker for a device with [`DEFAULT_MAX_SLOTS`] slots.
    pub fn new() -> Self {
        Self::with_max_slots(DEFAULT_MAX_SLOTS)
    }

    /// Creates a tracker for a device advertising `max_slots` slots.
    ///
    /// A value of zero is treated as one slot.
    pub fn with_max_slots(max_slots: u32) -> Self {
        Self {
            max_slots: max_slots.max(1),
            current_slot: Some(0),
            slots: HashMap::new(),
            touches: HashMap::new(),
            pending: PendingFrame::default(),
            dropping: false,
            next_seq: 0,
        }
    }

    /// Continues numbering at `next_seq` instead of 0.
    ///
    /// Used when a device is reopened so subscribers that stayed connected
    /// keep seeing one gapless sequence.
    pub fn resume_seq(mut self, next_seq: u64) -> Self {
        self.next_seq = next_seq;
        self
    }

    pub fn max_slots(&self) -> u32 {
        self.max_slots
    }

    /// Number of touches currently on the surface, including touches created
    /// in the uncommitted frame.
    pub fn active_count(&self) -> usize {
        self.touches.len()
    }

    /// Looks up a live touch by tracking id.
    pub fn touch(&self, tracking_id: i32) -> Option<&TouchPoint> {
        self.touches.get(&tracking_id)
    }

    /// The slot that slot-scoped events currently apply to.
    pub fn current_slot(&self) -> Option<u32> {
        self.current_slot
    }

    /// The `seq` the next emitted event will carry.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Feeds one raw event and returns the touch events it completes.
    ///
    /// Only a frame commit (`SYN_REPORT`) can produce events; every other
    /// input returns an empty vector.  Malformed input is logged and skipped.
    pub fn process(&mut self, event: RawEvent) -> Vec<TouchEvent> {
        match event.kind {
            EventKind::Syn => self.handle_syn(event.code),
            EventKind::Abs if !self.dropping => {
                self.handle_abs(event.code, event.value);
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    /// Ends every live touch immediately.
    ///
    /// Used when the device goes away so subscribers are not left holding
    /// touches that can never lift.  Touches created in the uncommitted frame
    /// were never announced and are discarded silently.  The tracker is left
    /// empty with slot 0 selected.
    pub fn release_all(&mut self) -> Vec<TouchEvent> {
        let pending = std::mem::take(&mut self.pending);
        let mut seq = self.next_seq;
        let mut out = Vec::with_capacity(pending.ended.len() + self.touches.len());

        for touch in pending.ended {
            out.push(TouchEvent::end(touch.tracking_id, touch.x, touch.y, seq));
            seq = seq.wrapping_add(1);
        }

        let mut live: Vec<TouchPoint> = self
            .touches
            .drain()
            .map(|(_, touch)| touch)
            .filter(|touch| !pending.started.contains(&touch.tracking_id))
            .collect();
        live.sort_by_key(|touch| touch.slot);
        for touch in live {
            out.push(TouchEvent::end(touch.tracking_id, touch.x, touch.y, seq));
            seq = seq.wrapping_add(1);
        }

        self.slots.clear();
        self.current_slot = Some(0);
        self.dropping = false;
        self.next_seq = seq;
        out
    }

    // ── Event handlers ────────────────────────────────────────────────────────

    fn handle_syn(&mut self, code: u16) -> Vec<TouchEvent> {
        match code {
            codes::SYN_REPORT => {
                if self.dropping {
                    debug!("frame commit after dropped events; resuming");
                    self.dropping = false;
                }
                self.flush()
            }
            codes::SYN_DROPPED => {
                warn!("device dropped events; ignoring input until the next frame commit");
                self.dropping = true;
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn handle_abs(&mut self, code: u16, value: i32) {
        match code {
            codes::ABS_MT_SLOT => self.select_slot(value),
            codes::ABS_MT_TRACKING_ID => self.assign_tracking_id(value),
            codes::ABS_MT_POSITION_X => self.update_position(Axis::X, value),
            codes::ABS_MT_POSITION_Y => self.update_position(Axis::Y, value),
            _ => {}
        }
    }

    fn select_slot(&mut self, value: i32) {
        match u32::try_from(value) {
            Ok(slot) if slot < self.max_slots => self.current_slot = Some(slot),
            _ => {
                warn!(
                    slot = value,
                    max_slots = self.max_slots,
                    "ignoring out-of-range slot select"
                );
                self.current_slot = None;
            }
        }
    }

    fn assign_tracking_id(&mut self, value: i32) {
        let Some(slot) = self.current_slot else {
            return;
        };

        if value == -1 {
            self.lift(slot);
            return;
        }
        if value < -1 {
            warn!(slot, tracking_id = value, "ignoring malformed tracking id");
            return;
        }

        match self.slots.get(&slot).copied() {
            Some(existing) if existing == value => return,
            Some(existing) => {
                debug!(
                    slot,
                    old = existing,
                    new = value,
                    "slot reassigned without a lift; ending previous touch"
                );
                self.lift(slot);
            }
            None => {}
        }

        if let Some(other) = self.touches.get(&value) {
            warn!(
                slot,
                tracking_id = value,
                other_slot = other.slot,
                "tracking id already live in another slot; ignoring"
            );
            return;
        }

        self.slots.insert(slot, value);
        self.touches.insert(value, TouchPoint::new(value, slot));
        self.pending.started.push(value);
    }

    fn lift(&mut self, slot: u32) {
        let Some(id) = self.slots.remove(&slot) else {
            return;
        };
        let Some(touch) = self.touches.remove(&id) else {
            return;
        };

        self.pending.dirty.retain(|dirty| *dirty != id);

        if let Some(pos) = self.pending.started.iter().position(|started| *started == id) {
            // Never announced, so there is nothing to end.
            self.pending.started.remove(pos);
            debug!(tracking_id = id, slot, "touch lifted in the frame it started");
            return;
        }

        self.pending.ended.push(touch);
    }

    fn update_position(&mut self, axis: Axis, value: i32) {
        let Some(slot) = self.current_slot else {
            return;
        };
        let Some(id) = self.slots.get(&slot).copied() else {
            return;
        };
        let Some(touch) = self.touches.get_mut(&id) else {
            return;
        };

        match axis {
            Axis::X => touch.x = value,
            Axis::Y => touch.y = value,
        }
        self.pending.mark_dirty(id);
    }

    fn flush(&mut self) -> Vec<TouchEvent> {
        let pending = std::mem::take(&mut self.pending);
        let mut seq = self.next_seq;
        let mut out =
            Vec::with_capacity(pending.ended.len() + pending.started.len() + pending.dirty.len());

        for touch in pending.ended {
            out.push(TouchEvent::end(touch.tracking_id, touch.x, touch.y, seq));
            seq = seq.wrapping_add(1);
        }

        for id in pending.started {
            if self.touches.contains_key(&id) {
                out.push(TouchEvent::start(id, 0, 0, seq));
                seq = seq.wrapping_add(1);
            }
        }

        for id in pending.dirty {
            if let Some(touch) = self.touches.get_mut(&id) {
                if touch.has_moved() {
                    out.push(TouchEvent::moved(id, touch.x, touch.y, seq));
                    seq = seq.wrapping_add(1);
                    touch.last_x = touch.x;
                    touch.last_y = touch.y;
                }
            }
        }

        self.next_seq = seq;
        out
    }
}

impl Default for SlotTracker {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
