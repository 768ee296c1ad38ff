//! Domain layer: raw device events, touches, and the slot state machine.
//!
//! Nothing in here performs I/O.  The device reader hands [`RawEvent`]s to a
//! [`SlotTracker`], which answers with ordered [`TouchEvent`]s whenever the
//! device commits a frame.

pub mod raw_event;
pub mod slot_tracker;
pub mod touch;

pub use raw_event::{codes, EventKind, RawEvent};
pub use slot_tracker::{SlotTracker, DEFAULT_MAX_SLOTS};
pub use touch::{TouchEvent, TouchKind, TouchPoint};
