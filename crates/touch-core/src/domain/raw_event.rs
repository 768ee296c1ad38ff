//! Raw input events as reported by the Linux input subsystem.
//!
//! Every event the kernel delivers is a `(type, code, value)` triple.  Only
//! two event types matter for multi-touch tracking:
//!
//! - `EV_ABS` carries absolute-axis updates (slot select, tracking id,
//!   position X, position Y).
//! - `EV_SYN` carries synchronization markers; `SYN_REPORT` commits a frame.
//!
//! Everything else (key/button events such as `BTN_TOUCH`, timestamps,
//! pressure on non-MT axes) is kept as [`EventKind::Other`] so callers can
//! pass the device stream through unfiltered.

/// Numeric constants from `linux/input-event-codes.h`.
pub mod codes {
    pub const EV_SYN: u16 = 0x00;
    pub const EV_ABS: u16 = 0x03;

    /// End of a consistent device frame.
    pub const SYN_REPORT: u16 = 0;
    /// The kernel's event buffer overflowed and events were lost.
    pub const SYN_DROPPED: u16 = 3;

    pub const ABS_MT_SLOT: u16 = 0x2f;
    pub const ABS_MT_POSITION_X: u16 = 0x35;
    pub const ABS_MT_POSITION_Y: u16 = 0x36;
    pub const ABS_MT_TRACKING_ID: u16 = 0x39;
}

/// Event category derived from the kernel `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `EV_ABS`: absolute axis update.
    Abs,
    /// `EV_SYN`: synchronization marker.
    Syn,
    /// Any other event type, carrying the raw type number.
    Other(u16),
}

impl From<u16> for EventKind {
    fn from(raw: u16) -> Self {
        match raw {
            codes::EV_ABS => EventKind::Abs,
            codes::EV_SYN => EventKind::Syn,
            other => EventKind::Other(other),
        }
    }
}

/// One raw event from a physical device.
///
/// # Examples
///
/// ```rust
/// use touch_core::domain::raw_event::{codes, EventKind, RawEvent};
///
/// let ev = RawEvent::from_raw(codes::EV_ABS, codes::ABS_MT_POSITION_X, 812);
/// assert_eq!(ev.kind, EventKind::Abs);
/// assert_eq!(ev, RawEvent::position_x(812));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    pub kind: EventKind,
    pub code: u16,
    pub value: i32,
}

impl RawEvent {
    /// Builds an event from the kernel's `(type, code, value)` triple.
    pub fn from_raw(event_type: u16, code: u16, value: i32) -> Self {
        Self {
            kind: EventKind::from(event_type),
            code,
            value,
        }
    }

    pub fn abs(code: u16, value: i32) -> Self {
        Self {
            kind: EventKind::Abs,
            code,
            value,
        }
    }

    pub fn syn(code: u16) -> Self {
        Self {
            kind: EventKind::Syn,
            code,
            value: 0,
        }
    }

    /// `ABS_MT_SLOT` selecting `slot`.
    pub fn slot(slot: i32) -> Self {
        Self::abs(codes::ABS_MT_SLOT, slot)
    }

    /// `ABS_MT_TRACKING_ID`; pass `-1` to lift the current slot's touch.
    pub fn tracking_id(id: i32) -> Self {
        Self::abs(codes::ABS_MT_TRACKING_ID, id)
    }

    pub fn position_x(x: i32) -> Self {
        Self::abs(codes::ABS_MT_POSITION_X, x)
    }

    pub fn position_y(y: i32) -> Self {
        Self::abs(codes::ABS_MT_POSITION_Y, y)
    }

    /// `SYN_REPORT`: the device's frame-commit marker.
    pub fn commit() -> Self {
        Self::syn(codes::SYN_REPORT)
    }

    /// `SYN_DROPPED`: the kernel dropped events from its buffer.
    pub fn dropped() -> Self {
        Self::syn(codes::SYN_DROPPED)
    }
}
