//! Touch points and the normalized touch events emitted to subscribers.

/// A live contact tracked by the [`SlotTracker`](super::SlotTracker).
///
/// `x`/`y` are the most recent coordinates the device reported for the
/// contact; `last_x`/`last_y` are the coordinates last *emitted* to
/// subscribers.  A touch only produces a move when the two pairs differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchPoint {
    pub tracking_id: i32,
    pub slot: u32,
    pub x: i32,
    pub y: i32,
    pub last_x: i32,
    pub last_y: i32,
}

impl TouchPoint {
    /// A freshly placed touch.  Coordinates start at zero until the device
    /// reports them.
    pub fn new(tracking_id: i32, slot: u32) -> Self {
        Self {
            tracking_id,
            slot,
            x: 0,
            y: 0,
            last_x: 0,
            last_y: 0,
        }
    }

    /// `true` when the current coordinates differ from the last emitted pair.
    pub fn has_moved(&self) -> bool {
        self.x != self.last_x || self.y != self.last_y
    }
}

/// Lifecycle phase of a [`TouchEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TouchKind {
    Start,
    Move,
    End,
}

/// A normalized touch-lifecycle event.
///
/// `id` is the device tracking id, which stays stable for the whole life of
/// one physical contact even if the device reuses its slot later.  `seq` is
/// assigned when the event is flushed and increases by exactly one for every
/// event, across all touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchEvent {
    pub kind: TouchKind,
    pub id: i32,
    pub x: i32,
    pub y: i32,
    pub seq: u64,
}

impl TouchEvent {
    pub fn start(id: i32, x: i32, y: i32, seq: u64) -> Self {
        Self {
            kind: TouchKind::Start,
            id,
            x,
            y,
            seq,
        }
    }

    pub fn moved(id: i32, x: i32, y: i32, seq: u64) -> Self {
        Self {
            kind: TouchKind::Move,
            id,
            x,
            y,
            seq,
        }
    }

    /// End events carry the touch's last known coordinates, which are not
    /// part of the wire payload.
    pub fn end(id: i32, x: i32, y: i32, seq: u64) -> Self {
        Self {
            kind: TouchKind::End,
            id,
            x,
            y,
            seq,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_touch_point_has_not_moved() {
        let tp = TouchPoint::new(7, 1);
        assert_eq!((tp.x, tp.y), (0, 0));
        assert!(!tp.has_moved());
    }

    #[test]
    fn test_touch_point_moved_after_coordinate_change() {
        let mut tp = TouchPoint::new(7, 1);
        tp.y = 40;
        assert!(tp.has_moved());
    }
}
