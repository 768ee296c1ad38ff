//! Integration tests for the touch-core pipeline.
//!
//! These drive realistic device traces through the public API: raw events go
//! into a [`SlotTracker`], the flushed touch events are rendered as
//! [`WireMessage`] JSON and framed, and the resulting bytes are decoded again
//! the way a display client would.

use touch_core::{
    decode_control, encode_text, ControlFrame, RawEvent, SlotTracker, TouchEvent, TouchKind,
    WireMessage,
};

/// Feeds a whole trace and collects every emitted event.
fn replay(tracker: &mut SlotTracker, trace: &[RawEvent]) -> Vec<TouchEvent> {
    trace.iter().flat_map(|ev| tracker.process(*ev)).collect()
}

/// Two fingers land, drag, and lift one after the other.
fn two_finger_drag() -> Vec<RawEvent> {
    vec![
        // Frame 1: both fingers land.
        RawEvent::slot(0),
        RawEvent::tracking_id(101),
        RawEvent::position_x(100),
        RawEvent::position_y(200),
        RawEvent::slot(1),
        RawEvent::tracking_id(102),
        RawEvent::position_x(500),
        RawEvent::position_y(600),
        RawEvent::commit(),
        // Frame 2: both drag; the kernel only re-selects slots on change.
        RawEvent::position_y(610),
        RawEvent::slot(0),
        RawEvent::position_x(110),
        RawEvent::commit(),
        // Frame 3: first finger lifts, second keeps still.
        RawEvent::tracking_id(-1),
        RawEvent::commit(),
        // Frame 4: second finger lifts.
        RawEvent::slot(1),
        RawEvent::tracking_id(-1),
        RawEvent::commit(),
    ]
}

#[test]
fn test_two_finger_drag_produces_expected_lifecycle() {
    // Arrange
    let mut tracker = SlotTracker::new();

    // Act
    let events = replay(&mut tracker, &two_finger_drag());

    // Assert
    let summary: Vec<(TouchKind, i32)> = events.iter().map(|e| (e.kind, e.id)).collect();
    assert_eq!(
        summary,
        vec![
            (TouchKind::Start, 101),
            (TouchKind::Start, 102),
            (TouchKind::Move, 101),
            (TouchKind::Move, 102),
            (TouchKind::Move, 102),
            (TouchKind::Move, 101),
            (TouchKind::End, 101),
            (TouchKind::End, 102),
        ]
    );
    assert_eq!(tracker.active_count(), 0);
}

#[test]
fn test_every_start_is_matched_by_exactly_one_end() {
    let mut tracker = SlotTracker::new();
    let events = replay(&mut tracker, &two_finger_drag());

    for id in [101, 102] {
        let starts = events
            .iter()
            .filter(|e| e.id == id && e.kind == TouchKind::Start)
            .count();
        let ends = events
            .iter()
            .filter(|e| e.id == id && e.kind == TouchKind::End)
            .count();
        assert_eq!((starts, ends), (1, 1), "touch {id}");
    }
}

#[test]
fn test_no_move_follows_an_end_for_the_same_id() {
    let mut tracker = SlotTracker::new();
    let events = replay(&mut tracker, &two_finger_drag());

    for (i, ev) in events.iter().enumerate() {
        if ev.kind == TouchKind::End {
            assert!(events[i + 1..]
                .iter()
                .all(|later| later.id != ev.id || later.kind == TouchKind::Start));
        }
    }
}

#[test]
fn test_seq_strictly_increases_without_gaps() {
    let mut tracker = SlotTracker::new();
    let events = replay(&mut tracker, &two_finger_drag());

    for pair in events.windows(2) {
        assert_eq!(pair[1].seq, pair[0].seq + 1);
    }
    assert_eq!(events.first().map(|e| e.seq), Some(0));
}

#[test]
fn test_lift_after_slot_reuse_resolves_to_latest_tracking_id() {
    // Arrange: id 7 uses slot 0, lifts, then id 8 takes over slot 0.
    let mut tracker = SlotTracker::new();
    let trace = [
        RawEvent::slot(0),
        RawEvent::tracking_id(7),
        RawEvent::commit(),
        RawEvent::tracking_id(-1),
        RawEvent::commit(),
        RawEvent::tracking_id(8),
        RawEvent::position_x(4),
        RawEvent::commit(),
        RawEvent::tracking_id(-1),
        RawEvent::commit(),
    ];

    // Act
    let events = replay(&mut tracker, &trace);

    // Assert
    let last = events.last().copied().expect("events emitted");
    assert_eq!((last.kind, last.id), (TouchKind::End, 8));
}

#[test]
fn test_events_survive_json_and_framing_as_client_sees_them() {
    // Arrange
    let mut tracker = SlotTracker::new();
    let events = replay(
        &mut tracker,
        &[
            RawEvent::slot(0),
            RawEvent::tracking_id(5),
            RawEvent::position_x(10),
            RawEvent::position_y(20),
            RawEvent::commit(),
        ],
    );

    // Act: render and frame every event into one outbound byte stream.
    let mut stream = Vec::new();
    for ev in &events {
        let json = WireMessage::from(ev).to_json().expect("serialize");
        stream.extend(encode_text(json.as_bytes()));
    }

    // Assert: a client decoding the stream sees the same messages in order.
    let mut received = Vec::new();
    let mut offset = 0;
    while offset < stream.len() {
        let (frame, consumed) = decode_control(&stream[offset..]).expect("decode");
        let ControlFrame::Data(payload) = frame else {
            panic!("expected data frame, got {frame:?}");
        };
        received.push(serde_json::from_slice::<WireMessage>(&payload).expect("json"));
        offset += consumed;
    }
    assert_eq!(
        received,
        vec![
            WireMessage::TouchStart {
                id: 5,
                x: 0,
                y: 0,
                seq: 0
            },
            WireMessage::TouchMove {
                id: 5,
                x: 10,
                y: 20,
                seq: 1
            },
        ]
    );
}
