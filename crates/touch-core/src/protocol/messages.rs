//! JSON payloads carried inside text frames.
//!
//! Every payload is a JSON object whose `"type"` field names the variant; all
//! other fields sit beside it:
//!
//! ```json
//! {"type":"connected"}
//! {"type":"touch_start","id":5,"x":0,"y":0,"seq":0}
//! {"type":"touch_move","id":5,"x":10,"y":20,"seq":1}
//! {"type":"touch_end","id":5,"seq":2}
//! ```
//!
//! `seq` lets a client detect gaps.  Clients that ignore unknown fields see
//! only `type`, `id`, `x`, and `y`.

use serde::{Deserialize, Serialize};

use crate::domain::touch::{TouchEvent, TouchKind};

/// A message sent from the bridge to a display client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    /// Sent once, right after the handshake completes.
    Connected,
    TouchStart { id: i32, x: i32, y: i32, seq: u64 },
    TouchMove { id: i32, x: i32, y: i32, seq: u64 },
    /// End payloads omit coordinates.
    TouchEnd { id: i32, seq: u64 },
}

impl WireMessage {
    /// Serializes the message to its compact JSON text.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<&TouchEvent> for WireMessage {
    fn from(ev: &TouchEvent) -> Self {
        match ev.kind {
            TouchKind::Start => WireMessage::TouchStart {
                id: ev.id,
                x: ev.x,
                y: ev.y,
                seq: ev.seq,
            },
            TouchKind::Move => WireMessage::TouchMove {
                id: ev.id,
                x: ev.x,
                y: ev.y,
                seq: ev.seq,
            },
            TouchKind::End => WireMessage::TouchEnd {
                id: ev.id,
                seq: ev.seq,
            },
        }
    }
}

impl From<TouchEvent> for WireMessage {
    fn from(ev: TouchEvent) -> Self {
        WireMessage::from(&ev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connected_serializes_to_bare_type() {
        assert_eq!(
            WireMessage::Connected.to_json().unwrap(),
            r#"{"type":"connected"}"#
        );
    }

    #[test]
    fn test_touch_start_field_layout() {
        let msg = WireMessage::from(TouchEvent::start(5, 0, 0, 0));
        assert_eq!(
            msg.to_json().unwrap(),
            r#"{"type":"touch_start","id":5,"x":0,"y":0,"seq":0}"#
        );
    }

    #[test]
    fn test_touch_move_field_layout() {
        let msg = WireMessage::from(TouchEvent::moved(5, 10, 20, 1));
        assert_eq!(
            msg.to_json().unwrap(),
            r#"{"type":"touch_move","id":5,"x":10,"y":20,"seq":1}"#
        );
    }

    #[test]
    fn test_touch_end_omits_coordinates() {
        let msg = WireMessage::from(TouchEvent::end(5, 15, 3, 2));
        assert_eq!(
            msg.to_json().unwrap(),
            r#"{"type":"touch_end","id":5,"seq":2}"#
        );
    }

    #[test]
    fn test_client_ignoring_seq_still_sees_base_schema() {
        // A consumer that only knows the base fields.
        #[derive(Deserialize)]
        struct Base {
            #[serde(rename = "type")]
            kind: String,
            id: i32,
            x: i32,
            y: i32,
        }

        let json = WireMessage::from(TouchEvent::moved(3, 7, 8, 42))
            .to_json()
            .unwrap();
        let base: Base = serde_json::from_str(&json).unwrap();

        assert_eq!((base.kind.as_str(), base.id, base.x, base.y), ("touch_move", 3, 7, 8));
    }

    #[test]
    fn test_deserialize_round_trip() {
        let json = r#"{"type":"touch_end","id":9,"seq":11}"#;
        let msg: WireMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg, WireMessage::TouchEnd { id: 9, seq: 11 });
    }
}
