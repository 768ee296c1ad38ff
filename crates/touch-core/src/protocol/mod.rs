//! Protocol module containing the frame codec, the upgrade handshake, and the
//! JSON payload types.

pub mod frame;
pub mod handshake;
pub mod messages;

pub use frame::{
    decode_control, decode_control_limited, encode_close, encode_ping, encode_pong, encode_text,
    ControlFrame, FrameError, MAX_INBOUND_PAYLOAD,
};
pub use handshake::{
    find_request_end, parse_upgrade_request, HandshakeError, UpgradeRequest, MAX_REQUEST_LEN,
    UPGRADE_RESPONSE,
};
pub use messages::WireMessage;
