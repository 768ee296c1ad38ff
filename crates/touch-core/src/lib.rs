//! # touch-core
//!
//! Shared library for touch-bridge containing the multi-touch slot tracker,
//! the normalized touch event types, and the minimal framed push protocol.
//!
//! This crate has zero dependencies on OS APIs, device files, or network
//! sockets.  Everything in it can be driven from a unit test with plain
//! values.
//!
//! # Architecture overview
//!
//! touch-bridge reads a Linux multi-touch screen and pushes every touch to
//! any number of connected display clients.  This crate is the pure half of
//! that pipeline:
//!
//! - **`domain`** – The raw kernel event representation ([`RawEvent`]) and the
//!   [`SlotTracker`] that turns the stateful, batched "type B" slot protocol
//!   into discrete [`TouchEvent`]s (start / move / end), one batch per
//!   device frame commit.
//!
//! - **`protocol`** – How touch events travel over the wire.  Events are
//!   rendered as small JSON objects ([`WireMessage`]) and wrapped in
//!   length-prefixed, opcode-tagged frames by the frame codec.  The
//!   `handshake` module parses the client's upgrade request and holds the
//!   fixed upgrade response.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `touch_core::SlotTracker` instead of `touch_core::domain::slot_tracker::SlotTracker`.
pub use domain::raw_event::{EventKind, RawEvent};
pub use domain::slot_tracker::SlotTracker;
pub use domain::touch::{TouchEvent, TouchKind, TouchPoint};
pub use protocol::frame::{decode_control, encode_text, ControlFrame, FrameError};
pub use protocol::handshake::{HandshakeError, UpgradeRequest};
pub use protocol::messages::WireMessage;
