//! Infrastructure layer for touch-bridge.
//!
//! Everything that touches the outside world lives here: touch devices,
//! client sockets, and the accept loop.

pub mod connection;
pub mod device;
pub mod ws_server;

pub use connection::{serve_connection, CloseReason, ConnectionOutcome, ConnectionState, RejectReason};
pub use ws_server::{bind, run_server, serve};
