//! Application layer for touch-bridge.
//!
//! Moves touches from the single device task to every subscriber.  Socket
//! handling lives in the infrastructure layer.

pub mod bus;
pub mod device_pump;
pub mod runtime;

pub use bus::{ActiveTouch, ConnectionId, PublishReport, Subscription, TouchBus};
pub use device_pump::pump_device;
pub use runtime::TouchBridge;
