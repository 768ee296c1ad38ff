//! touch-bridge library crate.
//!
//! Reads a Linux multi-touch screen and pushes every touch to any number of
//! connected display clients.
//!
//! # Architecture
//!
//! ```text
//! /dev/input/eventN (MT type B)
//!         ↓
//! [touch-bridge]
//!   ├── domain/           BridgeConfig and its TOML file form
//!   ├── application/
//!   │     ├── device_pump  owns the SlotTracker, publishes flushed batches
//!   │     ├── bus          fan-out to subscribers with bounded queues
//!   │     └── runtime      TouchBridge: bus + shutdown token
//!   └── infrastructure/
//!         ├── device/      EventSource trait, evdev and channel sources
//!         ├── connection   per-client handshake, writer, reader
//!         └── ws_server    accept loop
//!         ↓
//! display clients (JSON in text frames)
//! ```
//!
//! # Layer rules
//!
//! - `domain` performs no I/O beyond reading the optional config file.
//! - `application` depends on `domain`, `touch-core`, and the
//!   [`EventSource`](infrastructure::device::EventSource) seam only.
//! - `infrastructure` owns sockets and device files.

/// Domain layer: configuration types.
pub mod domain;

/// Application layer: the touch bus, device pump, and bridge runtime.
pub mod application;

/// Infrastructure layer: device sources, connection handling, and the server.
pub mod infrastructure;
