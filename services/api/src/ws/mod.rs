//! WebSocket Connection Handling
//!
//! This module contains the transport-facing half of the service. It is
//! structured into submodules:
//!
//! - `protocol`: Defines the JSON-based message format and the codec between
//!   wire frames and the broker's typed requests and events.
//! - `connection`: Manages the connection lifecycle: the frame read loop,
//!   pipeline dispatch, and ordered event forwarding.

pub mod connection;
pub mod protocol;

pub use connection::ws_handler;
