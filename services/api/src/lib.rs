//! Anchor API Library Crate
//!
//! This library contains all the core logic for the anchor voice-conversation
//! service: the session store, the pipeline broker, the WebSocket protocol
//! and connection handling, and routing. The `api` binary is a thin wrapper
//! around this library.

pub mod broker;
pub mod config;
pub mod handlers;
pub mod router;
pub mod sessions;
pub mod state;
pub mod ws;
