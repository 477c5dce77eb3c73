//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources: the session store, the pipeline broker, and the
//! loaded configuration.

use crate::broker::Broker;
use crate::config::Config;
use crate::sessions::SessionStore;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
/// All fields are public to be accessible from other modules.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub broker: Arc<Broker>,
    pub config: Arc<Config>,
}
