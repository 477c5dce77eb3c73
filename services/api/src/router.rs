//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application: the
//! WebSocket endpoint, the liveness probe, and the session inspection
//! endpoint.

use crate::{handlers, state::AppState, ws::ws_handler};

use axum::{Router, routing::get};
use std::sync::Arc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/sessions", get(handlers::list_sessions))
        .route("/ws", get(ws_handler))
        .with_state(app_state)
}
