//! Axum handlers for the HTTP side of the service: a liveness probe and an
//! in-memory session inspection endpoint.

use crate::{sessions::SessionSummary, state::AppState};
use axum::{extract::State, response::Json};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Liveness probe.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Lists every known session with its turn count and busy state.
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<Vec<SessionSummary>> {
    Json(state.sessions.snapshot())
}
