//! Manages the lifecycle of one client WebSocket connection.
//!
//! A connection carries frames for any number of sessions. Each decoded
//! input is dispatched to the broker on its own task, so a slow pipeline run
//! never delays reads of the next frame. A single writer task drains the
//! connection's event channel, which keeps events for one session in the
//! order the broker generated them. When the transport closes, forwarding
//! stops but in-flight runs complete, so session state stays consistent for
//! a reconnect.

use super::protocol::{self, ServerFrame};
use crate::broker::{ErrorCode, PipelineEvent};
use crate::state::AppState;
use anyhow::Result;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info, instrument, warn};
use uuid::Uuid;

// Audio clips arrive base64-encoded inside a single frame.
const MAX_FRAME_BYTES: usize = 50 * 1024 * 1024;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.max_message_size(MAX_FRAME_BYTES)
        .on_upgrade(|socket| handle_socket(socket, state))
}

/// Main handler for an individual WebSocket connection.
#[instrument(name = "ws_connection", skip_all, fields(connection_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id = Uuid::new_v4();
    tracing::Span::current().record("connection_id", connection_id.to_string());
    info!("Client connected.");

    let (mut socket_tx, mut socket_rx) = socket.split();

    let greeting = ServerFrame::SystemStatus {
        status: "connected".to_string(),
        session_id: String::new(),
    };
    if send_frame(&mut socket_tx, &greeting).await.is_err() {
        warn!("Failed to send greeting; dropping connection.");
        return;
    }

    // One writer per connection: events enqueued by pipeline runs leave in
    // queue order, which preserves per-session ordering on the wire.
    let (events_tx, mut events_rx) = mpsc::channel::<PipelineEvent>(64);
    let writer = tokio::spawn(
        async move {
            while let Some(event) = events_rx.recv().await {
                let frame = protocol::encode(event);
                if send_frame(&mut socket_tx, &frame).await.is_err() {
                    debug!("Write failed; client likely gone.");
                    break;
                }
            }
        }
        .in_current_span(),
    );

    while let Some(msg_result) = socket_rx.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match protocol::decode(&text) {
                Ok(request) => {
                    let span = tracing::info_span!("pipeline", session_id = %request.session_id);
                    let broker = state.broker.clone();
                    let events = events_tx.clone();
                    tokio::spawn(
                        async move { broker.dispatch(request, events).await }.instrument(span),
                    );
                }
                Err(e) => {
                    // Decode failures are recovered locally: report and keep
                    // reading.
                    warn!(error = %e, "Rejecting undecodable frame.");
                    let event = PipelineEvent::Error {
                        session_id: protocol::salvage_session_id(&text).unwrap_or_default(),
                        code: ErrorCode::MalformedMessage,
                        message: e.to_string(),
                    };
                    if events_tx.send(event).await.is_err() {
                        break;
                    }
                }
            },
            Ok(Message::Binary(_)) => {
                warn!("Ignoring binary frame; audio travels base64-encoded in text frames.");
            }
            Ok(Message::Close(_)) => {
                info!("Client sent close frame.");
                break;
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Err(e) => {
                warn!(error = ?e, "Error receiving from client.");
                break;
            }
        }
    }

    // In-flight runs hold sender clones and complete on their own; the
    // writer ends once the last of them is done or the socket rejects a
    // write.
    drop(events_tx);
    let _ = writer.await;
    info!("Client disconnected.");
}

/// A helper function to serialize and send a `ServerFrame` to the client.
pub(crate) async fn send_frame(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    frame: &ServerFrame,
) -> Result<()> {
    let serialized = serde_json::to_string(frame)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
