//! Defines the WebSocket message protocol between the client and the server.
//!
//! Every frame is a JSON envelope with two fields: a `type` tag and a
//! `payload` whose shape depends on the tag. The codec here is a pure
//! bidirectional mapping between frames and the broker's typed requests and
//! events; it performs no business logic.

use crate::broker::{PipelineEvent, PipelineInput, PipelineRequest};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Messages sent from the client to the server.
#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum ClientFrame {
    /// A text utterance for a conversation.
    #[serde(rename = "text_input")]
    TextInput { text: String, session_id: String },
    /// A spoken utterance, base64-encoded audio bytes.
    #[serde(rename = "audio_input")]
    AudioInput {
        audio_data_base64: String,
        session_id: String,
    },
}

/// Messages sent from the server to the client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum ServerFrame {
    /// Informational progress for a session (or the connection greeting).
    #[serde(rename = "system_status")]
    SystemStatus { status: String, session_id: String },
    /// The terminal reply for a run: text plus, when synthesis succeeded,
    /// the spoken audio.
    #[serde(rename = "ai_response")]
    AiResponse {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        audio: Option<AudioPayload>,
        session_id: String,
    },
    /// A failure notice, terminal except for the degraded-synthesis case.
    #[serde(rename = "error")]
    Error {
        code: String,
        message: String,
        session_id: String,
    },
}

/// Synthesized speech as it crosses the wire.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AudioPayload {
    pub audio_data: String,
    pub audio_format: String,
}

/// Why an inbound frame was rejected.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed message envelope: {0}")]
    Envelope(#[from] serde_json::Error),
    #[error("missing or empty payload field: {0}")]
    EmptyField(&'static str),
    #[error("invalid base64 audio payload: {0}")]
    Audio(#[from] base64::DecodeError),
}

/// Decodes a raw text frame into a pipeline request.
///
/// Rejects envelopes that are not well-formed JSON, carry an unrecognized
/// `type`, miss a required payload field, or carry audio that is not valid
/// base64.
pub fn decode(raw: &str) -> Result<PipelineRequest, DecodeError> {
    match serde_json::from_str::<ClientFrame>(raw)? {
        ClientFrame::TextInput { text, session_id } => {
            if text.is_empty() {
                return Err(DecodeError::EmptyField("text"));
            }
            Ok(PipelineRequest {
                session_id,
                input: PipelineInput::Text(text),
            })
        }
        ClientFrame::AudioInput {
            audio_data_base64,
            session_id,
        } => {
            if audio_data_base64.is_empty() {
                return Err(DecodeError::EmptyField("audio_data_base64"));
            }
            let audio = BASE64.decode(audio_data_base64)?;
            Ok(PipelineRequest {
                session_id,
                input: PipelineInput::Audio(Bytes::from(audio)),
            })
        }
    }
}

/// Maps a pipeline event onto its outbound frame.
pub fn encode(event: PipelineEvent) -> ServerFrame {
    match event {
        PipelineEvent::Status { session_id, status } => {
            ServerFrame::SystemStatus { status, session_id }
        }
        PipelineEvent::Result {
            session_id,
            text,
            audio,
        } => ServerFrame::AiResponse {
            text,
            audio: audio.map(|speech| AudioPayload {
                audio_data: BASE64.encode(&speech.audio),
                audio_format: speech.format,
            }),
            session_id,
        },
        PipelineEvent::Error {
            session_id,
            code,
            message,
        } => ServerFrame::Error {
            code: code.as_str().to_string(),
            message,
            session_id,
        },
    }
}

/// Best-effort extraction of `payload.session_id` from a frame that failed
/// to decode, so the resulting error frame can still be addressed.
pub fn salvage_session_id(raw: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    value
        .get("payload")?
        .get("session_id")?
        .as_str()
        .map(str::to_string)
}
