//! Pipeline orchestration.
//!
//! One pipeline run drives Recognizer (audio input only) -> Responder ->
//! Synthesizer for a single input, appending to the session history as it
//! goes and emitting zero or more progress events followed by exactly one
//! terminal Result or Error event. Runs for different sessions proceed
//! independently; runs for the same session are serialized through the
//! session store's busy flag.

use crate::config::BusyPolicy;
use crate::sessions::{QueuedRun, SessionStore};
use anchor_core::{
    recognizer::Recognizer,
    responder::Responder,
    synthesizer::{SpeechAudio, Synthesizer},
    turn::{Role, Turn},
};
use bytes::Bytes;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// The payload of one client input, already decoded from the wire.
#[derive(Debug, Clone)]
pub enum PipelineInput {
    Text(String),
    Audio(Bytes),
}

/// One decoded client input addressed to a session. Consumed exactly once.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub session_id: String,
    pub input: PipelineInput,
}

/// Error vocabulary surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    MalformedMessage,
    SessionBusy,
    SttFailed,
    LlmFailed,
    TtsFailed,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::MalformedMessage => "MALFORMED_MESSAGE",
            ErrorCode::SessionBusy => "SESSION_BUSY",
            ErrorCode::SttFailed => "STT_FAILED",
            ErrorCode::LlmFailed => "LLM_FAILED",
            ErrorCode::TtsFailed => "TTS_FAILED",
        }
    }
}

/// Events produced by a pipeline run, delivered to the originating
/// connection in the order generated.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Informational progress; zero or more per run.
    Status { session_id: String, status: String },
    /// Terminal success. `audio` is absent when synthesis failed or was
    /// skipped.
    Result {
        session_id: String,
        text: String,
        audio: Option<SpeechAudio>,
    },
    /// Terminal failure, or the non-terminal synthesis failure notice that
    /// precedes a degraded Result.
    Error {
        session_id: String,
        code: ErrorCode,
        message: String,
    },
}

/// Sequences the capability pipeline per session.
pub struct Broker {
    sessions: Arc<SessionStore>,
    recognizer: Arc<dyn Recognizer>,
    responder: Arc<dyn Responder>,
    synthesizer: Arc<dyn Synthesizer>,
    system_prompt: Option<String>,
    stage_timeout: Duration,
    streaming: bool,
    busy_policy: BusyPolicy,
}

impl Broker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sessions: Arc<SessionStore>,
        recognizer: Arc<dyn Recognizer>,
        responder: Arc<dyn Responder>,
        synthesizer: Arc<dyn Synthesizer>,
        system_prompt: Option<String>,
        stage_timeout: Duration,
        streaming: bool,
        busy_policy: BusyPolicy,
    ) -> Self {
        Self {
            sessions,
            recognizer,
            responder,
            synthesizer,
            system_prompt,
            stage_timeout,
            streaming,
            busy_policy,
        }
    }

    /// Entry point for one decoded client input.
    ///
    /// Acquires the session (or defers/rejects per the busy policy), then
    /// runs the pipeline. After each run the session is released exactly
    /// once; under the queue policy the release hands back the next pending
    /// input and this task continues with it, preserving arrival order.
    pub async fn dispatch(&self, request: PipelineRequest, events: mpsc::Sender<PipelineEvent>) {
        let PipelineRequest { session_id, input } = request;
        let notify = events.clone();
        let run = QueuedRun { input, events };

        let mut run = match self.busy_policy {
            BusyPolicy::Queue => match self.sessions.acquire_or_enqueue(&session_id, run) {
                Some(run) => run,
                None => {
                    debug!(%session_id, "session busy, input queued");
                    emit(
                        &notify,
                        PipelineEvent::Status {
                            session_id,
                            status: "queued".to_string(),
                        },
                    )
                    .await;
                    return;
                }
            },
            BusyPolicy::Reject => {
                if self.sessions.try_acquire(&session_id) {
                    run
                } else {
                    debug!(%session_id, "session busy, input rejected");
                    emit(
                        &notify,
                        PipelineEvent::Error {
                            session_id,
                            code: ErrorCode::SessionBusy,
                            message: "a run is already in progress for this session".to_string(),
                        },
                    )
                    .await;
                    return;
                }
            }
        };

        loop {
            self.run_pipeline(&session_id, run.input, &run.events).await;
            match self.sessions.release(&session_id) {
                Some(next) => {
                    debug!(%session_id, "continuing with queued input");
                    run = next;
                }
                None => break,
            }
        }
    }

    async fn run_pipeline(
        &self,
        session_id: &str,
        input: PipelineInput,
        events: &mpsc::Sender<PipelineEvent>,
    ) {
        let text = match input {
            PipelineInput::Text(text) => text,
            PipelineInput::Audio(audio) => match self.recognize(audio).await {
                Ok(text) => {
                    emit(
                        events,
                        PipelineEvent::Status {
                            session_id: session_id.to_string(),
                            status: format!("recognized: {text}"),
                        },
                    )
                    .await;
                    text
                }
                Err(message) => {
                    warn!(%session_id, %message, "recognition stage failed");
                    emit(events, error_event(session_id, ErrorCode::SttFailed, message)).await;
                    return;
                }
            },
        };

        // The user turn joins the history before the responder runs, so the
        // prompt context includes it.
        self.sessions.append_turn(session_id, Role::User, &text);
        let history = self.sessions.history(session_id);

        let reply = match self.respond(session_id, &history, events).await {
            Ok(reply) => reply,
            Err(message) => {
                warn!(%session_id, %message, "responder stage failed");
                emit(events, error_event(session_id, ErrorCode::LlmFailed, message)).await;
                return;
            }
        };
        self.sessions.append_turn(session_id, Role::Assistant, &reply);

        let audio = match self.synthesize(&reply).await {
            Ok(speech) => Some(speech),
            Err(message) => {
                // Synthesis is not essential: surface the failure, then
                // still deliver the successful text reply.
                warn!(%session_id, %message, "synthesis stage failed, delivering text only");
                emit(events, error_event(session_id, ErrorCode::TtsFailed, message)).await;
                None
            }
        };

        info!(%session_id, "pipeline run completed");
        emit(
            events,
            PipelineEvent::Result {
                session_id: session_id.to_string(),
                text: reply,
                audio,
            },
        )
        .await;
    }

    async fn recognize(&self, audio: Bytes) -> Result<String, String> {
        match timeout(self.stage_timeout, self.recognizer.transcribe(audio)).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(timeout_message(self.stage_timeout)),
        }
    }

    async fn respond(
        &self,
        session_id: &str,
        history: &[Turn],
        events: &mpsc::Sender<PipelineEvent>,
    ) -> Result<String, String> {
        let system_prompt = self.system_prompt.as_deref();

        if !self.streaming {
            return match timeout(self.stage_timeout, self.responder.reply(system_prompt, history))
                .await
            {
                Ok(Ok(reply)) => Ok(reply),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(timeout_message(self.stage_timeout)),
            };
        }

        // Incremental output: forward each chunk as a progress event, but
        // always assemble the full reply before advancing the state machine.
        let assemble = async {
            let mut stream = self
                .responder
                .stream_reply(system_prompt, history)
                .await
                .map_err(|e| e.to_string())?;
            let mut reply = String::new();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| e.to_string())?;
                emit(
                    events,
                    PipelineEvent::Status {
                        session_id: session_id.to_string(),
                        status: format!("partial: {chunk}"),
                    },
                )
                .await;
                reply.push_str(&chunk);
            }
            if reply.is_empty() {
                Err("streamed completion produced no text".to_string())
            } else {
                Ok(reply)
            }
        };

        match timeout(self.stage_timeout, assemble).await {
            Ok(result) => result,
            Err(_) => Err(timeout_message(self.stage_timeout)),
        }
    }

    async fn synthesize(&self, text: &str) -> Result<SpeechAudio, String> {
        match timeout(self.stage_timeout, self.synthesizer.synthesize(text)).await {
            Ok(Ok(speech)) => Ok(speech),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(timeout_message(self.stage_timeout)),
        }
    }
}

fn timeout_message(stage_timeout: Duration) -> String {
    format!("timed out after {}s", stage_timeout.as_secs())
}

fn error_event(session_id: &str, code: ErrorCode, message: String) -> PipelineEvent {
    PipelineEvent::Error {
        session_id: session_id.to_string(),
        code,
        message,
    }
}

async fn emit(events: &mpsc::Sender<PipelineEvent>, event: PipelineEvent) {
    if events.send(event).await.is_err() {
        // Connection is gone; the run still completes so history stays
        // consistent for a reconnect.
        debug!("event receiver dropped, discarding event");
    }
}
