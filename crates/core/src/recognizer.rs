//! Speech recognition contract and an HTTP-backed implementation.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;

/// Errors produced by a recognition backend.
#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    #[error("recognition backend unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("recognition backend rejected the request: {0}")]
    Backend(String),
    #[error("recognition produced no text")]
    EmptyTranscript,
}

/// Turns raw audio bytes into text.
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn transcribe(&self, audio: Bytes) -> Result<String, RecognitionError>;
}

#[derive(Deserialize)]
struct TranscriptBody {
    text: String,
}

/// A `Recognizer` that posts audio to a speech-to-text inference server.
///
/// The server is expected to accept the raw audio body on `POST /transcribe`
/// and answer with `{"text": "..."}`. An optional language hint is passed as
/// a query parameter.
pub struct HttpRecognizer {
    client: reqwest::Client,
    base_url: String,
    language: Option<String>,
}

impl HttpRecognizer {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            language: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

#[async_trait]
impl Recognizer for HttpRecognizer {
    async fn transcribe(&self, audio: Bytes) -> Result<String, RecognitionError> {
        let mut request = self
            .client
            .post(format!("{}/transcribe", self.base_url))
            .header("content-type", "application/octet-stream")
            .body(audio);
        if let Some(language) = &self.language {
            request = request.query(&[("language", language)]);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(RecognitionError::Backend(format!("{status}: {detail}")));
        }

        let body: TranscriptBody = response.json().await?;
        let text = body.text.trim().to_string();
        if text.is_empty() {
            return Err(RecognitionError::EmptyTranscript);
        }
        tracing::debug!(chars = text.len(), "recognizer produced transcript");
        Ok(text)
    }
}

/// A mock `Recognizer` returning a fixed transcript, for tests and offline
/// development.
pub struct MockRecognizer {
    pub transcript: String,
}

#[async_trait]
impl Recognizer for MockRecognizer {
    async fn transcribe(&self, _audio: Bytes) -> Result<String, RecognitionError> {
        Ok(self.transcript.clone())
    }
}
