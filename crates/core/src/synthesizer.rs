//! Speech synthesis contract and an HTTP-backed implementation.

use async_trait::async_trait;
use bytes::Bytes;

/// Synthesized speech: raw audio bytes plus their container format ("wav",
/// "mp3", ...).
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechAudio {
    pub audio: Bytes,
    pub format: String,
}

/// Errors produced by a synthesis backend.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("synthesis backend unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("synthesis backend rejected the request: {0}")]
    Backend(String),
}

/// Turns reply text into speech audio.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<SpeechAudio, SynthesisError>;
}

/// A `Synthesizer` backed by a GPT-SoVITS-style HTTP API.
///
/// `POST /tts` with a JSON body carrying the text and the requested media
/// type; the response body is the raw audio. Non-2xx responses carry a
/// human-readable rejection message.
pub struct HttpSynthesizer {
    client: reqwest::Client,
    base_url: String,
    format: String,
}

impl HttpSynthesizer {
    pub fn new(base_url: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            format: format.into(),
        }
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<SpeechAudio, SynthesisError> {
        let response = self
            .client
            .post(format!("{}/tts", self.base_url))
            .json(&serde_json::json!({
                "text": text,
                "media_type": self.format,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Backend(format!("{status}: {detail}")));
        }

        let audio = response.bytes().await?;
        tracing::debug!(bytes = audio.len(), format = %self.format, "synthesizer produced audio");
        Ok(SpeechAudio {
            audio,
            format: self.format.clone(),
        })
    }
}

/// A mock `Synthesizer` returning a fixed byte pattern, for tests and
/// offline development.
pub struct MockSynthesizer {
    pub audio: Bytes,
    pub format: String,
}

impl MockSynthesizer {
    pub fn wav() -> Self {
        Self {
            audio: Bytes::from_static(b"RIFF\x00\x00\x00\x00WAVE"),
            format: "wav".to_string(),
        }
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(&self, _text: &str) -> Result<SpeechAudio, SynthesisError> {
        Ok(SpeechAudio {
            audio: self.audio.clone(),
            format: self.format.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_synthesizer_format() {
        let synthesizer = MockSynthesizer::wav();
        let speech = synthesizer.synthesize("hello").await.unwrap();
        assert_eq!(speech.format, "wav");
        assert!(speech.audio.starts_with(b"RIFF"));
    }
}
