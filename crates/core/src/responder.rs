//! Conversational responder contract and its OpenAI-compatible implementation.

use crate::turn::{Role, Turn};
use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;

/// Errors produced by a responder backend.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("completion API error: {0}")]
    Api(#[from] OpenAIError),
    #[error("completion response had no content")]
    EmptyResponse,
}

/// A lazy, finite sequence of reply text chunks for one run.
pub type ReplyStream = Pin<Box<dyn Stream<Item = Result<String, CompletionError>> + Send>>;

/// A generic client for turning conversation history into a reply.
///
/// The history is the full ordered turn sequence including the latest user
/// turn. Implementations must not mutate or reorder it.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Makes a single, non-streaming call and returns the complete reply.
    async fn reply(
        &self,
        system_prompt: Option<&str>,
        history: &[Turn],
    ) -> Result<String, CompletionError>;

    /// Makes a streaming call yielding incremental reply chunks.
    ///
    /// The default wraps [`Responder::reply`] in a single-chunk stream, so
    /// backends without incremental output satisfy the contract unchanged.
    async fn stream_reply(
        &self,
        system_prompt: Option<&str>,
        history: &[Turn],
    ) -> Result<ReplyStream, CompletionError> {
        let full = self.reply(system_prompt, history).await?;
        Ok(Box::pin(futures::stream::once(async move { Ok(full) })))
    }
}

/// An implementation of `Responder` for any OpenAI-compatible API.
pub struct OpenAiResponder {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiResponder {
    /// Creates a new responder for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the OpenAI client, including API key and base URL.
    /// * `model` - The specific model identifier to use for chat completions (e.g., "gpt-4o").
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
        }
    }

    fn build_messages(
        system_prompt: Option<&str>,
        history: &[Turn],
    ) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(history.len() + 1);
        if let Some(prompt) = system_prompt {
            messages.push(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(prompt)
                    .build()?
                    .into(),
            );
        }
        for turn in history {
            match turn.role {
                Role::User => messages.push(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(turn.text.clone())
                        .build()?
                        .into(),
                ),
                Role::Assistant => messages.push(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(turn.text.clone())
                        .build()?
                        .into(),
                ),
            }
        }
        Ok(messages)
    }
}

#[async_trait]
impl Responder for OpenAiResponder {
    async fn reply(
        &self,
        system_prompt: Option<&str>,
        history: &[Turn],
    ) -> Result<String, CompletionError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(Self::build_messages(system_prompt, history)?)
            .build()?;

        let response = self.client.chat().create(request).await?;
        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .filter(|content| !content.is_empty())
            .ok_or(CompletionError::EmptyResponse)?;

        tracing::debug!(chars = content.len(), "responder produced reply");
        Ok(content)
    }

    async fn stream_reply(
        &self,
        system_prompt: Option<&str>,
        history: &[Turn],
    ) -> Result<ReplyStream, CompletionError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(Self::build_messages(system_prompt, history)?)
            .stream(true)
            .build()?;

        let stream = self.client.chat().create_stream(request).await?;

        Ok(Box::pin(stream.filter_map(|result| async {
            match result {
                Ok(response) => {
                    let choice = response.choices.first()?;
                    let content = choice.delta.content.as_ref()?;
                    if content.is_empty() {
                        None
                    } else {
                        Some(Ok(content.clone()))
                    }
                }
                Err(e) => Some(Err(CompletionError::Api(e))),
            }
        })))
    }
}

/// A mock `Responder` for development and testing without an API backend.
///
/// Echoes a fixed reply regardless of the history.
pub struct MockResponder {
    pub reply: String,
}

#[async_trait]
impl Responder for MockResponder {
    async fn reply(
        &self,
        _system_prompt: Option<&str>,
        _history: &[Turn],
    ) -> Result<String, CompletionError> {
        Ok(self.reply.clone())
    }
}
