//! services/api/src/adapters/openai.rs
//!
//! This module contains the adapter for the language model.
//! It implements the `TextGenerationService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use study_assistant_core::{
    domain::ChatRole,
    ports::{GenerationRequest, PortError, PortResult, TextGenerationService},
};
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `TextGenerationService` using OpenAI chat completions.
#[derive(Clone)]
pub struct OpenAiTextAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiTextAdapter {
    /// Creates a new `OpenAiTextAdapter` that uses `model` unless a request overrides it.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

fn build_error(e: OpenAIError) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn to_messages(request: &GenerationRequest) -> PortResult<Vec<ChatCompletionRequestMessage>> {
    let mut messages = Vec::with_capacity(request.turns.len() + 1);
    if let Some(system) = &request.system {
        messages.push(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system.as_str())
                .build()
                .map_err(build_error)?
                .into(),
        );
    }
    for turn in &request.turns {
        let message: ChatCompletionRequestMessage = match turn.role {
            ChatRole::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(turn.content.as_str())
                .build()
                .map_err(build_error)?
                .into(),
            ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
                .content(turn.content.as_str())
                .build()
                .map_err(build_error)?
                .into(),
            ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(turn.content.as_str())
                .build()
                .map_err(build_error)?
                .into(),
        };
        messages.push(message);
    }
    Ok(messages)
}

//=========================================================================================
// `TextGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl TextGenerationService for OpenAiTextAdapter {
    async fn generate(&self, request: &GenerationRequest) -> PortResult<String> {
        let model = request.model.as_deref().unwrap_or(&self.model);
        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(to_messages(request)?)
            .temperature(request.temperature)
            .max_completion_tokens(request.max_tokens)
            .n(1)
            .build()
            .map_err(build_error)?;

        debug!(model, turns = request.turns.len(), "Sending chat completion");

        // Call the API and manually map the error if it occurs, which respects the orphan rule.
        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        // A reply without choices or text is a shape problem, not a transport one.
        let choice = response.choices.into_iter().next().ok_or_else(|| {
            PortError::MalformedOutput("The language model returned no choices.".to_string())
        })?;
        choice.message.content.map(|c| c.trim().to_string()).ok_or_else(|| {
            PortError::MalformedOutput("The language model reply contained no text.".to_string())
        })
    }
}

/// Stands in for the language model when no API key is configured, so the rest of
/// the API stays usable and every generation reports a clear upstream error.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredGenerator;

#[async_trait]
impl TextGenerationService for UnconfiguredGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> PortResult<String> {
        Err(PortError::Unexpected(
            "OPENAI_API_KEY is not configured".to_string(),
        ))
    }
}
