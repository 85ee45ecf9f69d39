//! OpenAI Chat Completions client implementing `LlmClient` (ChatOpenAI).
//!
//! Requires `OPENAI_API_KEY` (or explicit config). `OPENAI_BASE_URL` /
//! `OPENAI_API_BASE` point the client at any OpenAI-compatible endpoint.
//! Per-call [`CompletionOptions`] override the client temperature and switch the
//! request to JSON-object response format for structured judgments.

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::error::LlmError;
use crate::llm::{CompletionOptions, LlmClient, LlmResponse, LlmUsage};
use crate::message::Message;

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs, ResponseFormat,
    },
    Client,
};

/// OpenAI Chat Completions client implementing `LlmClient`.
pub struct ChatOpenAI {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: Option<f32>,
}

impl ChatOpenAI {
    /// Build client with default config (API key from `OPENAI_API_KEY` env).
    pub fn new(model: impl Into<String>) -> Self {
        Self::with_config(Self::config_from_env(), model)
    }

    /// Build client with custom config (e.g. custom API key or base URL).
    pub fn with_config(config: OpenAIConfig, model: impl Into<String>) -> Self {
        Self {
            client: Client::with_config(config),
            model: model.into(),
            temperature: None,
        }
    }

    /// Default temperature when a call does not set one.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Default config, honoring `OPENAI_BASE_URL` or `OPENAI_API_BASE` when set.
    fn config_from_env() -> OpenAIConfig {
        let config = OpenAIConfig::new();
        match std::env::var("OPENAI_BASE_URL").or_else(|_| std::env::var("OPENAI_API_BASE")) {
            Ok(base) => config.with_api_base(base.trim_end_matches('/')),
            Err(_) => config,
        }
    }

    fn messages_to_request(messages: &[Message]) -> Vec<ChatCompletionRequestMessage> {
        messages
            .iter()
            .map(|m| match m {
                Message::System(s) => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessage::from(s.as_str()),
                ),
                Message::User(s) => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessage::from(s.as_str()),
                ),
                Message::Assistant(s) => {
                    ChatCompletionRequestMessage::Assistant((s.as_str()).into())
                }
            })
            .collect()
    }
}

#[async_trait]
impl LlmClient for ChatOpenAI {
    async fn invoke(&self, messages: &[Message]) -> Result<LlmResponse, LlmError> {
        self.invoke_with(messages, &CompletionOptions::default()).await
    }

    async fn invoke_with(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<LlmResponse, LlmError> {
        let trace_id = uuid::Uuid::new_v4().to_string();
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(self.model.clone());
        args.messages(Self::messages_to_request(messages));

        let temperature = options.temperature.or(self.temperature);
        if let Some(t) = temperature {
            args.temperature(t);
        }
        if options.json {
            args.response_format(ResponseFormat::JsonObject);
        }

        let request = args
            .build()
            .map_err(|e| LlmError::Transport(format!("OpenAI request build failed: {}", e)))?;

        debug!(
            trace_id = %trace_id,
            model = %self.model,
            message_count = messages.len(),
            temperature = ?temperature,
            json = options.json,
            "OpenAI chat create"
        );
        if let Ok(js) = serde_json::to_string_pretty(&request) {
            trace!(trace_id = %trace_id, request = %js, "OpenAI request body");
        }

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| LlmError::Transport(format!("OpenAI API error: {}", e)))?;

        let usage = response.usage.as_ref().map(|u| LlmUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Validation("OpenAI returned no choices".to_string()))?;
        let content = choice.message.content.unwrap_or_default();
        trace!(trace_id = %trace_id, content = %content, "OpenAI response content");

        Ok(LlmResponse { content, usage })
    }
}
