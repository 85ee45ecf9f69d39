//! Language-model client abstraction used by the Expander, Simulator and Evaluator.
//!
//! [`LlmClient`] is the seam to the model service; [`ChatOpenAI`] talks to an
//! OpenAI-compatible endpoint and [`MockLlm`] serves tests and offline runs.
//! [`LlmGateway`] wraps a client with the per-call timeout, the retry policy and
//! cancellation, and validates structured (JSON) output so malformed replies are
//! retried instead of crashing a component.

mod mock;
mod openai;

pub use mock::MockLlm;
pub use openai::ChatOpenAI;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::error::LlmError;
use crate::message::Message;
use crate::retry::{retry_llm, RetryPolicy};

/// Token usage for one LLM call (prompt + completion).
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct LlmUsage {
    /// Tokens in the prompt (input).
    pub prompt_tokens: u32,
    /// Tokens in the completion (output).
    pub completion_tokens: u32,
    /// Total tokens (prompt + completion).
    pub total_tokens: u32,
}

/// Response from an LLM completion.
#[derive(Clone, Debug, Default)]
pub struct LlmResponse {
    /// Assistant message content (plain text).
    pub content: String,
    /// Token usage for this call, when available.
    pub usage: Option<LlmUsage>,
}

/// Per-call sampling options.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CompletionOptions {
    /// Sampling temperature; `None` keeps the client's default.
    pub temperature: Option<f32>,
    /// Ask the service for a JSON object response.
    pub json: bool,
}

impl CompletionOptions {
    pub fn text(temperature: f32) -> Self {
        Self {
            temperature: Some(temperature),
            json: false,
        }
    }

    pub fn json(temperature: f32) -> Self {
        Self {
            temperature: Some(temperature),
            json: true,
        }
    }
}

/// LLM client: given messages, returns assistant text.
///
/// No correctness guarantee is assumed of the reply, even at temperature 0.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Invoke one completion with the client's default options.
    async fn invoke(&self, messages: &[Message]) -> Result<LlmResponse, LlmError>;

    /// Invoke with per-call options. Default ignores the options.
    async fn invoke_with(
        &self,
        messages: &[Message],
        _options: &CompletionOptions,
    ) -> Result<LlmResponse, LlmError> {
        self.invoke(messages).await
    }
}

/// Client plus call policy: timeout, retry, cancellation and output validation.
#[derive(Clone)]
pub struct LlmGateway {
    llm: Arc<dyn LlmClient>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl LlmGateway {
    pub fn new(llm: Arc<dyn LlmClient>, retry: RetryPolicy, timeout: Duration) -> Self {
        Self {
            llm,
            retry,
            timeout,
        }
    }

    /// One attempt, bounded by the timeout and the cancellation token.
    async fn attempt(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        let call = tokio::time::timeout(self.timeout, self.llm.invoke_with(messages, options));
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
            res = call => res.map_err(|_| LlmError::Timeout(self.timeout))??,
        };
        let content = response.content.trim().to_string();
        if content.is_empty() {
            return Err(LlmError::Validation("empty response".to_string()));
        }
        Ok(content)
    }

    /// Non-empty text completion, retried per policy.
    pub async fn complete_text(
        &self,
        label: &str,
        messages: &[Message],
        options: CompletionOptions,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        let options = &options;
        retry_llm(&self.retry, label, move |_| self.attempt(messages, options, cancel)).await
    }

    /// Structured completion: the reply must contain a JSON object that parses as `T`
    /// and passes `validate`. Shape failures are retried with the same prompt.
    pub async fn complete_json<T, V>(
        &self,
        label: &str,
        messages: &[Message],
        options: CompletionOptions,
        cancel: &CancellationToken,
        validate: V,
    ) -> Result<T, LlmError>
    where
        T: DeserializeOwned,
        V: Fn(&T) -> Result<(), String>,
    {
        let options = &options;
        let validate = &validate;
        retry_llm(&self.retry, label, move |_| async move {
            let text = self.attempt(messages, options, cancel).await?;
            let json = extract_json_object(&text)
                .ok_or_else(|| LlmError::Validation("no JSON object in reply".to_string()))?;
            let value: T =
                serde_json::from_str(json).map_err(|e| LlmError::Validation(e.to_string()))?;
            validate(&value).map_err(LlmError::Validation)?;
            Ok(value)
        })
        .await
    }
}

/// Returns the outermost `{ ... }` span of `text`, ignoring surrounding prose or
/// markdown fences.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Strips a surrounding markdown code fence (```lang ... ```), if present.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Deserialize)]
    struct Score {
        score: f64,
    }

    fn gateway(llm: MockLlm, retries: usize) -> LlmGateway {
        LlmGateway::new(
            Arc::new(llm),
            RetryPolicy::fixed(retries, Duration::ZERO),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn extract_json_object_skips_prose_and_fences() {
        let text = "Here you go:\n```json\n{\"score\": 80}\n```";
        assert_eq!(extract_json_object(text), Some("{\"score\": 80}"));
        assert_eq!(extract_json_object("no json"), None);
    }

    #[test]
    fn strip_code_fence_removes_language_tag() {
        let code = "```python\nprint(1)\n```";
        assert_eq!(strip_code_fence(code), "print(1)");
        assert_eq!(strip_code_fence("print(2)"), "print(2)");
    }

    #[tokio::test]
    async fn complete_text_rejects_empty_then_succeeds() {
        let llm = MockLlm::scripted(["   ", "x = 1"]);
        let gw = gateway(llm, 2);
        let out = gw
            .complete_text("t", &[Message::user("p")], CompletionOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, "x = 1");
    }

    #[tokio::test]
    async fn complete_json_retries_malformed_output() {
        let llm = MockLlm::scripted(["not json", "{\"score\": 150}", "{\"score\": 70}"]);
        let gw = gateway(llm, 3);
        let out: Score = gw
            .complete_json(
                "judge",
                &[Message::user("p")],
                CompletionOptions::json(0.5),
                &CancellationToken::new(),
                |s: &Score| {
                    if (0.0..=100.0).contains(&s.score) {
                        Ok(())
                    } else {
                        Err("score out of range".into())
                    }
                },
            )
            .await
            .unwrap();
        assert_eq!(out.score, 70.0);
    }

    #[tokio::test]
    async fn cancelled_token_aborts_call() {
        let gw = gateway(MockLlm::with_content("hello"), 3);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = gw
            .complete_text("t", &[Message::user("p")], CompletionOptions::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Cancelled));
    }
}
