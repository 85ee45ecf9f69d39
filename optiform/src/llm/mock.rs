//! Mock LLM for tests and offline runs.
//!
//! Three modes: a fixed reply, a scripted queue of replies (falls back to the fixed
//! reply when drained), or a responder closure that sees the request messages and
//! picks the reply. The responder mode lets a test drive every search component
//! from one client, since each prompt kind carries a recognizable header.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::LlmError;
use crate::llm::{CompletionOptions, LlmClient, LlmResponse};
use crate::message::Message;

type Responder = Box<dyn Fn(&[Message], &CompletionOptions) -> Result<String, LlmError> + Send + Sync>;

/// Mock LLM: fixed, scripted or computed replies; counts calls.
pub struct MockLlm {
    content: String,
    script: Mutex<VecDeque<String>>,
    responder: Option<Responder>,
    calls: AtomicUsize,
}

impl MockLlm {
    /// Always replies with `content`.
    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            script: Mutex::new(VecDeque::new()),
            responder: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Replies with each scripted entry in order, then with an empty string.
    pub fn scripted<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            content: String::new(),
            script: Mutex::new(replies.into_iter().map(Into::into).collect()),
            responder: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Replies with whatever `f` returns for the request.
    pub fn with_responder<F>(f: F) -> Self
    where
        F: Fn(&[Message], &CompletionOptions) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            content: String::new(),
            script: Mutex::new(VecDeque::new()),
            responder: Some(Box::new(f)),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of invocations so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_reply(&self, messages: &[Message], options: &CompletionOptions) -> Result<String, LlmError> {
        if let Some(ref f) = self.responder {
            return f(messages, options);
        }
        let scripted = self
            .script
            .lock()
            .map_err(|_| LlmError::Transport("mock script lock poisoned".to_string()))?
            .pop_front();
        Ok(scripted.unwrap_or_else(|| self.content.clone()))
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn invoke(&self, messages: &[Message]) -> Result<LlmResponse, LlmError> {
        self.invoke_with(messages, &CompletionOptions::default()).await
    }

    async fn invoke_with(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<LlmResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let content = self.next_reply(messages, options)?;
        Ok(LlmResponse {
            content,
            usage: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixed_content_ignores_messages() {
        let llm = MockLlm::with_content("fixed");
        let out = llm.invoke(&[]).await.unwrap();
        assert_eq!(out.content, "fixed");
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn scripted_replies_in_order_then_empty() {
        let llm = MockLlm::scripted(["a", "b"]);
        assert_eq!(llm.invoke(&[]).await.unwrap().content, "a");
        assert_eq!(llm.invoke(&[]).await.unwrap().content, "b");
        assert_eq!(llm.invoke(&[]).await.unwrap().content, "");
        assert_eq!(llm.calls(), 3);
    }

    #[tokio::test]
    async fn responder_sees_prompt_and_options() {
        let llm = MockLlm::with_responder(|messages, options| {
            let prompt = messages.last().map(Message::content).unwrap_or_default();
            Ok(format!("{}:{}", prompt, options.json))
        });
        let out = llm
            .invoke_with(&[Message::user("hi")], &CompletionOptions::json(0.0))
            .await
            .unwrap();
        assert_eq!(out.content, "hi:true");
    }
}
