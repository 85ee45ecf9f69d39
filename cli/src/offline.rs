//! `--mock`: a deterministic model and executor for offline runs.

use std::sync::atomic::{AtomicUsize, Ordering};

use optiform::prompts::{CODE_HEADER, ELEMENT_HEADER, FIX_HEADER, JUDGE_HEADER};
use optiform::{ExecutionOutput, LlmError, Message, MockExecutor, MockLlm};

/// Answer printed by every offline solver run.
pub const OFFLINE_ANSWER: &str = "0";

/// Numbered placeholder fragments, a one-line solver, and a neutral judgment.
pub fn offline_llm() -> MockLlm {
    let counter = AtomicUsize::new(0);
    MockLlm::with_responder(move |messages: &[Message], _| {
        let prompt = messages.last().map(Message::content).unwrap_or_default();
        if let Some(rest) = prompt.strip_prefix(ELEMENT_HEADER) {
            let key = rest.split(':').next().unwrap_or_default().trim();
            let n = counter.fetch_add(1, Ordering::Relaxed);
            Ok(format!("offline {} #{}", key, n))
        } else if prompt.starts_with(CODE_HEADER) || prompt.starts_with(FIX_HEADER) {
            Ok(format!("print({})", OFFLINE_ANSWER))
        } else if prompt.starts_with(JUDGE_HEADER) {
            Ok(r#"{"score": 50, "layers": {}}"#.to_string())
        } else {
            Err(LlmError::Validation("offline model got an unknown prompt".into()))
        }
    })
}

pub fn offline_executor() -> MockExecutor {
    MockExecutor::with_output(ExecutionOutput::ok(format!("{}\n", OFFLINE_ANSWER)))
}
