//! Scripted executor for tests and offline runs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{CodeExecutor, ExecutionOutput};

type Responder = Box<dyn Fn(&str) -> ExecutionOutput + Send + Sync>;

/// Returns queued outputs in order, then the fallback; or computes one per script.
pub struct MockExecutor {
    fallback: ExecutionOutput,
    script: Mutex<VecDeque<ExecutionOutput>>,
    responder: Option<Responder>,
    calls: AtomicUsize,
}

impl MockExecutor {
    /// Every run produces `output`.
    pub fn with_output(output: ExecutionOutput) -> Self {
        Self {
            fallback: output,
            script: Mutex::new(VecDeque::new()),
            responder: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Queued outputs, then `fallback` once drained.
    pub fn scripted<I>(outputs: I, fallback: ExecutionOutput) -> Self
    where
        I: IntoIterator<Item = ExecutionOutput>,
    {
        Self {
            fallback,
            script: Mutex::new(outputs.into_iter().collect()),
            responder: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_responder<F>(f: F) -> Self
    where
        F: Fn(&str) -> ExecutionOutput + Send + Sync + 'static,
    {
        Self {
            fallback: ExecutionOutput::default(),
            script: Mutex::new(VecDeque::new()),
            responder: Some(Box::new(f)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CodeExecutor for MockExecutor {
    async fn execute(&self, code: &str) -> ExecutionOutput {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(ref f) = self.responder {
            return f(code);
        }
        let queued = match self.script.lock() {
            Ok(mut q) => q.pop_front(),
            Err(_) => None,
        };
        queued.unwrap_or_else(|| self.fallback.clone())
    }
}
