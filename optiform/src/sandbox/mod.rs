//! Code execution sandbox used by the Simulator.
//!
//! [`CodeExecutor`] runs one generated solver script and reports what happened.
//! Execution problems are part of the result, not errors: a crash or a timeout
//! becomes `success = false` so the Simulator can ask for a fix and the reward
//! can count it.

mod mock;

pub use mock::MockExecutor;

use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::llm::strip_code_fence;

/// Outcome of running one script.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    /// Process exited with status 0 before the timeout.
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ExecutionOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            ..Default::default()
        }
    }

    pub fn crashed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stderr: stderr.into(),
            ..Default::default()
        }
    }

    pub fn timed_out(after: Duration) -> Self {
        Self {
            success: false,
            stderr: format!("Execution timed out after {:?}", after),
            timed_out: true,
            ..Default::default()
        }
    }
}

/// Runs generated solver code.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    async fn execute(&self, code: &str) -> ExecutionOutput;
}

/// Runs Python source with a local interpreter, one temp file per call.
#[derive(Clone, Debug)]
pub struct PythonExecutor {
    interpreter: PathBuf,
    timeout: Duration,
}

impl Default for PythonExecutor {
    fn default() -> Self {
        Self::new("python3", Duration::from_secs(120))
    }
}

impl PythonExecutor {
    pub fn new(interpreter: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            interpreter: interpreter.into(),
            timeout,
        }
    }

    pub fn interpreter(&self) -> &std::path::Path {
        &self.interpreter
    }

    fn write_script(code: &str) -> std::io::Result<tempfile::NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix("optiform-")
            .suffix(".py")
            .tempfile()?;
        file.write_all(code.as_bytes())?;
        file.flush()?;
        Ok(file)
    }
}

#[async_trait]
impl CodeExecutor for PythonExecutor {
    async fn execute(&self, code: &str) -> ExecutionOutput {
        let code = strip_code_fence(code);
        let script = match Self::write_script(code) {
            Ok(f) => f,
            Err(e) => return ExecutionOutput::crashed(format!("failed to write script: {}", e)),
        };

        let child = tokio::process::Command::new(&self.interpreter)
            .arg(script.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(interpreter = %self.interpreter.display(), error = %e, "failed to start interpreter");
                return ExecutionOutput::crashed(format!("failed to run interpreter: {}", e));
            }
        };

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let result = ExecutionOutput {
                    success: output.status.success(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    timed_out: false,
                };
                tracing::debug!(
                    success = result.success,
                    stdout_len = result.stdout.len(),
                    stderr_len = result.stderr.len(),
                    "script finished"
                );
                result
            }
            Ok(Err(e)) => ExecutionOutput::crashed(format!("failed to collect output: {}", e)),
            Err(_) => {
                tracing::debug!(timeout = ?self.timeout, "script timed out");
                ExecutionOutput::timed_out(self.timeout)
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(timeout: Duration) -> PythonExecutor {
        PythonExecutor::new("sh", timeout)
    }

    #[tokio::test]
    async fn runs_script_and_captures_stdout() {
        let out = shell(Duration::from_secs(10))
            .execute("```sh\necho 42\n```")
            .await;
        assert!(out.success, "{:?}", out);
        assert_eq!(out.stdout.trim(), "42");
        assert!(!out.timed_out);
    }

    #[tokio::test]
    async fn nonzero_exit_is_not_success() {
        let out = shell(Duration::from_secs(10))
            .execute("echo boom >&2\nexit 3")
            .await;
        assert!(!out.success);
        assert!(out.stderr.contains("boom"));
    }

    #[tokio::test]
    async fn timeout_is_reported_as_crash() {
        let out = shell(Duration::from_millis(100)).execute("sleep 5").await;
        assert!(!out.success);
        assert!(out.timed_out);
    }

    #[tokio::test]
    async fn missing_interpreter_is_a_crash() {
        let out = PythonExecutor::new("/nonexistent/python", Duration::from_secs(1))
            .execute("print(1)")
            .await;
        assert!(!out.success);
        assert!(out.stderr.contains("failed to run interpreter"));
    }
}
