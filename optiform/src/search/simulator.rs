//! Code generation, execution with a fix loop, and the reward.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::llm::{strip_code_fence, CompletionOptions, LlmGateway};
use crate::oracle::{extract_answer, AnswerOracle};
use crate::prompts::{code_messages, fix_messages};
use crate::retry::RetryPolicy;
use crate::sandbox::{CodeExecutor, ExecutionOutput};
use crate::tree::Formulation;

/// R = 0.1·feasible + 0.8·score − 0.1·error, or 1.0 when the answer matches.
pub fn reward(feasible: bool, score: f64, error: bool, answer_matches: bool) -> f64 {
    if answer_matches {
        return 1.0;
    }
    let feasible = if feasible { 1.0 } else { 0.0 };
    let error = if error { 1.0 } else { 0.0 };
    0.1 * feasible + 0.8 * score.clamp(0.0, 1.0) - 0.1 * error
}

/// One simulation of a complete formulation.
#[derive(Clone, Debug, Serialize)]
pub struct SimulationResult {
    pub formulation: Formulation,
    /// Last code that was run; empty when no code could be generated.
    pub code: String,
    pub output: ExecutionOutput,
    /// Ran to completion without crashing.
    pub feasible: bool,
    /// Crashed, timed out, or no code could be produced.
    pub error: bool,
    /// Normalized judge score in [0, 1]; 0 until an evaluation is applied.
    pub score: f64,
    pub answer: Option<f64>,
    pub answer_matches: bool,
    /// Executions performed (first run plus fixes).
    pub executions: usize,
    pub reward: f64,
}

impl SimulationResult {
    fn new(formulation: Formulation, code: String, output: ExecutionOutput, executions: usize) -> Self {
        let feasible = output.success;
        let error = !output.success;
        Self {
            formulation,
            code,
            output,
            feasible,
            error,
            score: 0.0,
            answer: None,
            answer_matches: false,
            executions,
            reward: reward(feasible, 0.0, error, false),
        }
    }

    /// Sets the judge score and recomputes the reward.
    pub fn apply_score(&mut self, score: f64) {
        self.score = score.clamp(0.0, 1.0);
        self.reward = reward(self.feasible, self.score, self.error, self.answer_matches);
    }
}

/// Successful run that printed a number.
fn is_valid(output: &ExecutionOutput) -> bool {
    output.success && extract_answer(&output.stdout).is_some()
}

fn failure_text(output: &ExecutionOutput) -> String {
    if output.timed_out {
        "Execution timed out".to_string()
    } else if output.success {
        format!("The program printed no numeric answer. Output:\n{}", output.stdout.trim())
    } else {
        output.stderr.clone()
    }
}

pub struct Simulator {
    llm: LlmGateway,
    executor: Arc<dyn CodeExecutor>,
    oracle: Arc<dyn AnswerOracle>,
    fix_retry: RetryPolicy,
    temperature: f32,
}

impl Simulator {
    pub fn new(
        llm: LlmGateway,
        executor: Arc<dyn CodeExecutor>,
        oracle: Arc<dyn AnswerOracle>,
        fix_retry: RetryPolicy,
    ) -> Self {
        Self {
            llm,
            executor,
            oracle,
            fix_retry,
            temperature: 0.0,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    async fn execute(&self, code: &str, cancel: &CancellationToken) -> ExecutionOutput {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => ExecutionOutput::crashed("cancelled"),
            out = self.executor.execute(code) => out,
        }
    }

    /// Generates solver code for `formulation`, runs it, and asks for fixes while
    /// the run fails, up to the fix policy. The reward carries no judge score yet.
    pub async fn simulate(
        &self,
        problem: &str,
        formulation: Formulation,
        ground_truth: Option<f64>,
        cancel: &CancellationToken,
    ) -> SimulationResult {
        let options = CompletionOptions::text(self.temperature);
        let mut code = match self
            .llm
            .complete_text("code", &code_messages(problem, &formulation), options, cancel)
            .await
        {
            Ok(text) => strip_code_fence(&text).to_string(),
            Err(e) => {
                warn!(error = %e, "code generation failed");
                let output = ExecutionOutput::crashed(format!("code generation failed: {}", e));
                return SimulationResult::new(formulation, String::new(), output, 0);
            }
        };

        let mut output = self.execute(&code, cancel).await;
        let mut executions = 1;
        let mut fix = 0;
        while !is_valid(&output) && self.fix_retry.should_retry(fix) && !cancel.is_cancelled() {
            let delay = self.fix_retry.delay(fix);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            fix += 1;
            debug!(fix, timed_out = output.timed_out, "asking for a code fix");
            let messages = fix_messages(&code, &failure_text(&output));
            match self.llm.complete_text("fix", &messages, options, cancel).await {
                Ok(text) => code = strip_code_fence(&text).to_string(),
                Err(e) => {
                    warn!(error = %e, "code fix request failed");
                    break;
                }
            }
            output = self.execute(&code, cancel).await;
            executions += 1;
        }

        let answer = if output.success {
            extract_answer(&output.stdout)
        } else {
            None
        };
        let mut result = SimulationResult::new(formulation, code, output, executions);
        result.answer = answer;
        result.answer_matches = match (answer, ground_truth) {
            (Some(a), Some(truth)) => self.oracle.compare(a, truth),
            _ => false,
        };
        result.reward = reward(result.feasible, 0.0, result.error, result.answer_matches);
        debug!(
            executions,
            feasible = result.feasible,
            answer = ?result.answer,
            answer_matches = result.answer_matches,
            "simulated"
        );
        result
    }
}
