//! Tunables for one search.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::retry::RetryPolicy;

/// Every field has a default, so a partial `[search]` table deserializes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Iteration budget per problem.
    pub max_iterations: usize,
    /// UCB exploration constant `c`.
    pub exploration_constant: f64,
    /// η: local uncertainty above which a triggered node is re-expanded.
    pub reexpansion_threshold: f64,
    pub candidates_per_expansion: usize,
    pub max_children: usize,
    /// Candidates more similar than this to a sibling are pruned.
    pub similarity_threshold: f64,
    /// K: independent judgments per evaluation round.
    pub judgments: usize,
    /// Below this many valid judgments the round has confidence 0.
    pub min_valid_judgments: usize,
    /// How many recent knowledge-base entries are shown to the Expander.
    pub guidance_window: usize,
    pub answer_tolerance: f64,
    pub expand_temperature: f32,
    pub judge_temperature: f32,
    pub code_temperature: f32,
    pub llm_timeout_secs: u64,
    pub llm_retry: RetryPolicy,
    /// Fix-and-rerun attempts after the first execution.
    pub execution_retry: RetryPolicy,
    pub execution_timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            exploration_constant: 2.0,
            reexpansion_threshold: 0.3,
            candidates_per_expansion: 3,
            max_children: 5,
            similarity_threshold: 0.8,
            judgments: 3,
            min_valid_judgments: 2,
            guidance_window: 3,
            answer_tolerance: 0.1,
            expand_temperature: 0.7,
            judge_temperature: 0.5,
            code_temperature: 0.0,
            llm_timeout_secs: 120,
            llm_retry: RetryPolicy::exponential(
                3,
                Duration::from_millis(500),
                Duration::from_secs(8),
                2.0,
            ),
            execution_retry: RetryPolicy::fixed(12, Duration::ZERO),
            execution_timeout_secs: 120,
        }
    }
}

impl SearchConfig {
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }

    /// Rejects values the search cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::invalid("max_iterations", "must be at least 1"));
        }
        if !(self.exploration_constant.is_finite() && self.exploration_constant >= 0.0) {
            return Err(ConfigError::invalid("exploration_constant", "must be finite and >= 0"));
        }
        if !(self.reexpansion_threshold.is_finite() && self.reexpansion_threshold >= 0.0) {
            return Err(ConfigError::invalid("reexpansion_threshold", "must be finite and >= 0"));
        }
        if self.candidates_per_expansion == 0 {
            return Err(ConfigError::invalid("candidates_per_expansion", "must be at least 1"));
        }
        if self.max_children == 0 {
            return Err(ConfigError::invalid("max_children", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::invalid("similarity_threshold", "must be in [0, 1]"));
        }
        if self.judgments == 0 {
            return Err(ConfigError::invalid("judgments", "must be at least 1"));
        }
        if self.min_valid_judgments == 0 || self.min_valid_judgments > self.judgments {
            return Err(ConfigError::invalid(
                "min_valid_judgments",
                format!("must be in 1..={}", self.judgments),
            ));
        }
        if !(self.answer_tolerance.is_finite() && self.answer_tolerance > 0.0) {
            return Err(ConfigError::invalid("answer_tolerance", "must be > 0"));
        }
        for (field, t) in [
            ("expand_temperature", self.expand_temperature),
            ("judge_temperature", self.judge_temperature),
            ("code_temperature", self.code_temperature),
        ] {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::invalid(field, "must be in [0, 2]"));
            }
        }
        if self.llm_timeout_secs == 0 {
            return Err(ConfigError::invalid("llm_timeout_secs", "must be at least 1"));
        }
        if self.execution_timeout_secs == 0 {
            return Err(ConfigError::invalid("execution_timeout_secs", "must be at least 1"));
        }
        Ok(())
    }
}
