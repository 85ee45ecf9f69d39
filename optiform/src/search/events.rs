//! Progress events emitted while a search runs.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::backprop::BackpropReport;
use super::expander::ExpansionReport;
use crate::tree::{Layer, NodeId};

/// Why a search ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    AnswerMatched,
    BudgetExhausted,
    Cancelled,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StopReason::AnswerMatched => "answer_matched",
            StopReason::BudgetExhausted => "budget_exhausted",
            StopReason::Cancelled => "cancelled",
        })
    }
}

/// Per-iteration record kept in the outcome.
#[derive(Clone, Debug, Default, Serialize)]
pub struct IterationTrace {
    pub iteration: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_ms: u64,
    /// Root first, ending at the node that was simulated.
    pub path: Vec<NodeId>,
    pub expansion: Option<ExpansionReport>,
    /// Layers filled by the transient rollout.
    pub rollout_layers: usize,
    pub reward: Option<f64>,
    pub answer_matches: bool,
    pub backprop: Option<BackpropReport>,
    /// Trigger flag of each path node after the update, root excluded.
    pub triggers: Vec<bool>,
    /// Set when the iteration did nothing.
    pub skipped: Option<String>,
}

/// Streamed search progress; JSON-tagged by `type`.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchEvent {
    IterationStarted {
        iteration: usize,
    },
    Expanded {
        iteration: usize,
        report: ExpansionReport,
    },
    Simulated {
        iteration: usize,
        executions: usize,
        feasible: bool,
        answer: Option<f64>,
        answer_matches: bool,
    },
    Evaluated {
        iteration: usize,
        mean_score: f64,
        global_uncertainty: f64,
        confidence: f64,
        triggered: Vec<Layer>,
    },
    Iteration(IterationTrace),
    Finished {
        stop_reason: StopReason,
        iterations: usize,
        best_reward: Option<f64>,
    },
}
