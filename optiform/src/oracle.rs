//! Numeric answer extraction and ground-truth comparison.

use std::sync::OnceLock;

use regex::Regex;

fn number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?").expect("number pattern is valid")
    })
}

/// The last number printed in `stdout`, which solver scripts are asked to emit
/// as their optimal objective value.
pub fn extract_answer(stdout: &str) -> Option<f64> {
    number_regex()
        .find_iter(stdout)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .last()
}

/// Decides whether an extracted answer matches the known ground truth.
pub trait AnswerOracle: Send + Sync {
    fn compare(&self, extracted: f64, ground_truth: f64) -> bool;
}

/// Relative error below `tolerance`; absolute error below 1e-4 when the truth is
/// (near) zero.
#[derive(Clone, Copy, Debug)]
pub struct RelativeToleranceOracle {
    tolerance: f64,
}

impl Default for RelativeToleranceOracle {
    fn default() -> Self {
        Self { tolerance: 0.1 }
    }
}

impl RelativeToleranceOracle {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }
}

impl AnswerOracle for RelativeToleranceOracle {
    fn compare(&self, extracted: f64, ground_truth: f64) -> bool {
        if !extracted.is_finite() {
            return false;
        }
        if ground_truth.abs() > 1e-8 {
            (extracted - ground_truth).abs() / ground_truth.abs() < self.tolerance
        } else {
            (extracted - ground_truth).abs() < 1e-4
        }
    }
}
