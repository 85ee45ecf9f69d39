//! Repeated model judgments folded into a score, uncertainties and per-layer
//! feedback.

use std::collections::HashMap;

use futures::future::join_all;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::simulator::SimulationResult;
use crate::llm::{CompletionOptions, LlmGateway};
use crate::prompts::judge_messages;
use crate::tree::Layer;

/// One judge reply.
#[derive(Clone, Debug, Deserialize)]
pub struct Judgment {
    /// Overall quality, 0..=100.
    pub score: f64,
    #[serde(default)]
    pub layers: HashMap<String, LayerJudgment>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct LayerJudgment {
    /// Element quality, 0..=100; the overall score stands in when missing.
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub trigger: bool,
    #[serde(default, deserialize_with = "lenient_text")]
    pub explanation: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub guidance: String,
}

/// `null` reads as empty; other non-string values are stringified.
fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// Accepts booleans, `"true"`/`"yes"` strings and non-zero numbers.
fn lenient_flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Bool(b) => b,
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        Value::Number(n) => n.as_f64().is_some_and(|x| x != 0.0),
        _ => false,
    })
}

fn validate_judgment(j: &Judgment) -> Result<(), String> {
    let in_range = |s: f64| s.is_finite() && (0.0..=100.0).contains(&s);
    if !in_range(j.score) {
        return Err(format!("score {} outside 0..=100", j.score));
    }
    for (key, layer) in &j.layers {
        if let Some(s) = layer.score {
            if !in_range(s) {
                return Err(format!("{} score {} outside 0..=100", key, s));
            }
        }
    }
    Ok(())
}

/// Aggregated feedback for one layer.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LayerSignal {
    pub trigger: bool,
    /// Population std-dev of this layer's normalized scores.
    pub local_uncertainty: f64,
    /// From the first judgment that triggered the layer.
    pub explanation: Option<String>,
    pub guidance: Option<String>,
}

/// Result of one evaluation round.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Evaluation {
    /// Mean normalized overall score of the valid judgments.
    pub mean_score: f64,
    pub global_uncertainty: f64,
    /// ρ = exp(−U), or 0 when too few judgments were valid.
    pub confidence: f64,
    pub valid: usize,
    pub failed: usize,
    /// Indexed by [`Layer::index`].
    pub layers: Vec<LayerSignal>,
}

impl Evaluation {
    pub fn layer(&self, layer: Layer) -> &LayerSignal {
        &self.layers[layer.index()]
    }

    pub fn triggered(&self) -> Vec<Layer> {
        Layer::ALL
            .into_iter()
            .filter(|l| self.layer(*l).trigger)
            .collect()
    }

    /// Folds valid judgments; `failed` counts the ones dropped.
    pub fn aggregate(judgments: &[Judgment], failed: usize, min_valid: usize) -> Self {
        // Moments on the raw 0..=100 scale, normalized afterwards.
        let overall: Vec<f64> = judgments.iter().map(|j| j.score).collect();
        let mean_score = mean(&overall) / 100.0;
        let global_uncertainty = population_std(&overall) / 100.0;
        let confidence = if judgments.len() >= min_valid {
            (-global_uncertainty).exp()
        } else {
            0.0
        };

        let layers = Layer::ALL
            .iter()
            .map(|layer| {
                let mut scores = Vec::with_capacity(judgments.len());
                let mut signal = LayerSignal::default();
                for j in judgments {
                    let lj = j
                        .layers
                        .iter()
                        .find(|(k, _)| k.trim().eq_ignore_ascii_case(layer.key()))
                        .map(|(_, v)| v);
                    scores.push(lj.and_then(|l| l.score).unwrap_or(j.score));
                    if let Some(lj) = lj.filter(|l| l.trigger) {
                        if !signal.trigger {
                            signal.trigger = true;
                            signal.explanation = non_blank(&lj.explanation);
                            signal.guidance = non_blank(&lj.guidance);
                        }
                    }
                }
                signal.local_uncertainty = population_std(&scores) / 100.0;
                signal
            })
            .collect();

        Self {
            mean_score,
            global_uncertainty,
            confidence,
            valid: judgments.len(),
            failed,
            layers,
        }
    }
}

fn non_blank(s: &str) -> Option<String> {
    let t = s.trim();
    (!t.is_empty()).then(|| t.to_string())
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

/// Population standard deviation; 0 for fewer than two values or when all
/// values are equal.
pub fn population_std(xs: &[f64]) -> f64 {
    if xs.len() < 2 || xs.iter().all(|x| *x == xs[0]) {
        return 0.0;
    }
    let m = mean(xs);
    (xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64).sqrt()
}

pub struct Evaluator {
    llm: LlmGateway,
    judgments: usize,
    min_valid: usize,
    temperature: f32,
}

impl Evaluator {
    pub fn new(llm: LlmGateway) -> Self {
        Self {
            llm,
            judgments: 3,
            min_valid: 2,
            temperature: 0.5,
        }
    }

    pub fn with_judgments(mut self, judgments: usize, min_valid: usize) -> Self {
        self.judgments = judgments;
        self.min_valid = min_valid;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Asks for K independent judgments of the simulated solution concurrently.
    pub async fn evaluate(
        &self,
        problem: &str,
        simulation: &SimulationResult,
        cancel: &CancellationToken,
    ) -> Evaluation {
        let messages = judge_messages(problem, &simulation.formulation, &simulation.output);
        let options = CompletionOptions::json(self.temperature);
        let replies = join_all((0..self.judgments).map(|_| {
            self.llm
                .complete_json("judge", &messages, options, cancel, validate_judgment)
        }))
        .await;

        let mut valid = Vec::with_capacity(replies.len());
        let mut failed = 0;
        for reply in replies {
            match reply {
                Ok(j) => valid.push(j),
                Err(e) => {
                    warn!(error = %e, "judgment dropped");
                    failed += 1;
                }
            }
        }
        let evaluation = Evaluation::aggregate(&valid, failed, self.min_valid);
        debug!(
            valid = evaluation.valid,
            failed,
            mean_score = evaluation.mean_score,
            global_uncertainty = evaluation.global_uncertainty,
            confidence = evaluation.confidence,
            triggered = ?evaluation.triggered(),
            "evaluated"
        );
        evaluation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::llm::MockLlm;
    use crate::retry::RetryPolicy;
    use crate::sandbox::ExecutionOutput;
    use crate::tree::Formulation;

    fn judgment(score: f64, constraints: Option<(f64, bool, &str)>) -> Judgment {
        let mut layers = HashMap::new();
        if let Some((s, trigger, guidance)) = constraints {
            layers.insert(
                "constraints".to_string(),
                LayerJudgment {
                    score: Some(s),
                    trigger,
                    explanation: format!("explain {}", guidance),
                    guidance: guidance.to_string(),
                },
            );
        }
        Judgment { score, layers }
    }

    fn sample_simulation() -> SimulationResult {
        let mut sim = SimulationResult {
            formulation: Formulation::new(),
            code: String::new(),
            output: ExecutionOutput::ok("1"),
            feasible: true,
            error: false,
            score: 0.0,
            answer: Some(1.0),
            answer_matches: false,
            executions: 1,
            reward: 0.1,
        };
        sim.apply_score(0.0);
        sim
    }

    #[test]
    fn identical_scores_give_full_confidence() {
        let js = vec![judgment(80.0, None), judgment(80.0, None), judgment(80.0, None)];
        let e = Evaluation::aggregate(&js, 0, 2);
        assert!((e.mean_score - 0.8).abs() < 1e-12);
        assert_eq!(e.global_uncertainty, 0.0);
        assert_eq!(e.confidence, 1.0);
        assert!(e.triggered().is_empty());
    }

    #[test]
    fn equal_fractional_scores_have_zero_spread() {
        let js = vec![judgment(70.3, None), judgment(70.3, None), judgment(70.3, None)];
        let e = Evaluation::aggregate(&js, 0, 3);
        assert_eq!(e.global_uncertainty, 0.0);
        assert_eq!(e.confidence, 1.0);
        assert_eq!(population_std(&[0.1, 0.1, 0.1, 0.1]), 0.0);
    }

    #[test]
    fn null_text_fields_and_string_triggers_are_accepted() {
        let j: Judgment = serde_json::from_str(
            r#"{"score": 70, "layers": {
                "type": {"score": 60, "trigger": false, "explanation": "fine", "guidance": null},
                "sets": {"score": null, "trigger": "true", "explanation": null, "guidance": "index periods by t"},
                "objective": {"trigger": null, "explanation": 3}
            }}"#,
        )
        .unwrap();
        assert_eq!(j.layers["type"].guidance, "");
        assert!(!j.layers["type"].trigger);
        assert!(j.layers["sets"].trigger);
        assert_eq!(j.layers["sets"].score, None);
        assert_eq!(j.layers["sets"].explanation, "");
        assert!(!j.layers["objective"].trigger);
        assert_eq!(j.layers["objective"].explanation, "3");

        let e = Evaluation::aggregate(&[j], 0, 1);
        let sets = e.layer(Layer::Sets);
        assert!(sets.trigger);
        assert_eq!(sets.explanation, None);
        assert_eq!(sets.guidance.as_deref(), Some("index periods by t"));
    }

    #[tokio::test]
    async fn judgments_with_null_guidance_count_as_valid() {
        let reply = r#"{"score": 70, "layers": {"type": {"score": 60, "trigger": false, "explanation": "fine", "guidance": null}}}"#;
        let llm = MockLlm::scripted([reply, reply, reply]);
        let gateway = LlmGateway::new(Arc::new(llm), RetryPolicy::none(), Duration::from_secs(5));
        let e = Evaluator::new(gateway)
            .evaluate("p", &sample_simulation(), &CancellationToken::new())
            .await;
        assert_eq!(e.valid, 3);
        assert_eq!(e.failed, 0);
        assert_eq!(e.confidence, 1.0);
        assert!((e.mean_score - 0.7).abs() < 1e-12);
    }

    #[test]
    fn spread_scores_lower_confidence() {
        let js = vec![judgment(20.0, None), judgment(50.0, None), judgment(80.0, None)];
        let e = Evaluation::aggregate(&js, 0, 2);
        let expected_std = 0.06f64.sqrt();
        assert!((e.global_uncertainty - expected_std).abs() < 1e-12);
        assert!((e.confidence - (-expected_std).exp()).abs() < 1e-12);
    }

    #[test]
    fn first_triggering_judgment_supplies_guidance() {
        let js = vec![
            judgment(60.0, Some((90.0, false, "none"))),
            judgment(60.0, Some((10.0, true, "add capacity limits"))),
            judgment(60.0, Some((50.0, true, "second opinion"))),
        ];
        let e = Evaluation::aggregate(&js, 0, 2);
        let c = e.layer(Layer::Constraints);
        assert!(c.trigger);
        assert_eq!(c.guidance.as_deref(), Some("add capacity limits"));
        assert_eq!(c.explanation.as_deref(), Some("explain add capacity limits"));
        assert!(c.local_uncertainty > 0.3);
        assert_eq!(e.triggered(), vec![Layer::Constraints]);
        assert_eq!(e.layer(Layer::Type).local_uncertainty, 0.0);
    }

    #[test]
    fn too_few_valid_judgments_zero_confidence() {
        let e = Evaluation::aggregate(&[judgment(90.0, None)], 2, 2);
        assert_eq!(e.confidence, 0.0);
        assert_eq!(e.valid, 1);
        assert_eq!(e.failed, 2);
    }

    #[tokio::test]
    async fn malformed_judgments_are_dropped() {
        let llm = MockLlm::scripted([
            r#"{"score": 70, "layers": {"type": {"score": 60, "trigger": false}}}"#,
            "I think it is fine",
            r#"{"score": 250}"#,
        ]);
        let gateway = LlmGateway::new(Arc::new(llm), RetryPolicy::none(), Duration::from_secs(5));
        let evaluator = Evaluator::new(gateway);
        let e = evaluator
            .evaluate("p", &sample_simulation(), &CancellationToken::new())
            .await;
        assert_eq!(e.valid, 1);
        assert_eq!(e.failed, 2);
        assert_eq!(e.confidence, 0.0);
        assert!((e.mean_score - 0.7).abs() < 1e-12);
    }
}
