//! Confidence-weighted value update along a path, plus feedback and guidance.

use serde::Serialize;
use tracing::debug;

use super::evaluator::Evaluation;
use crate::error::TreeError;
use crate::knowledge::KnowledgeBase;
use crate::tree::{FormulationTree, Layer, NodeFeedback, NodeId, NodeState};

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BackpropReport {
    pub confidence: f64,
    /// Layers that received a knowledge-base entry.
    pub guidance_added: Vec<Layer>,
    /// Path nodes now pending re-expansion.
    pub flagged: Vec<NodeId>,
}

#[derive(Clone, Copy, Debug)]
pub struct Backpropagator {
    threshold: f64,
}

impl Backpropagator {
    /// `threshold` is η, the local uncertainty above which a triggered node is
    /// re-opened.
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Updates every node on `path` (root first) with `N += 1` and
    /// `Q += ρ (R − Q) / N`. With an evaluation, ρ is its confidence, each layer
    /// node's feedback is replaced, and triggered guidance is appended once per
    /// layer. Without one (answer matched) ρ = 1 and feedback is left alone; an
    /// evaluation with no valid judgment leaves feedback and guidance alone too.
    pub fn backpropagate(
        &self,
        tree: &mut FormulationTree,
        kb: &mut KnowledgeBase,
        path: &[NodeId],
        reward: f64,
        evaluation: Option<&Evaluation>,
    ) -> Result<BackpropReport, TreeError> {
        let confidence = evaluation.map_or(1.0, |e| e.confidence);
        let mut report = BackpropReport {
            confidence,
            ..Default::default()
        };
        for &id in path {
            tree.record_visit(id, reward, confidence)?;
        }

        let Some(evaluation) = evaluation.filter(|e| e.valid > 0) else {
            debug!(reward, confidence, path_len = path.len(), "backpropagated");
            return Ok(report);
        };

        for &id in path {
            let Some(layer) = tree.node(id).layer() else {
                continue;
            };
            let signal = evaluation.layer(layer);
            let feedback = NodeFeedback {
                trigger: signal.trigger,
                local_uncertainty: signal.local_uncertainty,
                explanation: signal.explanation.clone(),
            };
            tree.apply_feedback(id, &feedback, self.threshold)?;
            if tree.node(id).state() == NodeState::PendingReexpansion {
                report.flagged.push(id);
            }
        }

        for layer in Layer::ALL {
            let signal = evaluation.layer(layer);
            if !signal.trigger {
                continue;
            }
            if let Some(guidance) = &signal.guidance {
                if kb.append(layer, guidance.as_str()) {
                    report.guidance_added.push(layer);
                }
            }
        }
        debug!(
            reward,
            confidence,
            path_len = path.len(),
            flagged = report.flagged.len(),
            guidance_added = report.guidance_added.len(),
            "backpropagated"
        );
        Ok(report)
    }
}
