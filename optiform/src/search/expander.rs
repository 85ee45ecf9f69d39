//! Candidate generation, near-duplicate pruning and attachment.
//!
//! Candidates for one expansion are requested concurrently; the tree is only
//! touched after every request has finished. The greedy rollout asks for
//! fragments the same way but never attaches them.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::selector::{ExpansionPoint, ExpansionReason};
use crate::error::LlmError;
use crate::knowledge::KnowledgeBase;
use crate::llm::{strip_code_fence, CompletionOptions, LlmGateway};
use crate::prompts::{element_messages, ElementRequest};
use crate::similarity::SimilarityMeasure;
use crate::tree::{Formulation, FormulationTree, Layer, NodeId};

/// What one expansion call did.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ExpansionReport {
    pub node: Option<NodeId>,
    pub layer: Option<Layer>,
    pub added: Vec<NodeId>,
    /// Candidates discarded as too similar to a sibling or an accepted candidate.
    pub pruned: usize,
    /// Requests that failed after retries.
    pub failed: usize,
    pub reexpansion: bool,
}

pub struct Expander {
    llm: LlmGateway,
    similarity: Arc<dyn SimilarityMeasure>,
    candidates: usize,
    max_children: usize,
    threshold: f64,
    guidance_window: usize,
    temperature: f32,
}

impl Expander {
    pub fn new(llm: LlmGateway, similarity: Arc<dyn SimilarityMeasure>) -> Self {
        Self {
            llm,
            similarity,
            candidates: 3,
            max_children: 5,
            threshold: 0.8,
            guidance_window: 3,
            temperature: 0.7,
        }
    }

    pub fn with_limits(mut self, candidates: usize, max_children: usize) -> Self {
        self.candidates = candidates;
        self.max_children = max_children;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_guidance_window(mut self, window: usize) -> Self {
        self.guidance_window = window;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Generates candidates for the layer below `point.node` and attaches the
    /// survivors in order. A re-expansion attempt consumes the node's pending
    /// flag whether or not anything was added.
    pub async fn expand(
        &self,
        tree: &mut FormulationTree,
        kb: &KnowledgeBase,
        problem: &str,
        point: &ExpansionPoint,
        cancel: &CancellationToken,
    ) -> ExpansionReport {
        let reexpansion = matches!(point.reason, ExpansionReason::Reexpansion { .. });
        let mut report = ExpansionReport {
            node: Some(point.node),
            reexpansion,
            ..Default::default()
        };
        let parent = tree.node(point.node);
        let Some(layer) = Layer::from_depth(parent.depth() + 1) else {
            return report;
        };
        report.layer = Some(layer);

        let capacity = self.max_children.saturating_sub(parent.children().len());
        let wanted = self.candidates.min(capacity);
        if wanted > 0 {
            let explanation = match &point.reason {
                ExpansionReason::Reexpansion { explanation } => explanation.as_deref(),
                ExpansionReason::Unexpanded => None,
            };
            let partial = tree.formulation(point.node);
            let siblings = tree.child_contents(point.node);
            let request = ElementRequest {
                problem,
                partial: &partial,
                layer,
                guidance: kb.recent(layer, self.guidance_window),
                explanation,
                siblings: &siblings,
            };
            let messages = element_messages(&request);
            let options = CompletionOptions::text(self.temperature);
            let label = format!("expand:{}", layer);

            let replies = join_all(
                (0..wanted).map(|_| self.llm.complete_text(&label, &messages, options, cancel)),
            )
            .await;

            let mut candidates = Vec::with_capacity(replies.len());
            for reply in replies {
                match reply {
                    Ok(text) => candidates.push(strip_code_fence(&text).to_string()),
                    Err(LlmError::Cancelled) => report.failed += 1,
                    Err(e) => {
                        warn!(layer = %layer, error = %e, "candidate request failed");
                        report.failed += 1;
                    }
                }
            }

            let accepted = self.prune(&siblings, candidates, capacity, &mut report).await;
            for content in accepted {
                match tree.add_child(point.node, content) {
                    Ok(id) => report.added.push(id),
                    Err(e) => warn!(node = %point.node, error = %e, "failed to attach candidate"),
                }
            }
        }

        if reexpansion {
            if let Err(e) = tree.consume_reexpansion(point.node) {
                warn!(node = %point.node, error = %e, "failed to clear re-expansion flag");
            }
        }
        debug!(
            node = %point.node,
            layer = %layer,
            added = report.added.len(),
            pruned = report.pruned,
            failed = report.failed,
            reexpansion,
            "expanded"
        );
        report
    }

    /// Keeps candidates whose highest similarity to the siblings and to the
    /// candidates accepted so far does not exceed the threshold.
    async fn prune(
        &self,
        siblings: &[&str],
        candidates: Vec<String>,
        capacity: usize,
        report: &mut ExpansionReport,
    ) -> Vec<String> {
        let mut accepted: Vec<String> = Vec::new();
        for candidate in candidates {
            if accepted.len() >= capacity {
                break;
            }
            if candidate.trim().is_empty() {
                report.failed += 1;
                continue;
            }
            let mut others: Vec<&str> = siblings.to_vec();
            others.extend(accepted.iter().map(String::as_str));
            let similarity = match self.similarity.max_similarity(&candidate, &others).await {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "similarity failed; keeping candidate");
                    0.0
                }
            };
            if similarity > self.threshold {
                debug!(similarity, "pruned near-duplicate candidate");
                report.pruned += 1;
            } else {
                accepted.push(candidate);
            }
        }
        accepted
    }

    /// Fills the layers below `leaf` one model call at a time, each conditioned
    /// on the fragments before it. Nothing is attached to the tree.
    pub async fn rollout(
        &self,
        tree: &FormulationTree,
        kb: &KnowledgeBase,
        problem: &str,
        leaf: NodeId,
        cancel: &CancellationToken,
    ) -> Result<Formulation, LlmError> {
        let mut formulation = tree.formulation(leaf);
        while let Some(layer) = formulation.next_layer() {
            let request = ElementRequest {
                problem,
                partial: &formulation,
                layer,
                guidance: kb.recent(layer, self.guidance_window),
                explanation: None,
                siblings: &[],
            };
            let messages = element_messages(&request);
            let label = format!("rollout:{}", layer);
            let text = self
                .llm
                .complete_text(&label, &messages, CompletionOptions::text(self.temperature), cancel)
                .await?;
            formulation.push(strip_code_fence(&text).to_string());
        }
        Ok(formulation)
    }
}
