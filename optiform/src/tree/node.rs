//! Formulation tree node with visit counts, Q-values and evaluator feedback.

use serde::{Deserialize, Serialize};

use super::Layer;

/// Reference to a node (index into the owning tree's arena).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Get the underlying index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Expansion state of a node.
///
/// `PendingReexpansion` is set from evaluator feedback and makes the Selector stop
/// at the node even when it already has children.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Unexpanded,
    Expanded,
    PendingReexpansion,
}

/// Feedback from one evaluation round for the node's layer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeFeedback {
    pub trigger: bool,
    pub local_uncertainty: f64,
    pub explanation: Option<String>,
}

/// One formulation choice in the tree.
#[derive(Clone, Debug)]
pub struct FormulationNode {
    pub(super) id: NodeId,
    pub(super) depth: usize,
    pub(super) content: String,
    pub(super) parent: Option<NodeId>,
    pub(super) children: Vec<NodeId>,
    pub(super) visits: u32,
    pub(super) value: f64,
    pub(super) trigger: bool,
    pub(super) local_uncertainty: f64,
    pub(super) explanation: Option<String>,
    pub(super) state: NodeState,
}

impl FormulationNode {
    pub(super) fn root() -> Self {
        Self::new(NodeId(0), 0, String::new(), None)
    }

    pub(super) fn new(id: NodeId, depth: usize, content: String, parent: Option<NodeId>) -> Self {
        Self {
            id,
            depth,
            content,
            parent,
            children: Vec::new(),
            visits: 0,
            value: 0.0,
            trigger: false,
            local_uncertainty: 0.0,
            explanation: None,
            state: NodeState::Unexpanded,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Depth in the tree (root = 0, layer nodes 1..=6).
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Formulation layer this node chooses; `None` for the root.
    pub fn layer(&self) -> Option<Layer> {
        Layer::from_depth(self.depth)
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Visit count N.
    pub fn visits(&self) -> u32 {
        self.visits
    }

    /// Confidence-weighted running mean of reward, Q.
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn trigger_flag(&self) -> bool {
        self.trigger
    }

    pub fn local_uncertainty(&self) -> f64 {
        self.local_uncertainty
    }

    /// Explanation from the evaluation that last touched this node.
    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Layer-6 nodes end a complete formulation and never take children.
    pub fn is_complete(&self) -> bool {
        self.depth == Layer::COUNT
    }

    /// Transient: a leaf may still grow children later.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// UCB score given the parent's visit count; unvisited nodes score +inf.
    ///
    /// UCB = Q + c * sqrt(2 * ln(N_parent) / N)
    #[must_use]
    pub fn ucb(&self, parent_visits: u32, exploration: f64) -> f64 {
        if self.visits == 0 {
            return f64::INFINITY;
        }
        let ln_parent = f64::from(parent_visits.max(1)).ln();
        self.value + exploration * (2.0 * ln_parent / f64::from(self.visits)).sqrt()
    }

    /// N ← N + 1; Q ← Q + ρ (R − Q) / N.
    pub(super) fn record_visit(&mut self, reward: f64, confidence: f64) {
        self.visits += 1;
        self.value += confidence * (reward - self.value) / f64::from(self.visits);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unvisited_node_has_infinite_ucb() {
        let node = FormulationNode::new(NodeId(1), 1, "LP".into(), Some(NodeId(0)));
        assert!(node.ucb(10, 2.0).is_infinite());
    }

    #[test]
    fn ucb_matches_formula() {
        let mut node = FormulationNode::new(NodeId(1), 1, "LP".into(), Some(NodeId(0)));
        node.record_visit(0.5, 1.0);
        node.record_visit(0.5, 1.0);
        let expected = 0.5 + 2.0 * (2.0 * 4f64.ln() / 2.0).sqrt();
        assert!((node.ucb(4, 2.0) - expected).abs() < 1e-12);
    }

    #[test]
    fn record_visit_with_full_confidence_is_running_mean() {
        let mut node = FormulationNode::root();
        node.record_visit(1.0, 1.0);
        node.record_visit(0.0, 1.0);
        node.record_visit(0.5, 1.0);
        assert_eq!(node.visits(), 3);
        assert!((node.value() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn zero_confidence_counts_visit_but_keeps_value() {
        let mut node = FormulationNode::root();
        node.record_visit(0.8, 1.0);
        node.record_visit(-0.1, 0.0);
        assert_eq!(node.visits(), 2);
        assert!((node.value() - 0.8).abs() < 1e-12);
    }
}
