//! Formulation tree: a root plus six ordered layers of alternative fragments.
//!
//! Nodes are stored in an arena and addressed by [`NodeId`]; they are never
//! removed and their statistics are never reset during a search. A node's depth
//! is always its parent's depth + 1, and all children of a node are alternatives
//! for the same next layer.

mod formulation;
mod layer;
mod node;

pub use formulation::Formulation;
pub use layer::Layer;
pub use node::{FormulationNode, NodeFeedback, NodeId, NodeState};

use crate::error::TreeError;

/// Arena-backed formulation tree for one problem's search.
#[derive(Clone, Debug)]
pub struct FormulationTree {
    nodes: Vec<FormulationNode>,
}

impl Default for FormulationTree {
    fn default() -> Self {
        Self::new()
    }
}

impl FormulationTree {
    /// Tree with only the root.
    pub fn new() -> Self {
        Self {
            nodes: vec![FormulationNode::root()],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Node by id. Ids are only issued by this tree, so lookup is infallible for
    /// ids obtained from it.
    pub fn node(&self, id: NodeId) -> &FormulationNode {
        &self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&FormulationNode> {
        self.nodes.get(id.0)
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut FormulationNode, TreeError> {
        self.nodes.get_mut(id.0).ok_or(TreeError::UnknownNode(id.0))
    }

    /// Number of nodes including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FormulationNode> {
        self.nodes.iter()
    }

    /// Deepest depth any node has reached.
    pub fn max_depth(&self) -> usize {
        self.nodes.iter().map(FormulationNode::depth).max().unwrap_or(0)
    }

    /// Attaches a new alternative for the layer below `parent`.
    pub fn add_child(&mut self, parent: NodeId, content: impl Into<String>) -> Result<NodeId, TreeError> {
        let id = NodeId(self.nodes.len());
        let parent_node = self.node_mut(parent)?;
        if parent_node.is_complete() {
            return Err(TreeError::LastLayer(parent.0));
        }
        let depth = parent_node.depth + 1;
        parent_node.children.push(id);
        if parent_node.state == NodeState::Unexpanded {
            parent_node.state = NodeState::Expanded;
        }
        self.nodes
            .push(FormulationNode::new(id, depth, content.into(), Some(parent)));
        Ok(id)
    }

    /// Ids from the root down to `id`, inclusive.
    pub fn path_from_root(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = Vec::with_capacity(self.node(id).depth + 1);
        let mut current = Some(id);
        while let Some(n) = current {
            path.push(n);
            current = self.node(n).parent;
        }
        path.reverse();
        path
    }

    /// Fragments chosen along the path from the root to `id`.
    pub fn formulation(&self, id: NodeId) -> Formulation {
        let mut formulation = Formulation::new();
        for n in self.path_from_root(id) {
            let node = self.node(n);
            if !node.is_root() {
                formulation.push(node.content.clone());
            }
        }
        formulation
    }

    /// Contents of the existing children of `id`, in order.
    pub fn child_contents(&self, id: NodeId) -> Vec<&str> {
        self.node(id)
            .children
            .iter()
            .map(|c| self.node(*c).content())
            .collect()
    }

    /// Confidence-weighted visit update for one node.
    pub fn record_visit(&mut self, id: NodeId, reward: f64, confidence: f64) -> Result<(), TreeError> {
        self.node_mut(id)?.record_visit(reward, confidence);
        Ok(())
    }

    /// Replaces the node's evaluator feedback. A triggered node whose local
    /// uncertainty exceeds `threshold` becomes pending re-expansion; layer-6 nodes
    /// keep their flags but cannot be re-expanded.
    pub fn apply_feedback(
        &mut self,
        id: NodeId,
        feedback: &NodeFeedback,
        threshold: f64,
    ) -> Result<(), TreeError> {
        let node = self.node_mut(id)?;
        node.trigger = feedback.trigger;
        node.local_uncertainty = feedback.local_uncertainty.max(0.0);
        node.explanation = feedback.explanation.clone();
        let pending = feedback.trigger && node.local_uncertainty > threshold && !node.is_complete();
        node.state = if pending {
            NodeState::PendingReexpansion
        } else if node.children.is_empty() {
            NodeState::Unexpanded
        } else {
            NodeState::Expanded
        };
        Ok(())
    }

    /// Clears a pending re-expansion after the Expander has handled it, so an
    /// all-pruned attempt does not pin selection to the same node.
    pub fn consume_reexpansion(&mut self, id: NodeId) -> Result<(), TreeError> {
        let node = self.node_mut(id)?;
        if node.state == NodeState::PendingReexpansion {
            node.trigger = false;
            node.state = if node.children.is_empty() {
                NodeState::Unexpanded
            } else {
                NodeState::Expanded
            };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(tree: &mut FormulationTree, depth: usize) -> NodeId {
        let mut id = tree.root();
        for i in 0..depth {
            id = tree.add_child(id, format!("layer {}", i + 1)).unwrap();
        }
        id
    }

    #[test]
    fn new_tree_has_root_only() {
        let tree = FormulationTree::new();
        assert_eq!(tree.len(), 1);
        let root = tree.node(tree.root());
        assert!(root.is_root());
        assert_eq!(root.layer(), None);
        assert_eq!(root.state(), NodeState::Unexpanded);
    }

    #[test]
    fn child_depth_is_parent_depth_plus_one() {
        let mut tree = FormulationTree::new();
        let leaf = chain(&mut tree, 3);
        for node in tree.iter().filter(|n| !n.is_root()) {
            let parent = tree.node(node.parent().unwrap());
            assert_eq!(node.depth(), parent.depth() + 1);
        }
        assert_eq!(tree.node(leaf).layer(), Some(Layer::Parameters));
        assert_eq!(tree.node(tree.root()).state(), NodeState::Expanded);
    }

    #[test]
    fn last_layer_rejects_children() {
        let mut tree = FormulationTree::new();
        let leaf = chain(&mut tree, 6);
        assert!(tree.node(leaf).is_complete());
        assert_eq!(tree.add_child(leaf, "extra"), Err(TreeError::LastLayer(leaf.index())));
    }

    #[test]
    fn formulation_follows_path() {
        let mut tree = FormulationTree::new();
        let a = tree.add_child(tree.root(), "LP").unwrap();
        let _b = tree.add_child(tree.root(), "MILP").unwrap();
        let c = tree.add_child(a, "I = {1,2}").unwrap();
        let f = tree.formulation(c);
        assert_eq!(f.get(Layer::Type), Some("LP"));
        assert_eq!(f.get(Layer::Sets), Some("I = {1,2}"));
        assert_eq!(tree.path_from_root(c), vec![tree.root(), a, c]);
        assert_eq!(tree.child_contents(tree.root()), vec!["LP", "MILP"]);
    }

    #[test]
    fn feedback_above_threshold_marks_pending_and_consume_clears() {
        let mut tree = FormulationTree::new();
        let a = tree.add_child(tree.root(), "LP").unwrap();
        tree.add_child(a, "sets").unwrap();
        let feedback = NodeFeedback {
            trigger: true,
            local_uncertainty: 0.5,
            explanation: Some("integrality missing".into()),
        };
        tree.apply_feedback(a, &feedback, 0.3).unwrap();
        assert_eq!(tree.node(a).state(), NodeState::PendingReexpansion);
        assert_eq!(tree.node(a).explanation(), Some("integrality missing"));

        tree.consume_reexpansion(a).unwrap();
        assert_eq!(tree.node(a).state(), NodeState::Expanded);
        assert!(!tree.node(a).trigger_flag());
    }

    #[test]
    fn feedback_below_threshold_does_not_reopen() {
        let mut tree = FormulationTree::new();
        let a = tree.add_child(tree.root(), "LP").unwrap();
        let feedback = NodeFeedback {
            trigger: true,
            local_uncertainty: 0.3,
            explanation: None,
        };
        tree.apply_feedback(a, &feedback, 0.3).unwrap();
        assert!(tree.node(a).trigger_flag());
        assert_eq!(tree.node(a).state(), NodeState::Unexpanded);
    }
}
