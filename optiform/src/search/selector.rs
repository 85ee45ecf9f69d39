//! UCB tree walk that stops early at nodes flagged for re-expansion.

use serde::Serialize;

use crate::tree::{FormulationTree, NodeId, NodeState};

/// Why the Selector stopped at a node.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExpansionReason {
    /// No children yet.
    Unexpanded,
    /// Evaluator feedback asked for more alternatives below this node.
    Reexpansion { explanation: Option<String> },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExpansionPoint {
    pub node: NodeId,
    pub reason: ExpansionReason,
}

/// Result of one walk: the visited path (root first) and, unless the path ends
/// at a complete formulation, the node to expand (the last path entry).
#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    pub path: Vec<NodeId>,
    pub expansion: Option<ExpansionPoint>,
}

impl Selection {
    pub fn leaf(&self) -> NodeId {
        self.path[self.path.len() - 1]
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Selector {
    exploration: f64,
}

impl Selector {
    pub fn new(exploration: f64) -> Self {
        Self { exploration }
    }

    pub fn select(&self, tree: &FormulationTree) -> Selection {
        let mut path = vec![tree.root()];
        let mut current = tree.root();
        loop {
            let node = tree.node(current);
            if node.state() == NodeState::PendingReexpansion && !node.is_complete() {
                return Selection {
                    path,
                    expansion: Some(ExpansionPoint {
                        node: current,
                        reason: ExpansionReason::Reexpansion {
                            explanation: node.explanation().map(str::to_string),
                        },
                    }),
                };
            }
            if node.is_complete() {
                return Selection {
                    path,
                    expansion: None,
                };
            }
            if node.is_leaf() {
                return Selection {
                    path,
                    expansion: Some(ExpansionPoint {
                        node: current,
                        reason: ExpansionReason::Unexpanded,
                    }),
                };
            }
            current = self.best_child(tree, current);
            path.push(current);
        }
    }

    /// Child with the highest UCB; the first one wins ties, so the first
    /// unvisited child in order is taken before any visited one.
    fn best_child(&self, tree: &FormulationTree, parent: NodeId) -> NodeId {
        let parent_node = tree.node(parent);
        let parent_visits = parent_node.visits();
        let mut best = parent_node.children()[0];
        let mut best_score = f64::NEG_INFINITY;
        for &child in parent_node.children() {
            let score = tree.node(child).ucb(parent_visits, self.exploration);
            if score > best_score {
                best = child;
                best_score = score;
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::NodeFeedback;

    #[test]
    fn empty_tree_expands_root() {
        let tree = FormulationTree::new();
        let sel = Selector::new(2.0).select(&tree);
        assert_eq!(sel.path, vec![tree.root()]);
        assert_eq!(
            sel.expansion,
            Some(ExpansionPoint {
                node: tree.root(),
                reason: ExpansionReason::Unexpanded
            })
        );
    }

    #[test]
    fn unvisited_child_is_taken_first() {
        let mut tree = FormulationTree::new();
        let root = tree.root();
        let a = tree.add_child(root, "LP").unwrap();
        let b = tree.add_child(root, "MILP").unwrap();
        let c = tree.add_child(root, "IP").unwrap();
        for _ in 0..3 {
            tree.record_visit(root, 0.5, 1.0).unwrap();
        }
        tree.record_visit(a, 0.9, 1.0).unwrap();
        tree.record_visit(c, 0.9, 1.0).unwrap();
        let sel = Selector::new(2.0).select(&tree);
        assert_eq!(sel.path, vec![root, b]);
    }

    #[test]
    fn pending_reexpansion_stops_at_node_with_children() {
        let mut tree = FormulationTree::new();
        let root = tree.root();
        let a = tree.add_child(root, "LP").unwrap();
        let a1 = tree.add_child(a, "I").unwrap();
        tree.record_visit(root, 0.2, 1.0).unwrap();
        tree.record_visit(a, 0.2, 1.0).unwrap();
        tree.record_visit(a1, 0.2, 1.0).unwrap();
        let feedback = NodeFeedback {
            trigger: true,
            local_uncertainty: 0.5,
            explanation: Some("wrong class".into()),
        };
        tree.apply_feedback(a, &feedback, 0.3).unwrap();

        let sel = Selector::new(2.0).select(&tree);
        assert_eq!(sel.path, vec![root, a]);
        assert_eq!(
            sel.expansion.unwrap().reason,
            ExpansionReason::Reexpansion {
                explanation: Some("wrong class".into())
            }
        );
    }

    #[test]
    fn complete_path_has_no_expansion() {
        let mut tree = FormulationTree::new();
        let mut id = tree.root();
        for i in 0..6 {
            tree.record_visit(id, 0.1, 1.0).unwrap();
            id = tree.add_child(id, format!("l{}", i)).unwrap();
        }
        let sel = Selector::new(2.0).select(&tree);
        assert_eq!(sel.path.len(), 7);
        assert_eq!(sel.leaf(), id);
        assert!(sel.expansion.is_none());
    }

    #[test]
    fn highest_ucb_wins_among_visited() {
        let mut tree = FormulationTree::new();
        let root = tree.root();
        let a = tree.add_child(root, "LP").unwrap();
        let b = tree.add_child(root, "MILP").unwrap();
        for _ in 0..2 {
            tree.record_visit(root, 0.0, 1.0).unwrap();
        }
        tree.record_visit(a, 0.1, 1.0).unwrap();
        tree.record_visit(b, 0.9, 1.0).unwrap();
        let sel = Selector::new(2.0).select(&tree);
        assert_eq!(sel.path[1], b);
    }
}
