//! Per-layer guidance ledger for one problem's search.
//!
//! The Evaluator's triggered guidance is appended here by the Backpropagator and
//! the Expander reads the most recent entries for the layer it is generating.
//! Entries are never removed.

use serde::Serialize;

use crate::tree::Layer;

/// One ordered list of guidance strings per formulation layer.
#[derive(Clone, Debug, Default, Serialize)]
pub struct KnowledgeBase {
    layers: [Vec<String>; Layer::COUNT],
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends guidance for `layer`. Blank guidance is ignored; returns whether an
    /// entry was added.
    pub fn append(&mut self, layer: Layer, guidance: impl Into<String>) -> bool {
        let guidance = guidance.into();
        let trimmed = guidance.trim();
        if trimmed.is_empty() {
            return false;
        }
        self.layers[layer.index()].push(trimmed.to_string());
        true
    }

    pub fn entries(&self, layer: Layer) -> &[String] {
        &self.layers[layer.index()]
    }

    /// The last `n` entries for `layer`, oldest first.
    pub fn recent(&self, layer: Layer, n: usize) -> &[String] {
        let entries = self.entries(layer);
        &entries[entries.len().saturating_sub(n)..]
    }

    pub fn len(&self, layer: Layer) -> usize {
        self.layers[layer.index()].len()
    }

    /// Total entries across all layers.
    pub fn total(&self) -> usize {
        self.layers.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_returns_tail_in_order() {
        let mut kb = KnowledgeBase::new();
        for i in 0..5 {
            kb.append(Layer::Constraints, format!("g{}", i));
        }
        assert_eq!(kb.recent(Layer::Constraints, 3), ["g2", "g3", "g4"]);
        assert_eq!(kb.recent(Layer::Constraints, 10).len(), 5);
        assert!(kb.recent(Layer::Type, 3).is_empty());
    }

    #[test]
    fn blank_guidance_is_not_appended() {
        let mut kb = KnowledgeBase::new();
        assert!(!kb.append(Layer::Sets, "   "));
        assert!(kb.append(Layer::Sets, " use integer sets "));
        assert_eq!(kb.entries(Layer::Sets), ["use integer sets"]);
        assert_eq!(kb.total(), 1);
    }

    #[test]
    fn layers_are_independent() {
        let mut kb = KnowledgeBase::new();
        kb.append(Layer::Objective, "maximize profit");
        assert_eq!(kb.len(Layer::Objective), 1);
        assert_eq!(kb.len(Layer::Variables), 0);
    }
}
