//! Assembled formulation text: one fragment per layer along a path.

use serde::{Deserialize, Serialize};

use super::Layer;

/// Ordered fragments, one per layer starting at [`Layer::Type`].
///
/// A formulation taken from a tree path may stop before layer 6; the rollout
/// fills the rest before simulation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formulation {
    fragments: Vec<(Layer, String)>,
}

impl Formulation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the fragment for the next missing layer. Returns the layer it was
    /// stored under, or `None` when the formulation is already complete.
    pub fn push(&mut self, content: impl Into<String>) -> Option<Layer> {
        let layer = self.next_layer()?;
        self.fragments.push((layer, content.into()));
        Some(layer)
    }

    pub fn get(&self, layer: Layer) -> Option<&str> {
        self.fragments.get(layer.index()).map(|(_, c)| c.as_str())
    }

    pub fn fragments(&self) -> &[(Layer, String)] {
        &self.fragments
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// The first layer without a fragment.
    pub fn next_layer(&self) -> Option<Layer> {
        Layer::from_depth(self.fragments.len() + 1)
    }

    pub fn is_complete(&self) -> bool {
        self.fragments.len() == Layer::COUNT
    }

    /// Markdown-ish rendering used in prompts and results:
    /// `**Type**: ...` one layer per line.
    pub fn render(&self) -> String {
        self.fragments
            .iter()
            .map(|(layer, content)| format!("**{}**: {}", layer.title(), content.trim()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl std::fmt::Display for Formulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_fills_layers_in_order_until_complete() {
        let mut f = Formulation::new();
        for (i, layer) in Layer::ALL.iter().enumerate() {
            assert_eq!(f.next_layer(), Some(*layer));
            assert_eq!(f.push(format!("frag {}", i)), Some(*layer));
        }
        assert!(f.is_complete());
        assert_eq!(f.push("extra"), None);
        assert_eq!(f.get(Layer::Objective), Some("frag 4"));
    }

    #[test]
    fn render_uses_layer_titles() {
        let mut f = Formulation::new();
        f.push("LP, maximize");
        f.push(" I = {1,2} ");
        assert_eq!(f.render(), "**Type**: LP, maximize\n**Sets**: I = {1,2}");
    }
}
