//! The six formulation layers, in search order.

use serde::{Deserialize, Serialize};

/// One stage of a mathematical formulation. Depth in the tree equals the
/// discriminant; depth 0 is the root and has no layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Type = 1,
    Sets = 2,
    Parameters = 3,
    Variables = 4,
    Objective = 5,
    Constraints = 6,
}

impl Layer {
    pub const ALL: [Layer; 6] = [
        Layer::Type,
        Layer::Sets,
        Layer::Parameters,
        Layer::Variables,
        Layer::Objective,
        Layer::Constraints,
    ];

    /// Number of layers; a complete formulation has one fragment per layer.
    pub const COUNT: usize = 6;

    /// Layer at tree depth `depth` (1..=6).
    pub fn from_depth(depth: usize) -> Option<Layer> {
        depth.checked_sub(1).and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn depth(self) -> usize {
        self as usize
    }

    /// 0-based position, for per-layer arrays.
    pub fn index(self) -> usize {
        self as usize - 1
    }

    pub fn next(self) -> Option<Layer> {
        Self::from_depth(self.depth() + 1)
    }

    pub fn is_last(self) -> bool {
        self == Layer::Constraints
    }

    /// Lowercase key used in judge JSON.
    pub fn key(self) -> &'static str {
        match self {
            Layer::Type => "type",
            Layer::Sets => "sets",
            Layer::Parameters => "parameters",
            Layer::Variables => "variables",
            Layer::Objective => "objective",
            Layer::Constraints => "constraints",
        }
    }

    /// Capitalized name used in prompts and rendered formulations.
    pub fn title(self) -> &'static str {
        match self {
            Layer::Type => "Type",
            Layer::Sets => "Sets",
            Layer::Parameters => "Parameters",
            Layer::Variables => "Variables",
            Layer::Objective => "Objective",
            Layer::Constraints => "Constraints",
        }
    }

    /// What the fragment for this layer should state.
    pub fn describe(self) -> &'static str {
        match self {
            Layer::Type => "the problem class (LP, MILP, IP, NLP, ...) and whether it minimizes or maximizes",
            Layer::Sets => "the index sets the model ranges over",
            Layer::Parameters => "the known data with symbols and values taken from the problem",
            Layer::Variables => "the decision variables with domains and bounds",
            Layer::Objective => "the objective function over the variables",
            Layer::Constraints => "every constraint the problem imposes",
        }
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}
