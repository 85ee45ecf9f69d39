//! Uncertainty-aware MCTS over formulation trees.
//!
//! One iteration: [`Selector`] walks to an expansion point, [`Expander`] adds
//! candidate children, the path is completed by a rollout and handed to the
//! [`Simulator`], the [`Evaluator`] judges the result K times, and the
//! [`Backpropagator`] folds reward, confidence and feedback back into the tree
//! and the knowledge base. [`SearchController`] repeats this within the budget.

mod backprop;
mod config;
mod controller;
mod evaluator;
mod events;
mod expander;
mod selector;
mod simulator;

pub use backprop::{BackpropReport, Backpropagator};
pub use config::SearchConfig;
pub use controller::{Collaborators, Problem, SearchController, SolveOutcome};
pub use evaluator::{population_std, Evaluation, Evaluator, Judgment, LayerJudgment, LayerSignal};
pub use events::{IterationTrace, SearchEvent, StopReason};
pub use expander::{ExpansionReport, Expander};
pub use selector::{ExpansionPoint, ExpansionReason, Selection, Selector};
pub use simulator::{reward, SimulationResult, Simulator};
