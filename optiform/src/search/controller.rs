//! Drives select → expand → simulate → evaluate → backpropagate for one problem.
//!
//! All per-problem state (tree, knowledge base) lives inside [`SearchController::solve`],
//! so one controller can serve concurrent solves.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backprop::Backpropagator;
use super::config::SearchConfig;
use super::evaluator::Evaluator;
use super::events::{IterationTrace, SearchEvent, StopReason};
use super::expander::Expander;
use super::selector::Selector;
use super::simulator::{SimulationResult, Simulator};
use crate::error::{ConfigError, LlmError};
use crate::knowledge::KnowledgeBase;
use crate::llm::{LlmClient, LlmGateway};
use crate::oracle::{AnswerOracle, RelativeToleranceOracle};
use crate::sandbox::CodeExecutor;
use crate::similarity::{SequenceSimilarity, SimilarityMeasure};
use crate::tree::{Formulation, FormulationTree, Layer, NodeId};

/// A natural-language optimization problem and, when known, its answer.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Problem {
    pub text: String,
    pub ground_truth: Option<f64>,
}

impl Problem {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ground_truth: None,
        }
    }

    pub fn with_ground_truth(mut self, answer: f64) -> Self {
        self.ground_truth = Some(answer);
        self
    }
}

/// Result of one search.
#[derive(Clone, Debug, Serialize)]
pub struct SolveOutcome {
    pub best_formulation: Option<Formulation>,
    pub best_reward: Option<f64>,
    pub best_answer: Option<f64>,
    pub best_code: Option<String>,
    /// Best simulation ran without crashing.
    pub executed: bool,
    /// A simulation's answer matched the ground truth.
    pub solved: bool,
    pub stop_reason: StopReason,
    pub iterations: usize,
    pub trace: Vec<IterationTrace>,
    pub tree_size: usize,
    pub max_depth: usize,
    pub knowledge: KnowledgeBase,
    #[serde(skip)]
    pub tree: FormulationTree,
}

/// External services the search talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub llm: Arc<dyn LlmClient>,
    pub executor: Arc<dyn CodeExecutor>,
    /// Defaults to a relative-tolerance oracle at `answer_tolerance`.
    pub oracle: Option<Arc<dyn AnswerOracle>>,
    /// Defaults to [`SequenceSimilarity`].
    pub similarity: Option<Arc<dyn SimilarityMeasure>>,
}

impl Collaborators {
    pub fn new(llm: Arc<dyn LlmClient>, executor: Arc<dyn CodeExecutor>) -> Self {
        Self {
            llm,
            executor,
            oracle: None,
            similarity: None,
        }
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn AnswerOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn with_similarity(mut self, similarity: Arc<dyn SimilarityMeasure>) -> Self {
        self.similarity = Some(similarity);
        self
    }
}

pub struct SearchController {
    config: SearchConfig,
    selector: Selector,
    expander: Expander,
    simulator: Simulator,
    evaluator: Evaluator,
    backprop: Backpropagator,
    events: Option<mpsc::Sender<SearchEvent>>,
}

impl SearchController {
    pub fn new(config: SearchConfig, collaborators: Collaborators) -> Result<Self, ConfigError> {
        config.validate()?;
        let gateway = LlmGateway::new(collaborators.llm, config.llm_retry.clone(), config.llm_timeout());
        let oracle: Arc<dyn AnswerOracle> = match collaborators.oracle {
            Some(oracle) => oracle,
            None => Arc::new(RelativeToleranceOracle::new(config.answer_tolerance)),
        };
        let similarity: Arc<dyn SimilarityMeasure> = match collaborators.similarity {
            Some(similarity) => similarity,
            None => Arc::new(SequenceSimilarity::default()),
        };

        let expander = Expander::new(gateway.clone(), similarity)
            .with_limits(config.candidates_per_expansion, config.max_children)
            .with_similarity_threshold(config.similarity_threshold)
            .with_guidance_window(config.guidance_window)
            .with_temperature(config.expand_temperature);
        let simulator = Simulator::new(
            gateway.clone(),
            collaborators.executor,
            oracle,
            config.execution_retry.clone(),
        )
        .with_temperature(config.code_temperature);
        let evaluator = Evaluator::new(gateway)
            .with_judgments(config.judgments, config.min_valid_judgments)
            .with_temperature(config.judge_temperature);

        Ok(Self {
            selector: Selector::new(config.exploration_constant),
            backprop: Backpropagator::new(config.reexpansion_threshold),
            expander,
            simulator,
            evaluator,
            events: None,
            config,
        })
    }

    /// Streams [`SearchEvent`]s to `tx`. A dropped receiver is ignored.
    pub fn with_events(mut self, tx: mpsc::Sender<SearchEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    async fn emit(&self, event: SearchEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }

    pub async fn solve(&self, problem: &Problem) -> SolveOutcome {
        self.solve_with_cancel(problem, &CancellationToken::new()).await
    }

    /// Runs the search; cancellation stops at the next collaborator boundary and
    /// returns the best result committed so far.
    pub async fn solve_with_cancel(&self, problem: &Problem, cancel: &CancellationToken) -> SolveOutcome {
        self.solve_from_tree(problem, FormulationTree::new(), cancel).await
    }

    /// Continues a search on an existing tree (statistics kept) with an empty
    /// knowledge base.
    pub async fn solve_from_tree(
        &self,
        problem: &Problem,
        mut tree: FormulationTree,
        cancel: &CancellationToken,
    ) -> SolveOutcome {
        let mut kb = KnowledgeBase::new();
        let mut trace = Vec::new();
        let mut simulations: Vec<(NodeId, SimulationResult)> = Vec::new();
        let mut stop_reason = StopReason::BudgetExhausted;
        let mut matched: Option<usize> = None;

        for iteration in 1..=self.config.max_iterations {
            if cancel.is_cancelled() {
                stop_reason = StopReason::Cancelled;
                break;
            }
            self.emit(SearchEvent::IterationStarted { iteration }).await;
            let mut record = IterationTrace {
                iteration,
                started_at: Some(Utc::now()),
                ..Default::default()
            };

            let selection = self.selector.select(&tree);
            let mut path = selection.path;
            debug!(iteration, leaf = %path[path.len() - 1], expand = selection.expansion.is_some(), "selected");

            if let Some(point) = &selection.expansion {
                let report = self
                    .expander
                    .expand(&mut tree, &kb, &problem.text, point, cancel)
                    .await;
                self.emit(SearchEvent::Expanded {
                    iteration,
                    report: report.clone(),
                })
                .await;
                let first = report.added.first().copied();
                record.expansion = Some(report);
                match first {
                    Some(child) => path.push(child),
                    None => {
                        record.path = path;
                        record.skipped = Some("no candidate survived expansion".to_string());
                        if cancel.is_cancelled() {
                            stop_reason = StopReason::Cancelled;
                            break;
                        }
                        self.finish_iteration(&mut trace, record).await;
                        continue;
                    }
                }
            }
            let leaf = path[path.len() - 1];
            record.rollout_layers = Layer::COUNT - tree.node(leaf).depth();

            let formulation = match self
                .expander
                .rollout(&tree, &kb, &problem.text, leaf, cancel)
                .await
            {
                Ok(f) => f,
                Err(LlmError::Cancelled) => {
                    stop_reason = StopReason::Cancelled;
                    break;
                }
                Err(e) => {
                    warn!(iteration, error = %e, "rollout failed");
                    record.path = path;
                    record.skipped = Some(format!("rollout failed: {}", e));
                    self.finish_iteration(&mut trace, record).await;
                    continue;
                }
            };

            let mut simulation = self
                .simulator
                .simulate(&problem.text, formulation, problem.ground_truth, cancel)
                .await;
            if cancel.is_cancelled() {
                stop_reason = StopReason::Cancelled;
                break;
            }
            self.emit(SearchEvent::Simulated {
                iteration,
                executions: simulation.executions,
                feasible: simulation.feasible,
                answer: simulation.answer,
                answer_matches: simulation.answer_matches,
            })
            .await;

            let evaluation = if simulation.answer_matches {
                None
            } else {
                let evaluation = self.evaluator.evaluate(&problem.text, &simulation, cancel).await;
                if cancel.is_cancelled() {
                    stop_reason = StopReason::Cancelled;
                    break;
                }
                simulation.apply_score(evaluation.mean_score);
                self.emit(SearchEvent::Evaluated {
                    iteration,
                    mean_score: evaluation.mean_score,
                    global_uncertainty: evaluation.global_uncertainty,
                    confidence: evaluation.confidence,
                    triggered: evaluation.triggered(),
                })
                .await;
                Some(evaluation)
            };

            match self.backprop.backpropagate(
                &mut tree,
                &mut kb,
                &path,
                simulation.reward,
                evaluation.as_ref(),
            ) {
                Ok(report) => record.backprop = Some(report),
                Err(e) => warn!(iteration, error = %e, "backpropagation failed"),
            }

            record.triggers = path.iter().skip(1).map(|id| tree.node(*id).trigger_flag()).collect();
            record.reward = Some(simulation.reward);
            record.answer_matches = simulation.answer_matches;
            record.path = path;
            info!(
                iteration,
                reward = simulation.reward,
                executions = simulation.executions,
                answer = ?simulation.answer,
                tree_size = tree.len(),
                "iteration done"
            );
            let answer_matches = simulation.answer_matches;
            simulations.push((leaf, simulation));
            self.finish_iteration(&mut trace, record).await;

            if answer_matches {
                matched = Some(simulations.len() - 1);
                stop_reason = StopReason::AnswerMatched;
                break;
            }
        }

        let best = matched.or_else(|| best_simulation(&tree, &simulations));
        let best = best.map(|i| &simulations[i].1);
        let outcome = SolveOutcome {
            best_formulation: best.map(|s| s.formulation.clone()),
            best_reward: best.map(|s| s.reward),
            best_answer: best.and_then(|s| s.answer),
            best_code: best.map(|s| s.code.clone()),
            executed: best.map_or(false, |s| s.feasible),
            solved: matched.is_some(),
            stop_reason,
            iterations: trace.len(),
            trace,
            tree_size: tree.len(),
            max_depth: tree.max_depth(),
            knowledge: kb,
            tree,
        };
        if outcome.best_formulation.is_none() {
            warn!(iterations = outcome.iterations, "no complete formulation was simulated");
        }
        info!(
            stop_reason = %outcome.stop_reason,
            iterations = outcome.iterations,
            best_reward = ?outcome.best_reward,
            solved = outcome.solved,
            "search finished"
        );
        self.emit(SearchEvent::Finished {
            stop_reason: outcome.stop_reason,
            iterations: outcome.iterations,
            best_reward: outcome.best_reward,
        })
        .await;
        outcome
    }

    async fn finish_iteration(&self, trace: &mut Vec<IterationTrace>, mut record: IterationTrace) {
        if let Some(started) = record.started_at {
            record.elapsed_ms = (Utc::now() - started).num_milliseconds().max(0) as u64;
        }
        if let Some(reason) = &record.skipped {
            debug!(iteration = record.iteration, reason = %reason, "iteration skipped");
        }
        self.emit(SearchEvent::Iteration(record.clone())).await;
        trace.push(record);
    }
}

/// Index of the simulation whose simulated tree node has the highest Q; ties go
/// to the higher reward, then to the earlier simulation.
fn best_simulation(tree: &FormulationTree, simulations: &[(NodeId, SimulationResult)]) -> Option<usize> {
    let mut best: Option<(usize, f64, f64)> = None;
    for (i, (node, sim)) in simulations.iter().enumerate() {
        let q = tree.node(*node).value();
        let better = match best {
            None => true,
            Some((_, best_q, best_r)) => q > best_q || (q == best_q && sim.reward > best_r),
        };
        if better {
            best = Some((i, q, sim.reward));
        }
    }
    best.map(|(i, _, _)| i)
}
