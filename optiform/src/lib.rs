//! # Optiform
//!
//! Searches the space of mathematical formulations for a natural-language
//! optimization problem. A language model proposes formulation fragments layer by
//! layer (Type, Sets, Parameters, Variables, Objective, Constraints) and judges
//! the assembled solutions; a Monte Carlo tree search with uncertainty-weighted
//! backpropagation and a per-layer guidance ledger decides what to try next.
//!
//! ## Main modules
//!
//! - [`tree`]: [`FormulationTree`], [`FormulationNode`], [`Layer`], [`Formulation`].
//! - [`knowledge`]: [`KnowledgeBase`], per-layer guidance for one search.
//! - [`search`]: [`SearchController`] and its components ([`Selector`], [`Expander`],
//!   [`Simulator`], [`Evaluator`], [`Backpropagator`]); [`SearchConfig`]; [`SearchEvent`].
//! - [`llm`]: [`LlmClient`] trait, [`ChatOpenAI`], [`MockLlm`], [`LlmGateway`].
//! - [`sandbox`]: [`CodeExecutor`], [`PythonExecutor`], [`MockExecutor`].
//! - [`oracle`]: [`extract_answer`], [`AnswerOracle`], [`RelativeToleranceOracle`].
//! - [`similarity`]: [`SimilarityMeasure`], [`SequenceSimilarity`], [`EmbeddingSimilarity`].
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use optiform::{ChatOpenAI, Collaborators, Problem, PythonExecutor, SearchConfig, SearchController};
//!
//! # async fn run() -> Result<(), optiform::ConfigError> {
//! let collaborators = Collaborators::new(
//!     Arc::new(ChatOpenAI::new("gpt-4o-mini")),
//!     Arc::new(PythonExecutor::default()),
//! );
//! let controller = SearchController::new(SearchConfig::default(), collaborators)?;
//! let outcome = controller
//!     .solve(&Problem::new("A factory makes chairs and tables ...").with_ground_truth(1500.0))
//!     .await;
//! println!("{:?} {:?}", outcome.stop_reason, outcome.best_reward);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod knowledge;
pub mod llm;
pub mod message;
pub mod oracle;
pub mod prompts;
pub mod retry;
pub mod sandbox;
pub mod search;
pub mod similarity;
pub mod tree;

pub use error::{ConfigError, EmbeddingError, LlmError, TreeError};
pub use knowledge::KnowledgeBase;
pub use llm::{ChatOpenAI, CompletionOptions, LlmClient, LlmGateway, LlmResponse, LlmUsage, MockLlm};
pub use message::Message;
pub use oracle::{extract_answer, AnswerOracle, RelativeToleranceOracle};
pub use retry::RetryPolicy;
pub use sandbox::{CodeExecutor, ExecutionOutput, MockExecutor, PythonExecutor};
pub use search::{
    reward, Backpropagator, Collaborators, Evaluation, Evaluator, ExpansionPoint, ExpansionReason,
    ExpansionReport, Expander, IterationTrace, Problem, SearchConfig, SearchController, SearchEvent,
    Selection, Selector, SimulationResult, Simulator, SolveOutcome, StopReason,
};
pub use similarity::{
    Embedder, EmbeddingSimilarity, OpenAIEmbedder, SequenceSimilarity, SimilarityMeasure,
};
pub use tree::{Formulation, FormulationNode, FormulationTree, Layer, NodeFeedback, NodeId, NodeState};

/// When running `cargo test -p optiform`, initializes tracing from `RUST_LOG` so that
/// unit tests in `src/**` can print logs with `--nocapture`.
#[cfg(test)]
mod test_logging {
    use ctor::ctor;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::Layer;

    #[ctor]
    fn init() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_filter(filter),
            )
            .try_init();
    }
}
