//! Error types shared by the search components.
//!
//! Collaborator failures never escape `SearchController::solve`; these types are
//! what the components hand each other before a failure is folded into a
//! low-reward or low-confidence signal.

use std::time::Duration;

use thiserror::Error;

/// Error from one call to the language-model service.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Request failed in transport (HTTP, API error, request build).
    #[error("llm transport failed: {0}")]
    Transport(String),

    /// The call did not finish within its timeout.
    #[error("llm call timed out after {0:?}")]
    Timeout(Duration),

    /// The model answered but the output did not have the expected shape.
    #[error("llm output failed validation: {0}")]
    Validation(String),

    /// The call was aborted because the search was cancelled.
    #[error("llm call cancelled")]
    Cancelled,
}

impl LlmError {
    /// Whether a retry with the same prompt may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, LlmError::Cancelled)
    }
}

/// Error from an embedding provider used for similarity pruning.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    Request(String),

    #[error("embedding response malformed: {0}")]
    Malformed(String),
}

/// Invalid search configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Structural violations on the formulation tree.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    /// Layer-6 nodes are complete formulations and cannot take children.
    #[error("node {0} is at the last layer and cannot have children")]
    LastLayer(usize),

    #[error("unknown node id {0}")]
    UnknownNode(usize),
}
