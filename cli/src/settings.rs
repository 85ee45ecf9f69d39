//! Resolves the search configuration and collaborators for one CLI run.
//!
//! Precedence: command-line flags, then the `[search]` table of
//! `$XDG_CONFIG_HOME/optiform/config.toml`, then [`SearchConfig::default`].

use std::path::PathBuf;
use std::sync::Arc;

use clap::ValueEnum;
use optiform::{
    ChatOpenAI, Collaborators, EmbeddingSimilarity, OpenAIEmbedder, PythonExecutor, SearchConfig,
};
use tracing::warn;

use crate::error::CliError;
use crate::offline;

pub const APP_NAME: &str = "optiform";

/// Flags that override individual `SearchConfig` fields.
#[derive(Clone, Debug, Default)]
pub struct SearchOverrides {
    pub iterations: Option<usize>,
    pub eta: Option<f64>,
}

/// Applies `overrides` on top of the file section (or defaults) and validates.
pub fn resolve_search_config(
    file: Option<SearchConfig>,
    overrides: &SearchOverrides,
) -> Result<SearchConfig, CliError> {
    let mut config = file.unwrap_or_default();
    if let Some(n) = overrides.iterations {
        config.max_iterations = n;
    }
    if let Some(eta) = overrides.eta {
        config.reexpansion_threshold = eta;
    }
    config.validate()?;
    Ok(config)
}

/// Reads `[search]` from the user config file and applies `overrides`.
pub fn load_search_config(overrides: &SearchOverrides) -> Result<SearchConfig, CliError> {
    let file = optiform_config::load_section::<SearchConfig>(APP_NAME, "search")?;
    resolve_search_config(file, overrides)
}

/// How the Expander compares candidate fragments with their siblings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum SimilarityKind {
    /// Character-level ratio of the leading text.
    #[default]
    Sequence,
    /// Cosine of OpenAI embeddings.
    Embedding,
}

#[derive(Clone, Debug)]
pub struct ModelSettings {
    pub model: String,
    pub python: PathBuf,
    /// Offline model and executor; no network, no interpreter.
    pub mock: bool,
    pub similarity: SimilarityKind,
    pub embedding_model: String,
}

pub fn build_collaborators(settings: &ModelSettings, config: &SearchConfig) -> Collaborators {
    if settings.mock {
        if settings.similarity == SimilarityKind::Embedding {
            warn!("offline run compares candidates by text; embedding similarity ignored");
        }
        return Collaborators::new(Arc::new(offline::offline_llm()), Arc::new(offline::offline_executor()));
    }
    let collaborators = Collaborators::new(
        Arc::new(ChatOpenAI::new(settings.model.clone())),
        Arc::new(PythonExecutor::new(settings.python.clone(), config.execution_timeout())),
    );
    match settings.similarity {
        SimilarityKind::Sequence => collaborators,
        SimilarityKind::Embedding => collaborators.with_similarity(Arc::new(EmbeddingSimilarity::new(
            OpenAIEmbedder::new(settings.embedding_model.clone()),
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_file_section() {
        let file = SearchConfig {
            max_iterations: 8,
            reexpansion_threshold: 0.5,
            judgments: 5,
            ..Default::default()
        };
        let overrides = SearchOverrides {
            iterations: Some(3),
            ..Default::default()
        };
        let config = resolve_search_config(Some(file), &overrides).unwrap();
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.reexpansion_threshold, 0.5);
        assert_eq!(config.judgments, 5);
    }

    #[test]
    fn defaults_without_file_or_flags() {
        let config = resolve_search_config(None, &SearchOverrides::default()).unwrap();
        assert_eq!(config, SearchConfig::default());
    }

    fn settings(mock: bool, similarity: SimilarityKind) -> ModelSettings {
        ModelSettings {
            model: "gpt-4o-mini".into(),
            python: PathBuf::from("python3"),
            mock,
            similarity,
            embedding_model: "text-embedding-3-small".into(),
        }
    }

    #[test]
    fn embedding_similarity_is_wired_only_when_selected() {
        let config = SearchConfig::default();
        let built = build_collaborators(&settings(false, SimilarityKind::Embedding), &config);
        assert!(built.similarity.is_some());
        let built = build_collaborators(&settings(false, SimilarityKind::Sequence), &config);
        assert!(built.similarity.is_none());
        let built = build_collaborators(&settings(true, SimilarityKind::Embedding), &config);
        assert!(built.similarity.is_none());
    }

    #[test]
    fn out_of_range_flag_is_rejected() {
        let overrides = SearchOverrides {
            iterations: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            resolve_search_config(None, &overrides),
            Err(CliError::Search(_))
        ));
    }
}
