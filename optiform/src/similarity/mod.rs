//! Similarity measures for pruning near-duplicate candidates.
//!
//! The Expander discards a candidate whose maximum similarity to an existing
//! sibling or an already accepted candidate exceeds the configured threshold.
//! [`SequenceSimilarity`] compares the lowercased leading text with a gestalt
//! ratio; [`EmbeddingSimilarity`] compares embedding vectors by cosine.

mod openai_embedder;

pub use openai_embedder::OpenAIEmbedder;

use async_trait::async_trait;

use crate::error::EmbeddingError;

/// Score in [0, 1] of how alike two formulation fragments are.
#[async_trait]
pub trait SimilarityMeasure: Send + Sync {
    async fn similarity(&self, a: &str, b: &str) -> Result<f64, EmbeddingError>;

    /// Highest similarity between `candidate` and any of `others`; 0 when
    /// `others` is empty.
    async fn max_similarity(&self, candidate: &str, others: &[&str]) -> Result<f64, EmbeddingError> {
        let mut best = 0.0f64;
        for other in others {
            best = best.max(self.similarity(candidate, other).await?);
        }
        Ok(best)
    }
}

/// Gestalt pattern-matching ratio over the first `prefix_chars` characters of the
/// lowercased texts.
#[derive(Clone, Debug)]
pub struct SequenceSimilarity {
    prefix_chars: usize,
}

impl Default for SequenceSimilarity {
    fn default() -> Self {
        Self { prefix_chars: 300 }
    }
}

impl SequenceSimilarity {
    pub fn new(prefix_chars: usize) -> Self {
        Self { prefix_chars }
    }

    fn normalize(&self, text: &str) -> String {
        text.to_lowercase().chars().take(self.prefix_chars).collect()
    }

    /// Synchronous ratio, `2 * matches / (len_a + len_b)`.
    pub fn ratio(&self, a: &str, b: &str) -> f64 {
        let a = self.normalize(a);
        let b = self.normalize(b);
        if a.is_empty() && b.is_empty() {
            return 1.0;
        }
        f64::from(similar::TextDiff::from_chars(a.as_str(), b.as_str()).ratio())
    }
}

#[async_trait]
impl SimilarityMeasure for SequenceSimilarity {
    async fn similarity(&self, a: &str, b: &str) -> Result<f64, EmbeddingError> {
        Ok(self.ratio(a, b))
    }
}

/// Produces fixed-size float vectors from text.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Cosine similarity of embedding vectors, clamped to [0, 1].
pub struct EmbeddingSimilarity<E: Embedder> {
    embedder: E,
}

impl<E: Embedder> EmbeddingSimilarity<E> {
    pub fn new(embedder: E) -> Self {
        Self { embedder }
    }
}

/// Cosine of two vectors; 0.0 if either has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        f64::from(dot / (norm_a * norm_b))
    }
}

#[async_trait]
impl<E: Embedder> SimilarityMeasure for EmbeddingSimilarity<E> {
    async fn similarity(&self, a: &str, b: &str) -> Result<f64, EmbeddingError> {
        self.max_similarity(a, &[b]).await
    }

    /// One batched embedding request for the candidate and all comparands.
    async fn max_similarity(&self, candidate: &str, others: &[&str]) -> Result<f64, EmbeddingError> {
        if others.is_empty() {
            return Ok(0.0);
        }
        let mut texts = Vec::with_capacity(others.len() + 1);
        texts.push(candidate);
        texts.extend_from_slice(others);
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(EmbeddingError::Malformed(format!(
                "expected {} vectors, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        let (first, rest) = vectors.split_at(1);
        Ok(rest
            .iter()
            .map(|v| cosine_similarity(&first[0], v).clamp(0.0, 1.0))
            .fold(0.0, f64::max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CharHistogram;

    #[async_trait]
    impl Embedder for CharHistogram {
        async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; 26];
                    for c in t.chars().filter(char::is_ascii_lowercase) {
                        v[(c as u8 - b'a') as usize] += 1.0;
                    }
                    v
                })
                .collect())
        }
    }

    #[test]
    fn sequence_ratio_ignores_case_and_identical_is_one() {
        let s = SequenceSimilarity::default();
        assert!((s.ratio("Minimize Cost", "minimize cost") - 1.0).abs() < 1e-9);
        assert!(s.ratio("maximize profit", "x in {0,1}") < 0.5);
    }

    #[test]
    fn sequence_ratio_only_compares_prefix() {
        let s = SequenceSimilarity::new(5);
        assert!((s.ratio("abcde-one tail", "abcde-other tail") - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn max_similarity_of_empty_set_is_zero() {
        let s = SequenceSimilarity::default();
        assert_eq!(s.max_similarity("anything", &[]).await.unwrap(), 0.0);
        let e = EmbeddingSimilarity::new(CharHistogram);
        assert_eq!(e.max_similarity("anything", &[]).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn embedding_similarity_picks_closest() {
        let e = EmbeddingSimilarity::new(CharHistogram);
        let best = e.max_similarity("abc", &["xyz", "cab"]).await.unwrap();
        assert!((best - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
    }
}
