//! Configuration for indexing and question answering.

use serde::{Deserialize, Serialize};

use crate::chunking::DEFAULT_SEPARATORS;
use crate::error::{RagError, Result};
use crate::history::DEFAULT_MAX_TURNS;
use crate::retriever::RetrievalPolicy;

/// Configuration parameters shared by the indexer, retriever and orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum passage size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive passages of a page.
    pub chunk_overlap: usize,
    /// Split boundaries in priority order.
    pub separators: Vec<String>,
    /// Maximum number of texts sent to the embedding service per call.
    pub embed_batch_size: usize,
    /// Number of most-recent conversation turns kept as context.
    pub max_turns: usize,
    /// How passages are selected for a question.
    pub retrieval: RetrievalPolicy,
    /// Rewrite follow-up questions into standalone questions before retrieval.
    pub condense_question: bool,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1500,
            chunk_overlap: 200,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
            embed_batch_size: 256,
            max_turns: DEFAULT_MAX_TURNS,
            retrieval: RetrievalPolicy::default(),
            condense_question: true,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Configuration`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `embed_batch_size == 0`
    /// - the retrieval policy is invalid (see [`RetrievalPolicy::validate`])
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::Configuration("chunk_size must be greater than zero".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Configuration(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.embed_batch_size == 0 {
            return Err(RagError::Configuration(
                "embed_batch_size must be greater than zero".into(),
            ));
        }
        self.retrieval.validate()
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum passage size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive passages in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Replace the split boundaries (highest priority first).
    pub fn separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    /// Set how many passages are embedded per service call.
    pub fn embed_batch_size(mut self, size: usize) -> Self {
        self.config.embed_batch_size = size;
        self
    }

    /// Set how many conversation turns are retained.
    pub fn max_turns(mut self, turns: usize) -> Self {
        self.config.max_turns = turns;
        self
    }

    /// Set the retrieval policy.
    pub fn retrieval(mut self, policy: RetrievalPolicy) -> Self {
        self.config.retrieval = policy;
        self
    }

    /// Enable or disable follow-up question rewriting.
    pub fn condense_question(mut self, enabled: bool) -> Self {
        self.config.condense_question = enabled;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Configuration`] as described in [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_handbook_setup() {
        let config = RagConfig::default();
        assert_eq!(config.chunk_size, 1500);
        assert_eq!(config.chunk_overlap, 200);
        assert_eq!(config.max_turns, 4);
        assert_eq!(config.retrieval, RetrievalPolicy::Similarity { k: 8, score_threshold: Some(0.7) });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_overlap_not_smaller_than_chunk() {
        let err = RagConfig::builder().chunk_size(100).chunk_overlap(100).build().unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));
    }

    #[test]
    fn rejects_invalid_policy() {
        let err = RagConfig::builder()
            .retrieval(RetrievalPolicy::Mmr { k: 10, fetch_k: 5, lambda: 0.5 })
            .build()
            .unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: RagConfig =
            serde_json::from_str(r#"{"chunk_size": 800, "retrieval": {"mmr": {"k": 5, "fetch_k": 20, "lambda": 0.5}}}"#)
                .unwrap();
        assert_eq!(config.chunk_size, 800);
        assert_eq!(config.chunk_overlap, 200);
        assert_eq!(config.retrieval, RetrievalPolicy::Mmr { k: 5, fetch_k: 20, lambda: 0.5 });
    }
}
