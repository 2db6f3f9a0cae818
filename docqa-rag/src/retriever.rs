//! Passage retrieval from a persisted index.
//!
//! Two policies are available. [`RetrievalPolicy::Similarity`] returns the
//! top `k` passages by cosine similarity, optionally dropping those under a
//! score threshold. [`RetrievalPolicy::Mmr`] takes the `fetch_k` nearest
//! passages and greedily picks `k` of them by maximal marginal relevance:
//!
//! `mmr = λ × sim(query, p) − (1 − λ) × max sim(p, already selected)`
//!
//! so that near-duplicate passages (such as the overlapping tails produced by
//! the chunker) do not crowd out everything else. Both policies are
//! deterministic for a fixed index and query.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::document::ScoredPassage;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::{IndexStore, VectorIndex, cosine_similarity};

fn default_lambda() -> f32 {
    0.5
}

/// How passages are selected for a query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalPolicy {
    /// Top `k` by similarity, keeping only scores `>= score_threshold` when set.
    Similarity {
        k: usize,
        #[serde(default)]
        score_threshold: Option<f32>,
    },
    /// Maximal marginal relevance over the `fetch_k` nearest passages.
    Mmr {
        k: usize,
        fetch_k: usize,
        /// 1.0 is pure relevance, 0.0 is pure diversity.
        #[serde(default = "default_lambda")]
        lambda: f32,
    },
}

impl Default for RetrievalPolicy {
    fn default() -> Self {
        Self::similarity()
    }
}

impl RetrievalPolicy {
    /// Similarity search with `k = 8` and a `0.7` score threshold.
    pub fn similarity() -> Self {
        Self::Similarity { k: 8, score_threshold: Some(0.7) }
    }

    /// MMR with `k = 5`, `fetch_k = 20`, `λ = 0.5`.
    pub fn mmr() -> Self {
        Self::Mmr { k: 5, fetch_k: 20, lambda: default_lambda() }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Similarity { .. } => "similarity",
            Self::Mmr { .. } => "mmr",
        }
    }

    /// Number of passages the policy returns at most.
    pub fn k(&self) -> usize {
        match *self {
            Self::Similarity { k, .. } | Self::Mmr { k, .. } => k,
        }
    }

    /// # Errors
    ///
    /// Returns [`RagError::Configuration`] if `k == 0`, `fetch_k < k`, or the
    /// threshold or lambda lies outside `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Similarity { k, score_threshold } => {
                if k == 0 {
                    return Err(RagError::Configuration("k must be greater than zero".into()));
                }
                if let Some(t) = score_threshold {
                    if !(0.0..=1.0).contains(&t) {
                        return Err(RagError::Configuration(format!(
                            "score_threshold ({t}) must be within [0, 1]"
                        )));
                    }
                }
            }
            Self::Mmr { k, fetch_k, lambda } => {
                if k == 0 {
                    return Err(RagError::Configuration("k must be greater than zero".into()));
                }
                if fetch_k < k {
                    return Err(RagError::Configuration(format!(
                        "fetch_k ({fetch_k}) must be at least k ({k})"
                    )));
                }
                if !(0.0..=1.0).contains(&lambda) {
                    return Err(RagError::Configuration(format!(
                        "lambda ({lambda}) must be within [0, 1]"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Answers `retrieve` calls against indexes published in an [`IndexStore`].
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{Retriever, RetrievalPolicy};
///
/// let retriever = Retriever::new(embedder, store);
/// let passages = retriever
///     .retrieve("When does enrolment close?", Path::new("faiss_index"), &RetrievalPolicy::mmr())
///     .await?;
/// ```
pub struct Retriever {
    embedding_provider: Arc<dyn EmbeddingProvider>,
    store: Arc<IndexStore>,
}

impl Retriever {
    pub fn new(embedding_provider: Arc<dyn EmbeddingProvider>, store: Arc<IndexStore>) -> Self {
        Self { embedding_provider, store }
    }

    /// Return passages relevant to `query`, most relevant first.
    ///
    /// An index that holds no passage meeting the policy's criteria yields an
    /// empty `Vec`, not an error.
    ///
    /// # Errors
    ///
    /// - [`RagError::IndexNotFound`] / [`RagError::IndexCorrupt`] if the index
    ///   at `storage_path` is missing or unreadable
    /// - [`RagError::Configuration`] if the policy is invalid
    /// - [`RagError::Embedding`] if the query vector does not match the index
    /// - any error from the embedding provider
    pub async fn retrieve(
        &self,
        query: &str,
        storage_path: &Path,
        policy: &RetrievalPolicy,
    ) -> Result<Vec<ScoredPassage>> {
        policy.validate()?;
        let index = self.store.load(storage_path).await?;
        if index.is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedding_provider.embed(query).await.map_err(|e| {
            error!(provider = self.embedding_provider.name(), error = %e, "query embedding failed");
            e
        })?;
        if query_embedding.len() != index.dimensions() {
            return Err(RagError::Embedding {
                provider: self.embedding_provider.name().to_string(),
                message: format!(
                    "query vector has {} dimensions but the index at '{}' has {}",
                    query_embedding.len(),
                    storage_path.display(),
                    index.dimensions()
                ),
            });
        }

        let hits = match *policy {
            RetrievalPolicy::Similarity { k, score_threshold } => {
                let threshold = score_threshold.unwrap_or(f32::NEG_INFINITY);
                index
                    .nearest(&query_embedding, k)
                    .into_iter()
                    .filter(|&(_, score)| score >= threshold)
                    .collect()
            }
            RetrievalPolicy::Mmr { k, fetch_k, lambda } => {
                let candidates = index.nearest(&query_embedding, fetch_k);
                debug!(candidate_count = candidates.len(), "mmr candidate pool");
                mmr_select(&index, candidates, k, lambda)
            }
        };

        let results: Vec<ScoredPassage> = hits
            .into_iter()
            .map(|(i, score)| ScoredPassage { passage: index.entries()[i].passage.clone(), score })
            .collect();

        info!(
            policy = policy.name(),
            storage_path = %storage_path.display(),
            result_count = results.len(),
            "retrieval completed"
        );
        Ok(results)
    }
}

/// MMR scores closer than this are treated as equal.
const MMR_TIE_EPSILON: f32 = 1e-6;

/// Greedily pick up to `k` candidates by maximal marginal relevance.
///
/// `candidates` must be ordered by descending relevance. Ties in MMR score go
/// to the candidate least similar to those already selected, then to the
/// earlier candidate. Returned scores are the original similarities.
fn mmr_select(
    index: &VectorIndex,
    candidates: Vec<(usize, f32)>,
    k: usize,
    lambda: f32,
) -> Vec<(usize, f32)> {
    let entries = index.entries();
    let mut remaining = candidates;
    let mut selected: Vec<(usize, f32)> = Vec::with_capacity(k.min(remaining.len()));

    while selected.len() < k && !remaining.is_empty() {
        let mut best = 0;
        let mut best_score = f32::NEG_INFINITY;
        let mut best_redundancy = f32::INFINITY;

        for (pos, &(idx, relevance)) in remaining.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|&(s, _)| cosine_similarity(&entries[idx].embedding, &entries[s].embedding))
                .fold(None, |acc: Option<f32>, sim| Some(acc.map_or(sim, |m| m.max(sim))))
                .unwrap_or(0.0);

            let score = lambda * relevance - (1.0 - lambda) * redundancy;
            let tied = (score - best_score).abs() <= MMR_TIE_EPSILON;
            if (score > best_score && !tied) || (tied && redundancy < best_redundancy) {
                best_score = score;
                best_redundancy = redundancy;
                best = pos;
            }
        }

        selected.push(remaining.remove(best));
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{CharSpan, Passage};

    fn index_of(vectors: Vec<Vec<f32>>) -> VectorIndex {
        let passages = (0..vectors.len())
            .map(|i| Passage {
                id: format!("d_p1_{i}"),
                document_id: "d".into(),
                text: format!("text {i}"),
                source_page: 1,
                char_span: CharSpan { start: i, end: i + 1 },
            })
            .collect();
        VectorIndex::new(passages, vectors).unwrap()
    }

    #[test]
    fn mmr_skips_near_duplicates() {
        // 0 and 1 are near-identical and both close to the query; 2 is distinct.
        let index = index_of(vec![vec![1.0, 0.0, 0.0], vec![1.0, 0.01, 0.0], vec![0.0, 0.0, 1.0]]);
        let query = [1.0, 0.0, 0.6];
        let candidates = index.nearest(&query, 3);
        let picked: Vec<usize> = mmr_select(&index, candidates, 2, 0.5).into_iter().map(|p| p.0).collect();
        assert_eq!(picked, vec![0, 2]);
    }

    #[test]
    fn mmr_tie_goes_to_the_less_redundant_candidate() {
        // after picking 0, its copy 1 and the unrelated 2 both score 0
        let index = index_of(vec![vec![1.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0]]);
        let candidates = index.nearest(&[1.0, 0.0], 3);
        let picked: Vec<usize> = mmr_select(&index, candidates, 2, 0.5).into_iter().map(|p| p.0).collect();
        assert_eq!(picked, vec![0, 2]);
    }

    #[test]
    fn mmr_with_lambda_one_is_plain_ranking() {
        let index = index_of(vec![vec![1.0, 0.0], vec![0.99, 0.01], vec![0.0, 1.0]]);
        let candidates = index.nearest(&[1.0, 0.0], 3);
        let expected: Vec<usize> = candidates.iter().take(2).map(|c| c.0).collect();
        let picked: Vec<usize> = mmr_select(&index, candidates, 2, 1.0).into_iter().map(|p| p.0).collect();
        assert_eq!(picked, expected);
    }

    #[test]
    fn mmr_returns_fewer_when_pool_is_small() {
        let index = index_of(vec![vec![1.0, 0.0]]);
        let candidates = index.nearest(&[1.0, 0.0], 20);
        assert_eq!(mmr_select(&index, candidates, 5, 0.5).len(), 1);
    }

    #[test]
    fn validates_policies() {
        assert!(RetrievalPolicy::similarity().validate().is_ok());
        assert!(RetrievalPolicy::mmr().validate().is_ok());
        assert!(RetrievalPolicy::Similarity { k: 0, score_threshold: None }.validate().is_err());
        assert!(RetrievalPolicy::Similarity { k: 3, score_threshold: Some(1.5) }.validate().is_err());
        assert!(RetrievalPolicy::Mmr { k: 5, fetch_k: 4, lambda: 0.5 }.validate().is_err());
        assert!(RetrievalPolicy::Mmr { k: 5, fetch_k: 20, lambda: -0.1 }.validate().is_err());
    }

    #[test]
    fn policy_json_shape() {
        let json = serde_json::to_string(&RetrievalPolicy::mmr()).unwrap();
        assert_eq!(json, r#"{"mmr":{"k":5,"fetch_k":20,"lambda":0.5}}"#);
        let parsed: RetrievalPolicy = serde_json::from_str(r#"{"similarity":{"k":3}}"#).unwrap();
        assert_eq!(parsed, RetrievalPolicy::Similarity { k: 3, score_threshold: None });
    }
}
