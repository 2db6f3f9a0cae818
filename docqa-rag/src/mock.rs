//! Deterministic offline providers.
//!
//! [`HashEmbeddingProvider`] embeds text as a hashed bag of words, so passages
//! sharing vocabulary with a query score higher. [`ScriptedLanguageModel`]
//! replays queued replies and records every request it receives. Both need
//! no network access or API keys.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::llm::{GenerationRequest, LanguageModel};

/// Hashed bag-of-words embeddings.
///
/// Latin text is tokenised on non-alphanumeric characters and lowercased;
/// CJK characters each count as a token. Every token increments one bucket
/// chosen by an FNV-1a hash, and the vector is L2-normalised.
#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dimensions: usize,
}

impl HashEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }

    fn tokens(text: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        let mut word = String::new();
        for c in text.chars() {
            if is_cjk(c) {
                if !word.is_empty() {
                    tokens.push(std::mem::take(&mut word));
                }
                tokens.push(c.to_string());
            } else if c.is_alphanumeric() {
                word.extend(c.to_lowercase());
            } else if !word.is_empty() {
                tokens.push(std::mem::take(&mut word));
            }
        }
        if !word.is_empty() {
            tokens.push(word);
        }
        tokens
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self::new(256)
    }
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32, 0x3040..=0x30FF | 0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xAC00..=0xD7AF)
}

fn fnv1a(token: &str) -> u64 {
    token.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, b| (hash ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3))
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    fn name(&self) -> &str {
        "hash"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embedding = vec![0.0f32; self.dimensions];
        for token in Self::tokens(text) {
            let bucket = (fnv1a(&token) % self.dimensions as u64) as usize;
            embedding[bucket] += 1.0;
        }
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            embedding.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// A language model that replays queued replies.
///
/// When the queue is empty it answers `"Answer to: {prompt}"`.
///
/// # Example
///
/// ```rust,ignore
/// let model = ScriptedLanguageModel::new()
///     .reply("standalone question")
///     .fail(RagError::RateLimited { service: "test".into(), message: "slow down".into() });
/// ```
#[derive(Debug, Default)]
pub struct ScriptedLanguageModel {
    replies: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedLanguageModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply.
    pub fn reply(mut self, text: impl Into<String>) -> Self {
        self.replies.get_mut().push_back(Ok(text.into()));
        self
    }

    /// Queue a failure.
    pub fn fail(mut self, error: RagError) -> Self {
        self.replies.get_mut().push_back(Err(error));
        self
    }

    /// Every request received so far, in order.
    pub async fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedLanguageModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.requests.lock().await.push(request.clone());
        match self.replies.lock().await.pop_front() {
            Some(reply) => reply,
            None => Ok(format!("Answer to: {}", request.prompt)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::cosine_similarity;

    #[tokio::test]
    async fn shared_words_score_higher() {
        let provider = HashEmbeddingProvider::default();
        let query = provider.embed("tuition deadline").await.unwrap();
        let related = provider.embed("The tuition deadline is in March.").await.unwrap();
        let unrelated = provider.embed("The library opens at nine.").await.unwrap();
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[tokio::test]
    async fn embeddings_are_normalised_and_deterministic() {
        let provider = HashEmbeddingProvider::new(32);
        let a = provider.embed("義守大學 campus").await.unwrap();
        let b = provider.embed("義守大學 campus").await.unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn cjk_characters_are_separate_tokens() {
        assert_eq!(HashEmbeddingProvider::tokens("高雄Campus!"), vec!["高", "雄", "campus"]);
    }

    #[tokio::test]
    async fn scripted_model_replays_then_echoes() {
        let model = ScriptedLanguageModel::new().reply("first");
        let request = GenerationRequest { prompt: "q".into(), ..Default::default() };
        assert_eq!(model.generate(&request).await.unwrap(), "first");
        assert_eq!(model.generate(&request).await.unwrap(), "Answer to: q");
        assert_eq!(model.requests().await.len(), 2);
    }
}
