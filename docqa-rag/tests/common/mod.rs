//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use docqa_rag::{
    ConversationHistory, Document, EmbeddingProvider, HashEmbeddingProvider, IndexStore, Indexer,
    LanguageModel, QaOrchestrator, RagConfig, RagError, Result, Retriever,
};
use tokio::sync::Mutex;

pub const DIM: usize = 1024;

/// The two-page handbook used by the end-to-end scenarios.
pub fn handbook() -> Document {
    Document::from_pages(
        "handbook",
        [
            "Page1 text. The university library opens at eight in the morning and closes at ten at night.",
            "Page2 text. The tuition payment deadline for the spring semester is March fifteenth.",
        ],
    )
}

pub fn hash_embedder() -> Arc<dyn EmbeddingProvider> {
    Arc::new(HashEmbeddingProvider::new(DIM))
}

pub async fn build(document: &Document, path: &Path, store: Arc<IndexStore>) -> usize {
    let indexer = Indexer::builder()
        .embedding_provider(hash_embedder())
        .store(store)
        .build()
        .unwrap();
    indexer.build_index(document, path).await.unwrap().passage_count
}

pub fn orchestrator(
    store: Arc<IndexStore>,
    path: &Path,
    model: Arc<dyn LanguageModel>,
    config: RagConfig,
) -> QaOrchestrator {
    QaOrchestrator::builder()
        .config(config)
        .retriever(Retriever::new(hash_embedder(), store))
        .language_model(model)
        .storage_path(path)
        .build()
        .unwrap()
}

pub fn empty_history() -> ConversationHistory {
    ConversationHistory::new()
}

/// An embedding service that is always down.
pub struct UnreachableEmbedder;

#[async_trait]
impl EmbeddingProvider for UnreachableEmbedder {
    fn name(&self) -> &str {
        "unreachable"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::ServiceUnavailable {
            service: "unreachable".into(),
            message: "connection refused".into(),
        })
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

/// Wraps the hash embedder and records the size of every batch call.
#[derive(Default)]
pub struct RecordingEmbedder {
    pub batches: Mutex<Vec<usize>>,
    pub single_calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for RecordingEmbedder {
    fn name(&self) -> &str {
        "recording"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        HashEmbeddingProvider::new(DIM).embed(text).await
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.batches.lock().await.push(texts.len());
        let inner = HashEmbeddingProvider::new(DIM);
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(inner.embed(text).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

/// Drops the last vector of every batch.
pub struct ShortBatchEmbedder;

#[async_trait]
impl EmbeddingProvider for ShortBatchEmbedder {
    fn name(&self) -> &str {
        "short"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        HashEmbeddingProvider::new(DIM).embed(text).await
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::new();
        for text in texts.iter().skip(1) {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

/// Hash embeddings that record how many batch calls overlap in time.
#[derive(Default)]
pub struct ConcurrencyTrackingEmbedder {
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for ConcurrencyTrackingEmbedder {
    fn name(&self) -> &str {
        "tracking"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        HashEmbeddingProvider::new(DIM).embed(text).await
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}
