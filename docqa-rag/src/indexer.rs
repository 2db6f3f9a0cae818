//! Index construction: chunk → embed → publish.
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::{Indexer, RagConfig};
//!
//! let indexer = Indexer::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(OpenAIEmbeddingProvider::from_env()?))
//!     .build()?;
//!
//! let summary = indexer.build_index(&document, Path::new("faiss_index")).await?;
//! println!("{} passages", summary.passage_count);
//! ```

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info};

use crate::chunking::{Chunker, RecursiveChunker};
use crate::config::RagConfig;
use crate::document::{Document, IndexSummary};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::{IndexStore, VectorIndex};
use crate::source::DocumentSource;

/// Builds a vector index from a document and publishes it under a storage path.
///
/// Rebuilding always replaces the index at that path; nothing is published
/// unless every step succeeds. Construct one via [`Indexer::builder()`].
pub struct Indexer {
    embedding_provider: Arc<dyn EmbeddingProvider>,
    chunker: Arc<dyn Chunker>,
    store: Arc<IndexStore>,
    embed_batch_size: usize,
}

impl Indexer {
    /// Create a new [`IndexerBuilder`].
    pub fn builder() -> IndexerBuilder {
        IndexerBuilder::default()
    }

    /// Return the store indexes are published to.
    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    /// Chunk `document`, embed every passage, and publish the index under
    /// `storage_path`.
    ///
    /// Concurrent builds of the same path run one after another. Readers of
    /// that path see the previous index until the new one is published.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmptyDocument`] if the document has no text
    /// - any error from the embedding provider (`Configuration`,
    ///   `ServiceUnavailable`, `RateLimited`, ...)
    /// - [`RagError::Embedding`] if the provider returns the wrong number or
    ///   shape of vectors
    /// - [`RagError::Storage`] if the index cannot be written
    pub async fn build_index(&self, document: &Document, storage_path: &Path) -> Result<IndexSummary> {
        let _build = self.store.lock_for_build(storage_path).await;

        // 1. Chunk the document
        let passages = self.chunker.chunk(document)?;

        // 2. Embed in batches, preserving order
        let texts: Vec<&str> = passages.iter().map(|p| p.text.as_str()).collect();
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.embed_batch_size) {
            let vectors = self.embedding_provider.embed_batch(batch).await.map_err(|e| {
                error!(document.id = %document.id, error = %e, "embedding failed during indexing");
                e
            })?;
            if vectors.len() != batch.len() {
                return Err(RagError::Embedding {
                    provider: self.embedding_provider.name().to_string(),
                    message: format!("sent {} texts, received {} vectors", batch.len(), vectors.len()),
                });
            }
            embeddings.extend(vectors);
        }

        // 3. Build the index in one pass
        let index = VectorIndex::new(passages, embeddings)?;
        let passage_count = index.len();

        // 4. Publish atomically
        self.store.publish(storage_path, index).await?;

        info!(
            document.id = %document.id,
            passage_count,
            storage_path = %storage_path.display(),
            "built index"
        );
        Ok(IndexSummary { passage_count, storage_path: storage_path.to_path_buf() })
    }

    /// Load the document at `document_path` from `source`, then
    /// [`build_index`](Self::build_index).
    ///
    /// # Errors
    ///
    /// Returns [`RagError::SourceNotFound`] if the document cannot be located
    /// and [`RagError::SourceUnreadable`] if it cannot be read as UTF-8 text,
    /// plus everything [`build_index`](Self::build_index) can return.
    pub async fn build_from_source(
        &self,
        source: &dyn DocumentSource,
        document_path: &Path,
        storage_path: &Path,
    ) -> Result<IndexSummary> {
        let document = source.load(document_path).await?;
        self.build_index(&document, storage_path).await
    }
}

/// Builder for constructing an [`Indexer`].
///
/// Only the embedding provider is required. The chunker defaults to a
/// [`RecursiveChunker`] configured from the [`RagConfig`], and the store to a
/// fresh [`IndexStore`].
#[derive(Default)]
pub struct IndexerBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    chunker: Option<Arc<dyn Chunker>>,
    store: Option<Arc<IndexStore>>,
}

impl IndexerBuilder {
    /// Set the configuration (chunking parameters and batch size).
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Override the chunker derived from the configuration.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Share an existing index store, e.g. with a [`Retriever`](crate::Retriever).
    pub fn store(mut self, store: Arc<IndexStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the [`Indexer`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Configuration`] if no embedding provider is set or
    /// the configuration is invalid.
    pub fn build(self) -> Result<Indexer> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::Configuration("embedding_provider is required".to_string()))?;
        let chunker = self
            .chunker
            .unwrap_or_else(|| Arc::new(RecursiveChunker::from_config(&config)));

        Ok(Indexer {
            embedding_provider,
            chunker,
            store: self.store.unwrap_or_default(),
            embed_batch_size: config.embed_batch_size,
        })
    }
}
