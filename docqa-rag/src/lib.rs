//! # docqa-rag
//!
//! Retrieval-augmented question answering over a single document.
//!
//! ## Overview
//!
//! The crate has two pipelines:
//!
//! - **Ingestion**: [`RecursiveChunker`] cuts each page into overlapping
//!   passages, an [`EmbeddingProvider`] embeds them, and [`Indexer`] publishes
//!   the resulting [`VectorIndex`] under a storage path.
//! - **Query**: [`Retriever`] loads the index and selects passages under a
//!   [`RetrievalPolicy`] (similarity threshold or MMR), and [`QaOrchestrator`]
//!   grounds a [`LanguageModel`] on them while carrying a bounded
//!   [`ConversationHistory`] from one question to the next.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use docqa_rag::openai::{OpenAIChatModel, OpenAIEmbeddingProvider};
//! use docqa_rag::*;
//!
//! let embedder: Arc<dyn EmbeddingProvider> = Arc::new(OpenAIEmbeddingProvider::from_env()?);
//! let store = Arc::new(IndexStore::new());
//!
//! let indexer = Indexer::builder()
//!     .embedding_provider(embedder.clone())
//!     .store(store.clone())
//!     .build()?;
//! indexer.build_from_source(&TextFileSource::new(), "handbook.txt".as_ref(), "faiss_index".as_ref()).await?;
//!
//! let qa = QaOrchestrator::builder()
//!     .retriever(Retriever::new(embedder, store))
//!     .language_model(Arc::new(OpenAIChatModel::from_env()?))
//!     .storage_path("faiss_index")
//!     .build()?;
//! let response = qa.ask("When is the tuition deadline?", &ConversationHistory::new()).await?;
//! println!("{}", response.answer_or_default());
//! ```
//!
//! ## Features
//!
//! - `openai` (default): [`openai::OpenAIEmbeddingProvider`] and
//!   [`openai::OpenAIChatModel`].

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod history;
pub mod index;
pub mod indexer;
pub mod llm;
pub mod mock;
pub mod qa;
pub mod retriever;
pub mod source;

#[cfg(feature = "openai")]
pub mod openai;

pub use chunking::{Chunker, DEFAULT_SEPARATORS, RecursiveChunker};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{CharSpan, Document, IndexSummary, Page, Passage, ScoredPassage};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use history::{ConversationHistory, ConversationTurn, DEFAULT_MAX_TURNS};
pub use index::{INDEX_FILE_NAME, IndexEntry, IndexStore, VectorIndex};
pub use indexer::{Indexer, IndexerBuilder};
pub use llm::{GenerationRequest, LanguageModel};
pub use mock::{HashEmbeddingProvider, ScriptedLanguageModel};
pub use qa::{NO_ANSWER, QaOrchestrator, QaOrchestratorBuilder, QaResponse, QaState, QaStatus};
pub use retriever::{RetrievalPolicy, Retriever};
pub use source::{DocumentSource, PAGE_BREAK, TextFileSource};
