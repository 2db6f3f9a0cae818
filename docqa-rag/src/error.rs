//! Error types for the `docqa-rag` crate.

use thiserror::Error;

/// Errors that can occur while building an index or answering a question.
#[derive(Debug, Error)]
pub enum RagError {
    /// Missing or rejected service credentials / endpoint. Not retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The source document could not be located.
    #[error("Source document not found: {path}")]
    SourceNotFound {
        /// The location that was requested.
        path: String,
    },

    /// The source document exists but could not be read or is not UTF-8 text.
    #[error("Source document unreadable: {path}: {message}")]
    SourceUnreadable {
        /// The location that was requested.
        path: String,
        /// A description of the failure.
        message: String,
    },

    /// The document has no pages, or every page is empty.
    #[error("Document is empty: no page contains any text")]
    EmptyDocument,

    /// No index exists at the storage path.
    #[error("No index found at '{path}'")]
    IndexNotFound {
        /// The storage path that was searched.
        path: String,
    },

    /// An index exists at the storage path but cannot be read back.
    #[error("Index at '{path}' is unreadable: {message}")]
    IndexCorrupt {
        /// The storage path of the index.
        path: String,
        /// A description of the failure.
        message: String,
    },

    /// The submitted question is empty or malformed.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// An upstream service could not be reached or failed.
    #[error("Service unavailable ({service}): {message}")]
    ServiceUnavailable {
        /// The service that failed.
        service: String,
        /// A description of the failure.
        message: String,
    },

    /// An upstream service rejected the call because of rate limiting.
    #[error("Rate limited ({service}): {message}")]
    RateLimited {
        /// The service that rejected the call.
        service: String,
        /// A description of the failure.
        message: String,
    },

    /// The language model answered without any usable text.
    #[error("Service '{service}' returned no usable text")]
    EmptyResponse {
        /// The service that produced the empty answer.
        service: String,
    },

    /// The embedding service returned output that does not match its input.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the output.
        provider: String,
        /// A description of the mismatch.
        message: String,
    },

    /// Writing an index to durable storage failed.
    #[error("Storage error at '{path}': {message}")]
    Storage {
        /// The storage path being written.
        path: String,
        /// A description of the failure.
        message: String,
    },
}

impl RagError {
    /// Whether this error means "there is no usable index", i.e. the caller
    /// should be told no answer is available rather than see a crash.
    pub fn is_index_unavailable(&self) -> bool {
        matches!(self, Self::IndexNotFound { .. } | Self::IndexCorrupt { .. })
    }

    /// Whether this is a transient upstream failure a caller may choose to retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ServiceUnavailable { .. } | Self::RateLimited { .. })
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
