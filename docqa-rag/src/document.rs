//! Data types for documents, passages, and search results.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A single page of plain text, as produced by the document parser.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number within the source document.
    pub number: u32,
    /// The plain text of the page.
    pub text: String,
}

/// A source document: an ordered sequence of pages. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    /// Identifier for the document, used to derive passage IDs.
    pub id: String,
    /// Pages in reading order.
    pub pages: Vec<Page>,
    /// Optional URI pointing to the original source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
}

impl Document {
    /// Create a document from page texts, numbering pages from 1.
    pub fn from_pages<I, S>(id: impl Into<String>, pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pages = pages
            .into_iter()
            .enumerate()
            .map(|(i, text)| Page { number: i as u32 + 1, text: text.into() })
            .collect();
        Self { id: id.into(), pages, source_uri: None }
    }

    /// True if there are no pages or every page is blank.
    pub fn is_blank(&self) -> bool {
        self.pages.iter().all(|p| p.text.trim().is_empty())
    }
}

/// Character offsets `[start, end)` of a passage within its page.
///
/// Offsets count Unicode scalar values, not bytes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CharSpan {
    pub start: usize,
    pub end: usize,
}

impl CharSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// A contiguous substring of one page: the unit of embedding and retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Passage {
    /// `{document_id}_p{page}_{chunk_index}`.
    pub id: String,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// The passage text, exactly the page characters covered by `char_span`.
    pub text: String,
    /// Page number the passage was cut from.
    pub source_page: u32,
    /// Position of the passage within its page.
    pub char_span: CharSpan,
}

/// A retrieved [`Passage`] paired with its similarity to the query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredPassage {
    pub passage: Passage,
    /// Cosine similarity to the query vector (higher is more relevant).
    pub score: f32,
}

/// What [`Indexer::build_index`](crate::indexer::Indexer::build_index) reports back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexSummary {
    /// Number of passages (and vectors) in the published index.
    pub passage_count: usize,
    /// Where the index was published.
    pub storage_path: PathBuf,
}
