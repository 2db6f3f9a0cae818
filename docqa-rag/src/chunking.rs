//! Document chunking.
//!
//! This module provides the [`Chunker`] trait and [`RecursiveChunker`], which
//! cuts each page into overlapping passages no longer than a character budget,
//! preferring to cut at the highest-priority separator available.

use tracing::debug;

use crate::config::RagConfig;
use crate::document::{CharSpan, Document, Passage};
use crate::error::{RagError, Result};

/// Separators in priority order: paragraph and line breaks, sentence-ending
/// punctuation (CJK and Latin), clause punctuation, then whitespace.
pub const DEFAULT_SEPARATORS: &[&str] = &[
    "\n\n", "\n", "。", "？", "?", "！", "!", ". ", "：", ":", "；", ";", "，", ",", "、", " ",
];

/// A strategy for splitting documents into passages.
///
/// Implementations produce [`Passage`]s with text and provenance but no
/// embeddings. Embeddings are attached later by the indexer.
pub trait Chunker: Send + Sync {
    /// Split a document into passages, page by page, in reading order.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmptyDocument`] if the document has no pages or
    /// every page is blank.
    fn chunk(&self, document: &Document) -> Result<Vec<Passage>>;
}

/// Splits pages into passages of at most `max_chars` characters, cutting at
/// the highest-priority separator that falls inside the budget.
///
/// Lower-priority separators are only used when no higher-priority boundary
/// exists within the budget; a window with no separator at all is cut at
/// exactly `max_chars`. Each passage after the first on a page starts about
/// `overlap_chars` before the previous passage ends, snapped forward to the
/// nearest separator boundary inside that overlap window.
///
/// Lengths and offsets are counted in characters, not bytes.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(1500, 200);
/// let passages = chunker.chunk(&document)?;
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    max_chars: usize,
    overlap_chars: usize,
    separators: Vec<Vec<char>>,
}

impl RecursiveChunker {
    /// Create a chunker with [`DEFAULT_SEPARATORS`].
    ///
    /// # Arguments
    ///
    /// * `max_chars` — maximum number of characters per passage
    /// * `overlap_chars` — characters shared between consecutive passages of a page
    pub fn new(max_chars: usize, overlap_chars: usize) -> Self {
        Self {
            max_chars,
            overlap_chars,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.chars().collect()).collect(),
        }
    }

    /// Create a chunker from the chunking section of a [`RagConfig`].
    pub fn from_config(config: &RagConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
            .with_separators(config.separators.iter().map(String::as_str))
    }

    /// Replace the separator list. Earlier entries take priority; empty
    /// strings are ignored.
    pub fn with_separators<'a>(mut self, separators: impl IntoIterator<Item = &'a str>) -> Self {
        self.separators = separators
            .into_iter()
            .filter(|s| !s.is_empty())
            .map(|s| s.chars().collect())
            .collect();
        self
    }

    /// Compute passage spans for one page of text.
    pub fn split_spans(&self, chars: &[char]) -> Vec<CharSpan> {
        let len = chars.len();
        let mut spans = Vec::new();
        if len == 0 {
            return spans;
        }

        let max = self.max_chars.max(1);
        let overlap = self.overlap_chars.min(max - 1);
        let mut start = 0;

        loop {
            if len - start <= max {
                spans.push(CharSpan { start, end: len });
                break;
            }

            let limit = start + max;
            // Cutting past start + overlap guarantees the next start moves forward.
            let end = self.find_split(chars, start, start + overlap + 1, limit).unwrap_or(limit);
            spans.push(CharSpan { start, end });
            start = self.overlap_start(chars, end, overlap);
        }

        spans
    }

    /// Find the last boundary in `[lo, hi]` for the highest-priority separator
    /// that has one. A boundary is the position right after a separator that
    /// lies entirely inside the current window.
    fn find_split(&self, chars: &[char], window_start: usize, lo: usize, hi: usize) -> Option<usize> {
        self.separators.iter().find_map(|sep| {
            (lo..=hi).rev().find(|&b| b >= window_start + sep.len() && ends_with(chars, b, sep))
        })
    }

    /// Start of the passage following one that ends at `end`: the earliest
    /// separator boundary within `overlap` characters of `end`, or exactly
    /// `end - overlap` when the window has none.
    fn overlap_start(&self, chars: &[char], end: usize, overlap: usize) -> usize {
        if overlap == 0 {
            return end;
        }
        let earliest = end - overlap;
        (earliest..end)
            .find(|&p| self.separators.iter().any(|sep| ends_with(chars, p, sep)))
            .unwrap_or(earliest)
    }
}

/// True if `chars[..pos]` ends with `sep`.
fn ends_with(chars: &[char], pos: usize, sep: &[char]) -> bool {
    pos >= sep.len() && pos <= chars.len() && chars[pos - sep.len()..pos] == *sep
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Result<Vec<Passage>> {
        if document.is_blank() {
            return Err(RagError::EmptyDocument);
        }

        let mut passages = Vec::new();
        for page in &document.pages {
            if page.text.trim().is_empty() {
                continue;
            }

            let chars: Vec<char> = page.text.chars().collect();
            let spans = self.split_spans(&chars);
            debug!(document.id = %document.id, page = page.number, passage_count = spans.len(), "chunked page");

            for (chunk_index, span) in spans.into_iter().enumerate() {
                passages.push(Passage {
                    id: format!("{}_p{}_{chunk_index}", document.id, page.number),
                    document_id: document.id.clone(),
                    text: chars[span.start..span.end].iter().collect(),
                    source_page: page.number,
                    char_span: span,
                });
            }
        }

        Ok(passages)
    }
}
