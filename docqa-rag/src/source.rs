//! Document sources: where the ordered pages of a document come from.

use std::io::ErrorKind;
use std::path::Path;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::document::{Document, Page};
use crate::error::{RagError, Result};

/// Page separator emitted by PDF-to-text converters.
pub const PAGE_BREAK: char = '\x0c';

/// A loader that turns a source location into a [`Document`].
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Load the document stored at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::SourceNotFound`] if nothing exists at `path` and
    /// [`RagError::SourceUnreadable`] if it exists but cannot be read.
    async fn load(&self, path: &Path) -> Result<Document>;
}

/// Reads a UTF-8 text export of a document, one page per form-feed separated
/// block. A file without form feeds is a single page.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextFileSource;

impl TextFileSource {
    pub fn new() -> Self {
        Self
    }

    /// Split raw text into numbered pages.
    ///
    /// A trailing form feed does not produce an extra empty page.
    pub fn parse_pages(text: &str) -> Vec<Page> {
        let body = text.strip_suffix(PAGE_BREAK).unwrap_or(text);
        if body.is_empty() {
            return Vec::new();
        }
        body.split(PAGE_BREAK)
            .enumerate()
            .map(|(i, page)| Page { number: i as u32 + 1, text: page.to_string() })
            .collect()
    }
}

#[async_trait]
impl DocumentSource for TextFileSource {
    async fn load(&self, path: &Path) -> Result<Document> {
        let not_found = || RagError::SourceNotFound { path: path.display().to_string() };
        let unreadable = |message: String| {
            warn!(path = %path.display(), error = %message, "failed to read source document");
            RagError::SourceUnreadable { path: path.display().to_string(), message }
        };
        let io_error = |e: std::io::Error| match e.kind() {
            ErrorKind::NotFound => not_found(),
            _ => unreadable(e.to_string()),
        };

        let metadata = tokio::fs::metadata(path).await.map_err(io_error)?;
        if !metadata.is_file() {
            return Err(not_found());
        }

        let bytes = tokio::fs::read(path).await.map_err(io_error)?;
        let text = String::from_utf8(bytes).map_err(|e| unreadable(format!("not valid UTF-8: {}", e.utf8_error())))?;
        let pages = Self::parse_pages(&text);

        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());

        info!(path = %path.display(), page_count = pages.len(), "loaded source document");
        Ok(Document { id, pages, source_uri: Some(path.display().to_string()) })
    }
}
