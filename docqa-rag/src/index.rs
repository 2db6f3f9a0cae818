//! Persisted vector index.
//!
//! A [`VectorIndex`] owns every passage/vector pair it was built from and is
//! never mutated after construction. [`IndexStore`] publishes indexes to a
//! storage directory and loads them back, handing out `Arc` snapshots so that
//! readers keep a consistent view while a rebuild replaces the file.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};

use crate::document::Passage;
use crate::error::{RagError, Result};

/// Name of the index file inside a storage directory.
pub const INDEX_FILE_NAME: &str = "index.json";

const FORMAT_VERSION: u32 = 1;

/// A passage and its embedding vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    pub passage: Passage,
    pub embedding: Vec<f32>,
}

/// An immutable collection of passages searchable by vector similarity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorIndex {
    format_version: u32,
    dimensions: usize,
    passage_count: usize,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Pair passages with their embeddings, in order.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Embedding`] if the counts differ or the vectors do
    /// not all share one non-zero dimensionality.
    pub fn new(passages: Vec<Passage>, embeddings: Vec<Vec<f32>>) -> Result<Self> {
        if passages.len() != embeddings.len() {
            return Err(RagError::Embedding {
                provider: "index".into(),
                message: format!(
                    "{} passages but {} embeddings",
                    passages.len(),
                    embeddings.len()
                ),
            });
        }

        let dimensions = embeddings.first().map_or(0, Vec::len);
        if let Some(bad) = embeddings.iter().position(|e| e.len() != dimensions || e.is_empty()) {
            return Err(RagError::Embedding {
                provider: "index".into(),
                message: format!(
                    "embedding {bad} has {} dimensions, expected {dimensions}",
                    embeddings[bad].len()
                ),
            });
        }

        let entries: Vec<IndexEntry> = passages
            .into_iter()
            .zip(embeddings)
            .map(|(passage, embedding)| IndexEntry { passage, embedding })
            .collect();

        Ok(Self { format_version: FORMAT_VERSION, dimensions, passage_count: entries.len(), entries })
    }

    /// Number of passages (equal to the number of vectors).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dimensionality of every vector in the index.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Score every entry against `query` and return the `k` best as
    /// `(entry position, cosine similarity)`.
    ///
    /// Ordered by descending similarity; equal scores keep insertion order.
    pub fn nearest(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, cosine_similarity(&entry.embedding, query)))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(k);
        scored
    }

    /// Check the invariants a freshly deserialized index must satisfy.
    fn check_integrity(&self) -> std::result::Result<(), String> {
        if self.format_version != FORMAT_VERSION {
            return Err(format!("unsupported format version {}", self.format_version));
        }
        if self.passage_count != self.entries.len() {
            return Err(format!(
                "header says {} passages but {} are stored",
                self.passage_count,
                self.entries.len()
            ));
        }
        if let Some(entry) = self.entries.iter().find(|e| e.embedding.len() != self.dimensions) {
            return Err(format!(
                "passage '{}' has a {}-dimensional vector, expected {}",
                entry.passage.id,
                entry.embedding.len(),
                self.dimensions
            ));
        }
        Ok(())
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Identity of an index file on disk, used to revalidate cached indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl From<&std::fs::Metadata> for FileStamp {
    fn from(meta: &std::fs::Metadata) -> Self {
        Self { modified: meta.modified().ok(), len: meta.len() }
    }
}

#[derive(Debug)]
struct CachedIndex {
    stamp: FileStamp,
    index: Arc<VectorIndex>,
}

/// Publishes and loads [`VectorIndex`]es under storage directories.
///
/// Share one store (behind an `Arc`) between the indexer and the retrievers
/// of a process. Loaded indexes are cached per storage path and revalidated
/// against the file's metadata on every load. Builds for the same path are
/// serialised with [`IndexStore::lock_for_build`].
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::IndexStore;
///
/// let store = IndexStore::new();
/// store.publish(Path::new("faiss_index"), index).await?;
/// let snapshot = store.load(Path::new("faiss_index")).await?;
/// ```
#[derive(Debug, Default)]
pub struct IndexStore {
    cache: RwLock<HashMap<PathBuf, CachedIndex>>,
    build_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl IndexStore {
    /// Create a store with an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Location of the index file for a storage directory.
    pub fn index_file(storage_path: &Path) -> PathBuf {
        storage_path.join(INDEX_FILE_NAME)
    }

    /// Acquire the build lock for `storage_path`. Held by the indexer for the
    /// whole chunk → embed → publish sequence.
    ///
    /// Locks that no build holds or waits on are dropped from the map.
    pub async fn lock_for_build(&self, storage_path: &Path) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.build_locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(storage_path.to_path_buf()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Load the index published under `storage_path`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexNotFound`] if no index file exists and
    /// [`RagError::IndexCorrupt`] if it cannot be read or decoded.
    pub async fn load(&self, storage_path: &Path) -> Result<Arc<VectorIndex>> {
        let file = Self::index_file(storage_path);
        let path_str = || storage_path.display().to_string();

        let meta = match tokio::fs::metadata(&file).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(RagError::IndexNotFound { path: path_str() }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RagError::IndexNotFound { path: path_str() });
            }
            Err(e) => {
                return Err(RagError::IndexCorrupt { path: path_str(), message: e.to_string() });
            }
        };
        let stamp = FileStamp::from(&meta);

        if let Some(cached) = self.cache.read().await.get(storage_path) {
            if cached.stamp == stamp {
                debug!(storage_path = %storage_path.display(), "index cache hit");
                return Ok(Arc::clone(&cached.index));
            }
        }

        let bytes = tokio::fs::read(&file).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => RagError::IndexNotFound { path: path_str() },
            _ => RagError::IndexCorrupt { path: path_str(), message: e.to_string() },
        })?;

        let index: VectorIndex = serde_json::from_slice(&bytes).map_err(|e| {
            warn!(storage_path = %storage_path.display(), error = %e, "index file does not decode");
            RagError::IndexCorrupt { path: path_str(), message: e.to_string() }
        })?;
        index.check_integrity().map_err(|message| {
            warn!(storage_path = %storage_path.display(), %message, "index failed integrity check");
            RagError::IndexCorrupt { path: path_str(), message }
        })?;

        let index = Arc::new(index);
        self.cache
            .write()
            .await
            .insert(storage_path.to_path_buf(), CachedIndex { stamp, index: Arc::clone(&index) });

        info!(
            storage_path = %storage_path.display(),
            passage_count = index.len(),
            "loaded index"
        );
        Ok(index)
    }

    /// Write `index` under `storage_path`, replacing any previous index.
    ///
    /// The index is written to a temporary file in the same directory and
    /// renamed over the index file, so readers observe either the old index or
    /// the new one. A failure leaves the previous index untouched.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Storage`] if the directory or file cannot be written.
    pub async fn publish(&self, storage_path: &Path, index: VectorIndex) -> Result<Arc<VectorIndex>> {
        let storage_err = |message: String| RagError::Storage {
            path: storage_path.display().to_string(),
            message,
        };

        tokio::fs::create_dir_all(storage_path)
            .await
            .map_err(|e| storage_err(format!("cannot create directory: {e}")))?;

        let bytes =
            serde_json::to_vec(&index).map_err(|e| storage_err(format!("cannot encode index: {e}")))?;

        let dir = storage_path.to_path_buf();
        let target = Self::index_file(storage_path);
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| storage_err(format!("publish task failed: {e}")))?
        .map_err(|e| storage_err(e.to_string()))?;

        let meta = tokio::fs::metadata(Self::index_file(storage_path))
            .await
            .map_err(|e| storage_err(e.to_string()))?;

        let index = Arc::new(index);
        self.cache.write().await.insert(
            storage_path.to_path_buf(),
            CachedIndex { stamp: FileStamp::from(&meta), index: Arc::clone(&index) },
        );

        info!(
            storage_path = %storage_path.display(),
            passage_count = index.len(),
            dimensions = index.dimensions(),
            "published index"
        );
        Ok(index)
    }
}
