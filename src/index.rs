//! Vector index store.
//!
//! Owns the persisted similarity index and its parallel chunk-metadata list.
//! The pair is the single source of truth for chunk identity: a chunk's `id`
//! is its offset in the metadata array, and vector `i` in the index embeds
//! chunk `i`. On load the store verifies that both artifacts agree in count;
//! a mismatched or unparsable pair is treated as corrupt and rebuilt, never
//! surfaced to callers.
//!
//! Artifacts, stored side by side in the index directory:
//! - `index.bin` — `TIDX` magic, format version, dims, count, then the
//!   unit-normalized vectors as little-endian f32s;
//! - `chunks.json` — a JSON array of `{id, text, source}` ordered by `id`.
//!
//! Both are written to a temp file and renamed into place, so a half-written
//! artifact is never picked up by a later load.
//!
//! Concurrency: the loaded index lives behind one `RwLock` and is replaced as
//! a unit (replace-by-swap) — searches never observe a partially updated
//! index. Rebuilds are serialized by a dedicated mutex.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::chunk::chunk_text;
use crate::config::ChunkingConfig;
use crate::embedding::{blob_to_vec, dot, vec_to_blob, Embedder};
use crate::loader::load_corpus;
use crate::models::{ChunkMeta, Passage};

const INDEX_FILE: &str = "index.bin";
const META_FILE: &str = "chunks.json";

const INDEX_MAGIC: &[u8; 4] = b"TIDX";
const INDEX_VERSION: u32 = 1;

/// The in-memory index: vectors and metadata with matching cardinality.
struct LoadedIndex {
    dims: usize,
    /// Row-major `count * dims` floats; row `i` embeds `chunks[i]`.
    vectors: Vec<f32>,
    chunks: Vec<ChunkMeta>,
}

impl LoadedIndex {
    fn count(&self) -> usize {
        self.chunks.len()
    }

    fn row(&self, i: usize) -> &[f32] {
        &self.vectors[i * self.dims..(i + 1) * self.dims]
    }
}

/// Snapshot of the store's state, served by the status endpoint.
#[derive(Debug, serde::Serialize)]
pub struct IndexStatus {
    pub embedding_enabled: bool,
    pub index_file_exists: bool,
    pub meta_file_exists: bool,
    pub chunk_count: usize,
}

/// The index store service: build, persist, reload, search.
///
/// One instance is shared process-wide; handlers hold it through an `Arc`.
pub struct IndexStore {
    corpus_root: PathBuf,
    index_dir: PathBuf,
    chunking: ChunkingConfig,
    embedder: Option<Arc<dyn Embedder>>,
    inner: RwLock<Option<Arc<LoadedIndex>>>,
    rebuild_guard: Mutex<()>,
}

impl IndexStore {
    pub fn new(
        corpus_root: PathBuf,
        index_dir: PathBuf,
        chunking: ChunkingConfig,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Self {
        Self {
            corpus_root,
            index_dir,
            chunking,
            embedder,
            inner: RwLock::new(None),
            rebuild_guard: Mutex::new(()),
        }
    }

    fn index_path(&self) -> PathBuf {
        self.index_dir.join(INDEX_FILE)
    }

    fn meta_path(&self) -> PathBuf {
        self.index_dir.join(META_FILE)
    }

    /// Load the persisted pair if valid, otherwise build from the corpus.
    ///
    /// Called once at startup. With no embedder configured this is a no-op:
    /// the store stays empty and retrieval degrades to keyword scoring.
    pub async fn open(&self) -> Result<()> {
        if self.embedder.is_none() {
            info!("embedding disabled; vector index not loaded");
            return Ok(());
        }

        let loaded = match self.try_load() {
            Ok(Some(idx)) => {
                info!(chunks = idx.count(), "loaded vector index from disk");
                idx
            }
            Ok(None) => self.build().await?,
            Err(e) => {
                warn!(error = %e, "failed to load existing index; rebuilding");
                self.build().await?
            }
        };

        let mut guard = self.inner.write().await;
        *guard = Some(Arc::new(loaded));
        Ok(())
    }

    /// Delete both artifacts and rebuild unconditionally, then swap the new
    /// index in. This is the only supported way to pick up corpus changes.
    pub async fn reindex(&self) -> Result<usize> {
        let _serialized = self.rebuild_guard.lock().await;

        if self.embedder.is_none() {
            bail!("Cannot reindex: embedding provider is disabled");
        }

        for path in [self.index_path(), self.meta_path()] {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!(file = %path.display(), error = %e, "failed to delete index artifact");
                }
            }
        }

        let rebuilt = self.build().await?;
        let count = rebuilt.count();

        let mut guard = self.inner.write().await;
        *guard = Some(Arc::new(rebuilt));
        info!(chunks = count, "reindex complete");
        Ok(count)
    }

    /// Nearest chunks to `query_vec` by inner product, descending, top `k`.
    ///
    /// Returns an empty vec when the index is absent or empty.
    pub async fn search(&self, query_vec: &[f32], k: usize) -> Vec<Passage> {
        let index = {
            let guard = self.inner.read().await;
            match guard.as_ref() {
                Some(idx) => Arc::clone(idx),
                None => return Vec::new(),
            }
        };

        if index.count() == 0 || k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = (0..index.count())
            .map(|i| (i, dot(query_vec, index.row(i))))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(i, score)| {
                let chunk = &index.chunks[i];
                Passage {
                    text: chunk.text.clone(),
                    source: chunk.source.clone(),
                    score,
                }
            })
            .collect()
    }

    pub async fn is_empty(&self) -> bool {
        let guard = self.inner.read().await;
        guard.as_ref().map(|idx| idx.count() == 0).unwrap_or(true)
    }

    pub async fn chunk_count(&self) -> usize {
        let guard = self.inner.read().await;
        guard.as_ref().map(|idx| idx.count()).unwrap_or(0)
    }

    pub async fn status(&self) -> IndexStatus {
        IndexStatus {
            embedding_enabled: self.embedder.is_some(),
            index_file_exists: self.index_path().exists(),
            meta_file_exists: self.meta_path().exists(),
            chunk_count: self.chunk_count().await,
        }
    }

    // ============ Load path ============

    /// Read the persisted pair. `Ok(None)` when either artifact is missing;
    /// `Err` when one is present but unparsable or the pair disagrees in
    /// count — the caller treats both as "rebuild".
    fn try_load(&self) -> Result<Option<LoadedIndex>> {
        let index_path = self.index_path();
        let meta_path = self.meta_path();
        if !index_path.exists() || !meta_path.exists() {
            return Ok(None);
        }

        let blob = std::fs::read(&index_path)
            .with_context(|| format!("Failed to read {}", index_path.display()))?;
        let (dims, count, vectors) = decode_index_blob(&blob)?;

        let meta_text = std::fs::read_to_string(&meta_path)
            .with_context(|| format!("Failed to read {}", meta_path.display()))?;
        let chunks: Vec<ChunkMeta> =
            serde_json::from_str(&meta_text).context("Failed to parse chunk metadata")?;

        if chunks.len() != count {
            bail!(
                "Index artifacts disagree: {} vectors vs {} metadata entries",
                count,
                chunks.len()
            );
        }
        for (i, chunk) in chunks.iter().enumerate() {
            if chunk.id != i {
                bail!("Chunk metadata out of order at position {}", i);
            }
        }

        Ok(Some(LoadedIndex {
            dims,
            vectors,
            chunks,
        }))
    }

    // ============ Build path ============

    /// Chunk the corpus, embed every chunk in one batch, persist the pair.
    ///
    /// A corpus yielding zero chunks produces an empty index (not an error)
    /// and nothing is persisted.
    async fn build(&self) -> Result<LoadedIndex> {
        let embedder = self
            .embedder
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("No embedding provider configured"))?;

        let docs = load_corpus(&self.corpus_root)?;
        let mut chunks: Vec<ChunkMeta> = Vec::new();
        for doc in &docs {
            for piece in chunk_text(&doc.text, self.chunking.max_chars, self.chunking.overlap) {
                chunks.push(ChunkMeta {
                    id: chunks.len(),
                    text: piece,
                    source: doc.source.clone(),
                });
            }
        }

        if chunks.is_empty() {
            info!("corpus produced no chunks; index is empty");
            return Ok(LoadedIndex {
                dims: embedder.dims(),
                vectors: Vec::new(),
                chunks,
            });
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        info!(
            documents = docs.len(),
            chunks = chunks.len(),
            model = embedder.model_name(),
            "embedding corpus chunks"
        );
        let vecs = embedder.embed(&texts).await?;
        if vecs.len() != chunks.len() {
            bail!(
                "Embedder returned {} vectors for {} chunks",
                vecs.len(),
                chunks.len()
            );
        }
        let dims = vecs.first().map(|v| v.len()).unwrap_or(embedder.dims());

        let mut vectors = Vec::with_capacity(chunks.len() * dims);
        for v in &vecs {
            if v.len() != dims {
                bail!("Embedder returned vectors of mixed dimensionality");
            }
            vectors.extend_from_slice(v);
        }

        let loaded = LoadedIndex {
            dims,
            vectors,
            chunks,
        };
        self.persist(&loaded)?;
        Ok(loaded)
    }

    fn persist(&self, index: &LoadedIndex) -> Result<()> {
        std::fs::create_dir_all(&self.index_dir)?;

        let meta_json = serde_json::to_string(&index.chunks)?;
        write_atomic(&self.meta_path(), meta_json.as_bytes())?;

        let blob = encode_index_blob(index.dims, &index.vectors);
        write_atomic(&self.index_path(), &blob)?;

        info!(
            chunks = index.count(),
            dir = %self.index_dir.display(),
            "persisted index artifacts"
        );
        Ok(())
    }
}

/// Write via a temp file in the same directory, then rename into place.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} into place", tmp.display()))?;
    Ok(())
}

fn encode_index_blob(dims: usize, vectors: &[f32]) -> Vec<u8> {
    let count = if dims == 0 { 0 } else { vectors.len() / dims };
    let mut out = Vec::with_capacity(16 + vectors.len() * 4);
    out.extend_from_slice(INDEX_MAGIC);
    out.extend_from_slice(&INDEX_VERSION.to_le_bytes());
    out.extend_from_slice(&(dims as u32).to_le_bytes());
    out.extend_from_slice(&(count as u32).to_le_bytes());
    out.extend_from_slice(&vec_to_blob(vectors));
    out
}

fn decode_index_blob(blob: &[u8]) -> Result<(usize, usize, Vec<f32>)> {
    if blob.len() < 16 || &blob[0..4] != INDEX_MAGIC {
        bail!("Not a vector index file");
    }
    let version = u32::from_le_bytes([blob[4], blob[5], blob[6], blob[7]]);
    if version != INDEX_VERSION {
        bail!("Unsupported index version: {}", version);
    }
    let dims = u32::from_le_bytes([blob[8], blob[9], blob[10], blob[11]]) as usize;
    let count = u32::from_le_bytes([blob[12], blob[13], blob[14], blob[15]]) as usize;

    let data = &blob[16..];
    if data.len() != dims * count * 4 {
        bail!(
            "Index data length {} does not match {} x {} vectors",
            data.len(),
            count,
            dims
        );
    }
    Ok((dims, count, blob_to_vec(data)))
}
