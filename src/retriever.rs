//! Hybrid retriever.
//!
//! Answers a query with at most `k` ranked passages, degrading through an
//! ordered list of strategies and never returning an error:
//!
//! 1. vector search over the composite query (`query + "\n\n" + boost`),
//! 2. vector search over the bare query,
//! 3. vector search over the bare boost (when one was supplied),
//! 4. keyword scoring of the composite query,
//! 5. keyword scoring of the bare query.
//!
//! The first strategy returning at least one result wins. Vector tiers are
//! skipped entirely when no index is loaded or the embedder is unavailable;
//! an embedding failure mid-query logs a warning and falls through. Scores
//! from different tiers are never mixed in one result list.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use crate::embedding::{embed_query, Embedder};
use crate::index::IndexStore;
use crate::loader::load_corpus;
use crate::models::{Document, Passage};

/// Keyword fallback has no sub-document chunk granularity; returned text is
/// clipped to this many characters of the source document.
const KEYWORD_SNIPPET_CHARS: usize = 2000;

pub struct Retriever {
    store: Arc<IndexStore>,
    embedder: Option<Arc<dyn Embedder>>,
    corpus_root: PathBuf,
    /// Raw documents retained verbatim for literal scans. Filled lazily on
    /// the first keyword-tier query, cleared by [`Retriever::invalidate_cache`].
    raw_docs: RwLock<Option<Arc<Vec<Document>>>>,
}

impl Retriever {
    pub fn new(
        store: Arc<IndexStore>,
        embedder: Option<Arc<dyn Embedder>>,
        corpus_root: PathBuf,
    ) -> Self {
        Self {
            store,
            embedder,
            corpus_root,
            raw_docs: RwLock::new(None),
        }
    }

    /// Retrieve up to `k` passages for `query`, optionally boosted with extra
    /// context. Ordered by descending score; empty when every tier is dry.
    pub async fn retrieve(&self, query: &str, k: usize, boost: Option<&str>) -> Vec<Passage> {
        if k == 0 || query.trim().is_empty() {
            return Vec::new();
        }

        let composite = match boost {
            Some(b) if !b.trim().is_empty() => format!("{}\n\n{}", query, b),
            _ => query.to_string(),
        };

        if let Some(embedder) = &self.embedder {
            if !self.store.is_empty().await {
                let mut attempts: Vec<&str> = vec![&composite];
                if composite != query {
                    attempts.push(query);
                }
                if let Some(b) = boost {
                    if !b.trim().is_empty() {
                        attempts.push(b);
                    }
                }

                for attempt in attempts {
                    match self.vector_search(embedder.as_ref(), attempt, k).await {
                        Ok(results) if !results.is_empty() => return results,
                        Ok(_) => {}
                        Err(e) => {
                            warn!(error = %e, "vector retrieval failed; falling back to keywords");
                            break;
                        }
                    }
                }
            }
        }

        let fallback = self.keyword_fallback(&composite, k).await;
        if !fallback.is_empty() {
            return fallback;
        }
        if composite != query {
            return self.keyword_fallback(query, k).await;
        }
        Vec::new()
    }

    async fn vector_search(
        &self,
        embedder: &dyn Embedder,
        query: &str,
        k: usize,
    ) -> anyhow::Result<Vec<Passage>> {
        let query_vec = embed_query(embedder, query).await?;
        Ok(self.store.search(&query_vec, k).await)
    }

    // ============ Keyword fallback ============

    /// Score every cached raw document by literal occurrence of the query.
    ///
    /// score = case-insensitive substring occurrences + 1.0 presence bonus.
    /// Zero-score documents are excluded; survivors are sorted descending and
    /// truncated to `k`.
    async fn keyword_fallback(&self, query: &str, k: usize) -> Vec<Passage> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        let docs = self.cached_docs().await;
        let mut scored: Vec<Passage> = docs
            .iter()
            .filter(|d| !d.text.is_empty())
            .filter_map(|d| {
                let haystack = d.text.to_lowercase();
                let occurrences = count_occurrences(&haystack, &needle);
                if occurrences == 0 {
                    return None;
                }
                Some(Passage {
                    text: clip_chars(&d.text, KEYWORD_SNIPPET_CHARS),
                    source: d.source.clone(),
                    score: occurrences as f32 + 1.0,
                })
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }

    async fn cached_docs(&self) -> Arc<Vec<Document>> {
        {
            let guard = self.raw_docs.read().await;
            if let Some(docs) = guard.as_ref() {
                return Arc::clone(docs);
            }
        }

        let mut guard = self.raw_docs.write().await;
        // Another request may have filled the cache while we waited.
        if let Some(docs) = guard.as_ref() {
            return Arc::clone(docs);
        }
        let docs = Arc::new(load_corpus(&self.corpus_root).unwrap_or_else(|e| {
            warn!(error = %e, "failed to load corpus for keyword fallback");
            Vec::new()
        }));
        *guard = Some(Arc::clone(&docs));
        docs
    }

    /// Drop the raw-document cache so the next keyword query rescans the
    /// corpus. Called after a reindex.
    pub async fn invalidate_cache(&self) {
        let mut guard = self.raw_docs.write().await;
        *guard = None;
    }
}

/// Non-overlapping occurrences of `needle` in `haystack`.
fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    let mut count = 0;
    let mut rest = haystack;
    while let Some(pos) = rest.find(needle) {
        count += 1;
        rest = &rest[pos + needle.len()..];
    }
    count
}

/// First `max_chars` characters of `text`, char-boundary safe.
fn clip_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}
