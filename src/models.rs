//! Core data models used throughout the tutor harness.
//!
//! These types represent the documents, chunks, and passages that flow
//! through the indexing and retrieval pipeline.

use serde::{Deserialize, Serialize};

/// A raw corpus document produced by the loader.
///
/// `source` is the stable file identity used in citations. Documents are
/// immutable once loaded and discarded after chunking, except by the keyword
/// fallback scorer which retains them verbatim for literal scans.
#[derive(Debug, Clone)]
pub struct Document {
    pub source: String,
    pub text: String,
}

/// A chunk of a document's text, the unit of vector indexing.
///
/// `id` is the chunk's offset in the persisted metadata array and must match
/// the vector's position in the index — it is the only valid cross-reference
/// between the two and is never reassigned after build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub id: usize,
    pub text: String,
    pub source: String,
}

/// A ranked passage returned from retrieval.
///
/// `score` is higher-is-better and comparable only within one result list —
/// vector and keyword scores are on different scales and are never mixed.
#[derive(Debug, Clone, Serialize)]
pub struct Passage {
    pub text: String,
    pub source: String,
    pub score: f32,
}
