//! Corpus loader.
//!
//! Scans a corpus root recursively and reads every supported file into a
//! [`Document`]. Dispatch is by lowercase extension: `.txt` and
//! `.md`/`.markdown` are read as (lossy) UTF-8 text, `.pdf` goes through a
//! two-stage extractor chain. No other file types are considered.
//!
//! A single file's read failure is never fatal — the file is skipped with a
//! warning and the rest of the corpus loads normally.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::models::Document;

/// Directories excluded from every corpus scan.
const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/.DS_Store"];

/// Load every supported document under `root`, in deterministic (sorted) order.
///
/// A missing root yields an empty corpus rather than an error; the retrieval
/// tiers degrade from there.
pub fn load_corpus(root: &Path) -> Result<Vec<Document>> {
    let mut docs = Vec::new();
    if !root.exists() {
        warn!(root = %root.display(), "corpus root does not exist; loading empty corpus");
        return Ok(docs);
    }

    let exclude_set = build_globset(DEFAULT_EXCLUDES)?;

    let mut paths: Vec<_> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    paths.sort();

    for path in paths {
        let relative = path.strip_prefix(root).unwrap_or(&path);
        if exclude_set.is_match(relative) {
            continue;
        }

        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let text = match ext.as_str() {
            "txt" | "md" | "markdown" => read_text(&path),
            "pdf" => Some(read_pdf(&path)),
            _ => continue,
        };

        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        match text {
            Some(text) => docs.push(Document { source, text }),
            None => {
                warn!(file = %path.display(), "skipping unreadable file");
            }
        }
    }

    debug!(count = docs.len(), "corpus loaded");
    Ok(docs)
}

/// Read a plain-text or markdown file, tolerating invalid UTF-8.
fn read_text(path: &Path) -> Option<String> {
    match std::fs::read(path) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => {
            warn!(file = %path.display(), error = %e, "failed to read text file");
            None
        }
    }
}

/// Extract text from a PDF through a two-stage fallback chain.
///
/// The primary extractor is tried first; if it errors or returns only
/// whitespace, the secondary extractor is tried. If both fail the document
/// contributes empty text (and therefore zero chunks) — never an error.
fn read_pdf(path: &Path) -> String {
    type PdfExtractor = fn(&Path) -> Result<String>;
    let extractors: &[(&str, PdfExtractor)] = &[
        ("pdf-extract", extract_pdf_primary),
        ("lopdf", extract_pdf_secondary),
    ];

    for (name, extract) in extractors {
        match extract(path) {
            Ok(text) if !text.trim().is_empty() => return text,
            Ok(_) => {
                debug!(file = %path.display(), extractor = name, "extractor returned empty text");
            }
            Err(e) => {
                warn!(file = %path.display(), extractor = name, error = %e, "PDF extraction failed");
            }
        }
    }
    String::new()
}

fn extract_pdf_primary(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    pdf_extract::extract_text_from_mem(&bytes).map_err(|e| anyhow::anyhow!(e.to_string()))
}

fn extract_pdf_secondary(path: &Path) -> Result<String> {
    let doc = lopdf::Document::load(path).map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    doc.extract_text(&pages)
        .map_err(|e| anyhow::anyhow!(e.to_string()))
}

fn build_globset(patterns: &[&str]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
