//! Fixed-window text chunker.
//!
//! Splits document text into overlapping windows of at most `max_chars`
//! characters. Boundaries are not sentence-aware; the overlap exists solely
//! to avoid losing context at hard cut points. Identical input always yields
//! an identical chunk sequence.

/// Default window size in characters.
pub const DEFAULT_MAX_CHARS: usize = 2400;
/// Default overlap between consecutive windows.
pub const DEFAULT_OVERLAP: usize = 400;

/// Split `text` into overlapping windows.
///
/// Whitespace runs are collapsed to single spaces and the text trimmed before
/// windowing; empty input yields an empty vec. Windows advance by
/// `max_chars - overlap` (minimum step of 1) and each window is `max_chars`
/// characters except the final one, which may be shorter. Generation stops as
/// soon as a window reaches the end of the text, so no trailing window is
/// fully contained in its predecessor.
pub fn chunk_text(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let collapsed = collapse_whitespace(text);
    if collapsed.is_empty() || max_chars == 0 {
        return Vec::new();
    }

    let chars: Vec<char> = collapsed.chars().collect();
    let step = max_chars.saturating_sub(overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + max_chars).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

/// Collapse all whitespace runs to single spaces and trim the ends.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = true; // leading whitespace is dropped
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}
