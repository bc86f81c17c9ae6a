//! Fixed-window text chunker.
//!
//! Splits document text into [`Chunk`]s of at most `max_chars` characters,
//! with consecutive chunks overlapping by `overlap_chars` characters so
//! context survives the split boundary. Splitting is deterministic: the
//! same document always yields the same chunk sequence, which is what makes
//! re-indexing idempotent.
//!
//! Chunk identifiers are derived from the document path and ordinal, never
//! generated randomly, so re-upserting a chunk overwrites its prior record.

use sha2::{Digest, Sha256};

use crate::models::{Chunk, Document, SourceKind};

/// Split a document into overlapping fixed-size chunks.
///
/// Windows are measured in characters and always cut on char boundaries.
/// A document shorter than the window yields exactly one chunk equal to
/// the full text; every document yields at least one chunk.
pub fn chunk_document(doc: &Document, max_chars: usize, overlap_chars: usize) -> Vec<Chunk> {
    chunk_text(&doc.path, doc.kind, &doc.text, max_chars, overlap_chars)
}

/// See [`chunk_document`]. Exposed for direct use in the update pipeline.
///
/// Out-of-range budgets are clamped rather than rejected: the window is at
/// least one character and the overlap strictly smaller than the window,
/// so chunking always terminates. Configuration validation rejects such
/// values up front; clamping covers direct library callers.
pub fn chunk_text(
    document_path: &str,
    kind: SourceKind,
    text: &str,
    max_chars: usize,
    overlap_chars: usize,
) -> Vec<Chunk> {
    let max_chars = max_chars.max(1);
    let overlap_chars = overlap_chars.min(max_chars - 1);

    // Byte offset of every char boundary, so windows never split a
    // multibyte character.
    let offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let total = offsets.len();

    // Degenerate case: window covers the whole document (including empty).
    if total <= max_chars {
        return vec![make_chunk(document_path, kind, 0, text)];
    }

    let step = max_chars - overlap_chars;
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index: i64 = 0;

    while start < total {
        let end = (start + max_chars).min(total);
        let byte_start = offsets[start];
        let byte_end = if end == total { text.len() } else { offsets[end] };
        chunks.push(make_chunk(
            document_path,
            kind,
            index,
            &text[byte_start..byte_end],
        ));
        index += 1;
        if end == total {
            break;
        }
        start += step;
    }

    chunks
}

fn make_chunk(document_path: &str, kind: SourceKind, index: i64, text: &str) -> Chunk {
    Chunk {
        id: chunk_id(document_path, index),
        document_path: document_path.to_string(),
        kind,
        index,
        text: text.to_string(),
    }
}

/// Stable chunk identifier: 16 hex chars of the document path hash plus
/// the chunk ordinal.
pub fn chunk_id(document_path: &str, index: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_path.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{}-{}", &digest[..16], index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_single_chunk() {
        let chunks = chunk_text("docs/a.txt", SourceKind::PlainText, "Hello, world!", 500, 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn empty_text_yields_one_chunk() {
        let chunks = chunk_text("docs/a.txt", SourceKind::PlainText, "", 500, 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "");
    }

    #[test]
    fn windows_respect_max_and_overlap() {
        let text: String = ('a'..='z').cycle().take(250).collect();
        let chunks = chunk_text("docs/a.txt", SourceKind::PlainText, &text, 100, 20);

        for c in &chunks {
            assert!(c.text.chars().count() <= 100);
        }
        // Consecutive windows share exactly the overlap (step = 80)
        for pair in chunks.windows(2) {
            let head: String = pair[0].text.chars().skip(80).collect();
            let tail: String = pair[1].text.chars().take(20).collect();
            assert_eq!(head, tail);
        }
        // Indices contiguous from 0
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i as i64);
        }
    }

    #[test]
    fn full_text_is_covered() {
        let text: String = ('a'..='z').cycle().take(1234).collect();
        let chunks = chunk_text("docs/a.txt", SourceKind::PlainText, &text, 100, 20);
        // Reassemble by dropping each chunk's 20-char overlap prefix
        let mut rebuilt = chunks[0].text.clone();
        for c in &chunks[1..] {
            rebuilt.extend(c.text.chars().skip(20));
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn deterministic_across_runs() {
        let text = "Alpha beta gamma delta epsilon zeta eta theta.".repeat(40);
        let a = chunk_text("docs/a.txt", SourceKind::PlainText, &text, 120, 30);
        let b = chunk_text("docs/a.txt", SourceKind::PlainText, &text, 120, 30);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.id, y.id);
            assert_eq!(x.text, y.text);
            assert_eq!(x.index, y.index);
        }
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text = "héllø wörld — ünïcode ".repeat(30);
        let chunks = chunk_text("docs/u.txt", SourceKind::PlainText, &text, 50, 10);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.chars().count() <= 50);
        }
    }

    #[test]
    fn oversized_overlap_is_clamped_not_panicking() {
        let text: String = ('a'..='z').cycle().take(40).collect();
        let chunks = chunk_text("docs/a.txt", SourceKind::PlainText, &text, 10, 10);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.chars().count() <= 10);
        }
        // Clamped overlap still advances the window and covers the text
        let mut rebuilt = chunks[0].text.clone();
        for c in &chunks[1..] {
            rebuilt.extend(c.text.chars().skip(9));
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn zero_window_is_clamped_not_panicking() {
        let chunks = chunk_text("docs/a.txt", SourceKind::PlainText, "abc", 0, 0);
        assert_eq!(chunks.len(), 3);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i as i64);
            assert_eq!(c.text.chars().count(), 1);
        }
    }

    #[test]
    fn chunks_inherit_document_kind() {
        let chunks = chunk_text("notes/b.md", SourceKind::Markdown, "# heading", 500, 100);
        assert_eq!(chunks[0].kind, SourceKind::Markdown);
    }

    #[test]
    fn ids_are_stable_and_distinct_per_document() {
        assert_eq!(chunk_id("docs/a.txt", 0), chunk_id("docs/a.txt", 0));
        assert_ne!(chunk_id("docs/a.txt", 0), chunk_id("docs/a.txt", 1));
        assert_ne!(chunk_id("docs/a.txt", 0), chunk_id("docs/b.txt", 0));
    }
}
