//! Paragraph-boundary chunker for extracted document text.
//!
//! Text pulled out of PDFs is noisy: form feeds between pages, runs of
//! blank lines, and page headers/footers repeated on every page. The
//! chunker splits on blank lines, packs paragraphs into chunks of at most
//! `max_tokens × 4` characters, hard-splits oversized paragraphs at the
//! nearest newline or space, and drops chunks whose text repeats an earlier
//! chunk exactly.
//!
//! ```rust
//! use gtc_qa_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("§1 Scope.\n\n§2 Exclusions.", 700);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].index, 0);
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Approximate characters-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// A contiguous piece of a document's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position within the document, contiguous from 0.
    pub index: i64,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// Split text into chunks of at most `max_tokens` (approximate) each.
///
/// Returns an empty vector when the text has no non-whitespace content.
/// Indices are contiguous after duplicate removal.
pub fn chunk_text(text: &str, max_tokens: usize) -> Vec<Chunk> {
    let max_chars = (max_tokens * CHARS_PER_TOKEN).max(1);
    let mut pieces: Vec<String> = Vec::new();
    let mut buf = String::new();

    for para in paragraphs(text) {
        let would_be = if buf.is_empty() {
            para.len()
        } else {
            buf.len() + 2 + para.len()
        };

        if would_be > max_chars && !buf.is_empty() {
            pieces.push(std::mem::take(&mut buf));
        }

        if para.len() > max_chars {
            pieces.extend(hard_split(&para, max_chars));
        } else {
            if !buf.is_empty() {
                buf.push_str("\n\n");
            }
            buf.push_str(&para);
        }
    }
    if !buf.is_empty() {
        pieces.push(buf);
    }

    let mut seen = HashSet::new();
    pieces
        .into_iter()
        .filter_map(|text| {
            let hash = sha256_hex(&text);
            seen.insert(hash.clone()).then_some((text, hash))
        })
        .enumerate()
        .map(|(i, (text, hash))| Chunk {
            index: i as i64,
            text,
            hash,
        })
        .collect()
}

/// Paragraphs separated by blank (whitespace-only) lines, with form feeds
/// treated as paragraph breaks and surrounding whitespace trimmed.
fn paragraphs(text: &str) -> Vec<String> {
    let normalized = text.replace('\r', "").replace('\u{c}', "\n\n");
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in normalized.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                out.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line.trim_end());
        }
    }
    if !current.is_empty() {
        out.push(current.join("\n"));
    }

    out.into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Split an oversized paragraph at newline/space boundaries near `max_chars`.
fn hard_split(para: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut remaining = para;

    while !remaining.is_empty() {
        let mut split_at = snap_to_char_boundary(remaining, remaining.len().min(max_chars));
        if split_at < remaining.len() {
            split_at = remaining[..split_at]
                .rfind('\n')
                .or_else(|| remaining[..split_at].rfind(' '))
                .map(|pos| pos + 1)
                .unwrap_or(split_at);
        }
        if split_at == 0 {
            // A single char wider than the limit still has to make progress.
            split_at = remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len());
        }
        let piece = remaining[..split_at].trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        remaining = &remaining[split_at..];
    }
    out
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

pub(crate) fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
