//! Source-file chunker.
//!
//! Splits file text into [`Chunk`]s no larger than `max_tokens` (estimated
//! at four characters per token). Blank-line separated blocks are packed
//! together while they fit; a block that is too large on its own is split
//! on line boundaries, and a single overlong line is cut at a UTF-8 char
//! boundary.
//!
//! Each chunk carries a SHA-256 hash of its text.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

const CHARS_PER_TOKEN: usize = 4;

/// Split `text` into chunks with contiguous indices starting at 0.
/// Whitespace-only input yields no chunks.
pub fn chunk_text(filename: &str, text: &str, max_tokens: usize) -> Vec<Chunk> {
    let max_chars = max_tokens.max(1) * CHARS_PER_TOKEN;
    let mut pieces: Vec<String> = Vec::new();
    let mut buf = String::new();

    for block in text.split("\n\n") {
        let block = block.trim_matches('\n').trim_end();
        if block.trim().is_empty() {
            continue;
        }

        if block.len() > max_chars {
            if !buf.is_empty() {
                pieces.push(std::mem::take(&mut buf));
            }
            pieces.extend(split_block(block, max_chars));
            continue;
        }

        let would_be = if buf.is_empty() {
            block.len()
        } else {
            buf.len() + 2 + block.len()
        };
        if would_be > max_chars && !buf.is_empty() {
            pieces.push(std::mem::take(&mut buf));
        }
        if !buf.is_empty() {
            buf.push_str("\n\n");
        }
        buf.push_str(block);
    }

    if !buf.is_empty() {
        pieces.push(buf);
    }

    pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| make_chunk(filename, i as i64, piece))
        .collect()
}

/// Split an oversized block on newlines, hard-cutting lines that alone
/// exceed `max_chars`.
fn split_block(block: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut buf = String::new();

    for line in block.lines() {
        let mut line = line;
        while line.len() > max_chars {
            if !buf.is_empty() {
                out.push(std::mem::take(&mut buf));
            }
            let cut = floor_char_boundary(line, max_chars);
            out.push(line[..cut].to_string());
            line = &line[cut..];
        }

        let would_be = if buf.is_empty() {
            line.len()
        } else {
            buf.len() + 1 + line.len()
        };
        if would_be > max_chars && !buf.is_empty() {
            out.push(std::mem::take(&mut buf));
        }
        if !buf.is_empty() {
            buf.push('\n');
        }
        buf.push_str(line);
    }

    if !buf.trim().is_empty() {
        out.push(buf);
    }
    out.retain(|p| !p.trim().is_empty());
    out
}

/// Largest char boundary `<= max`, but always at least one char so callers
/// make progress.
fn floor_char_boundary(s: &str, max: usize) -> usize {
    let mut i = max.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    if i == 0 {
        i = s.chars().next().map(|c| c.len_utf8()).unwrap_or(s.len());
    }
    i
}

pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn make_chunk(filename: &str, index: i64, text: String) -> Chunk {
    Chunk {
        id: Uuid::new_v4().to_string(),
        filename: filename.to_string(),
        chunk_index: index,
        hash: content_hash(&text),
        text,
    }
}
