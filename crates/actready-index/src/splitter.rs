//! Recursive character splitter.
//!
//! Splits on the coarsest separator present (`"\n\n"`, then `"\n"`, then
//! `" "`, then individual characters), merges the pieces back into chunks of
//! at most `chunk_size` characters, and carries up to `overlap` characters of
//! trailing context into the next chunk. Separators stay attached to the
//! start of the piece that follows them. Chunks are whitespace-trimmed.

use std::collections::VecDeque;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Split `text` into overlapping chunks of at most `chunk_size` characters.
///
/// `chunk_size` is clamped to at least 1 and `overlap` to below `chunk_size`.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let overlap = overlap.min(chunk_size - 1);
    recursive_split(text, &SEPARATORS, chunk_size, overlap)
        .into_iter()
        .filter(|c| !c.trim().is_empty())
        .collect()
}

fn recursive_split(text: &str, separators: &[&str], chunk_size: usize, overlap: usize) -> Vec<String> {
    let idx = separators
        .iter()
        .position(|s| s.is_empty() || text.contains(s))
        .unwrap_or(separators.len().saturating_sub(1));
    let separator = separators.get(idx).copied().unwrap_or("");
    let finer = separators.get(idx + 1..).unwrap_or(&[]);

    let mut chunks = Vec::new();
    let mut pending: Vec<String> = Vec::new();

    for piece in split_keeping_separator(text, separator) {
        if char_len(&piece) < chunk_size {
            pending.push(piece);
            continue;
        }
        if !pending.is_empty() {
            chunks.extend(merge_pieces(&pending, chunk_size, overlap));
            pending.clear();
        }
        if finer.is_empty() {
            chunks.push(piece);
        } else {
            chunks.extend(recursive_split(&piece, finer, chunk_size, overlap));
        }
    }

    if !pending.is_empty() {
        chunks.extend(merge_pieces(&pending, chunk_size, overlap));
    }
    chunks
}

/// Split on `separator`, prefixing every piece after the first with it.
/// An empty separator splits into single characters.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }
    let mut pieces = Vec::new();
    for (i, part) in text.split(separator).enumerate() {
        let piece = if i == 0 {
            part.to_string()
        } else {
            format!("{separator}{part}")
        };
        if !piece.is_empty() {
            pieces.push(piece);
        }
    }
    pieces
}

/// Greedily pack small pieces into chunks with a sliding overlap window.
fn merge_pieces(pieces: &[String], chunk_size: usize, overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut window: VecDeque<&str> = VecDeque::new();
    let mut total = 0;

    for piece in pieces {
        let len = char_len(piece);
        if total + len > chunk_size && !window.is_empty() {
            push_joined(&window, &mut chunks);
            while total > overlap || (total > 0 && total + len > chunk_size) {
                match window.pop_front() {
                    Some(front) => total -= char_len(front),
                    None => break,
                }
            }
        }
        window.push_back(piece);
        total += len;
    }

    push_joined(&window, &mut chunks);
    chunks
}

fn push_joined(window: &VecDeque<&str>, chunks: &mut Vec<String>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
