//! Recursive character text splitter.
//!
//! Splits page text into [`Chunk`]s of at most `chunk_size` characters,
//! preferring paragraph boundaries, then lines, then words, and only as a
//! last resort individual characters. Consecutive chunks share up to
//! `chunk_overlap` characters so sentences cut at a boundary still appear
//! whole in one of the neighbors.
//!
//! Lengths are counted in Unicode scalar values, never bytes.
//!
//! Each chunk gets a deterministic ID derived from its source, page, index,
//! and text, so re-uploading identical content overwrites the same vectors.

use std::collections::VecDeque;

use sha2::{Digest, Sha256};

use crate::models::{Chunk, Document};

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone, Copy)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    /// `chunk_overlap` is clamped below `chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    /// Split one page, stamping its source and page on each chunk.
    pub fn split_document(&self, doc: &Document) -> Vec<Chunk> {
        self.split_text(&doc.text)
            .into_iter()
            .enumerate()
            .map(|(i, text)| make_chunk(doc, i as i64, text))
            .collect()
    }

    /// Split raw text into trimmed, non-empty pieces.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // First separator present in the text; "" always matches.
        let idx = separators
            .iter()
            .position(|s| s.is_empty() || text.contains(s))
            .unwrap_or(separators.len() - 1);
        let separator = separators[idx];
        let rest = &separators[idx + 1..];

        let splits: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect()
        } else {
            text.split(separator).filter(|s| !s.is_empty()).collect()
        };

        let mut out = Vec::new();
        let mut good: Vec<&str> = Vec::new();
        for piece in splits {
            if char_len(piece) <= self.chunk_size {
                good.push(piece);
                continue;
            }
            if !good.is_empty() {
                out.extend(self.merge(&good, separator));
                good.clear();
            }
            if rest.is_empty() {
                out.push(piece.to_string());
            } else {
                out.extend(self.split_recursive(piece, rest));
            }
        }
        if !good.is_empty() {
            out.extend(self.merge(&good, separator));
        }
        out
    }

    fn merge(&self, splits: &[&str], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in splits {
            let len = char_len(piece);
            let joined_sep = if current.is_empty() { 0 } else { sep_len };

            if total + len + joined_sep > self.chunk_size && !current.is_empty() {
                push_joined(&mut docs, &current, separator);
                // Drop from the front until the carried tail fits the overlap
                // and leaves room for the incoming piece.
                loop {
                    let with_piece = total + len + if current.is_empty() { 0 } else { sep_len };
                    if total <= self.chunk_overlap && (total == 0 || with_piece <= self.chunk_size)
                    {
                        break;
                    }
                    let Some(first) = current.pop_front() else {
                        break;
                    };
                    let dropped_sep = if current.is_empty() { 0 } else { sep_len };
                    total = total.saturating_sub(char_len(first) + dropped_sep);
                }
            }

            current.push_back(piece);
            total += len + if current.len() > 1 { sep_len } else { 0 };
        }

        push_joined(&mut docs, &current, separator);
        docs
    }
}

fn push_joined(docs: &mut Vec<String>, current: &VecDeque<&str>, separator: &str) {
    let joined = current.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn make_chunk(doc: &Document, index: i64, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let mut id_hasher = Sha256::new();
    id_hasher.update(doc.source.as_bytes());
    id_hasher.update(doc.page.to_le_bytes());
    id_hasher.update(index.to_le_bytes());
    id_hasher.update(hash.as_bytes());
    let id = format!("{:x}", id_hasher.finalize())[..32].to_string();

    Chunk {
        id,
        source: doc.source.clone(),
        page: doc.page,
        chunk_index: index,
        text,
        hash,
    }
}
