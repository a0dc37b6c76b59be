//! Token-window text chunker.
//!
//! Splits document text into [`Chunk`]s of at most `chunk_size` tokens, as
//! measured by a [`TextTokenizer`]. Consecutive chunks of one document share
//! exactly `chunk_overlap` tokens: the next window starts `chunk_overlap`
//! tokens before the previous one ended.
//!
//! A window prefers to end on a paragraph break, then a line break, then the
//! end of a sentence, provided that break lies in the second half of the
//! window. Otherwise it is cut at the hard token limit.
//!
//! Each chunk receives a fresh UUID, a SHA-256 hash of its text for
//! deduplication, and a copy of its parent document's metadata.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{RagError, Result};
use crate::models::{Chunk, Document, DocumentMetadata};
use crate::tokenize::{Span, TextTokenizer};

/// A window of tokens `[start_token, end_token)` and the text it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct TextWindow {
    pub start_token: usize,
    pub end_token: usize,
    pub text: String,
}

/// Split every document and concatenate the chunks, preserving order.
pub fn chunk_documents(
    documents: &[Document],
    tokenizer: &dyn TextTokenizer,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    for doc in documents {
        chunks.extend(chunk_document(doc, tokenizer, chunk_size, chunk_overlap)?);
    }
    Ok(chunks)
}

/// Split one document. Blank documents yield no chunks.
pub fn chunk_document(
    document: &Document,
    tokenizer: &dyn TextTokenizer,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<Chunk>> {
    let windows = split_text(&document.content, tokenizer, chunk_size, chunk_overlap)?;
    Ok(windows
        .into_iter()
        .enumerate()
        .map(|(i, w)| make_chunk(&document.metadata, i as i64, &w.text))
        .collect())
}

/// Compute the token windows for `text`.
pub fn split_text(
    text: &str,
    tokenizer: &dyn TextTokenizer,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<TextWindow>> {
    if chunk_size == 0 {
        return Err(RagError::InvalidInput("chunk_size must be > 0".into()));
    }
    if chunk_overlap >= chunk_size {
        return Err(RagError::InvalidInput(format!(
            "chunk_overlap ({}) must be smaller than chunk_size ({})",
            chunk_overlap, chunk_size
        )));
    }

    let spans = tokenizer.token_spans(text)?;
    let n = spans.len();
    let mut windows = Vec::new();
    if n == 0 {
        return Ok(windows);
    }

    let mut start = 0;
    loop {
        let hard_end = (start + chunk_size).min(n);
        let end = if hard_end == n {
            n
        } else {
            preferred_end(text, &spans, start, hard_end, chunk_size, chunk_overlap)
        };

        windows.push(TextWindow {
            start_token: start,
            end_token: end,
            text: text[spans[start].0..spans[end - 1].1].to_string(),
        });

        if end == n {
            break;
        }
        start = end - chunk_overlap;
    }

    Ok(windows)
}

/// Pick the window end in `(start, hard_end]` with the strongest break.
///
/// Candidates must leave the window longer than `chunk_overlap` tokens so the
/// next window always advances.
fn preferred_end(
    text: &str,
    spans: &[Span],
    start: usize,
    hard_end: usize,
    chunk_size: usize,
    chunk_overlap: usize,
) -> usize {
    let min_end = (start + chunk_overlap + 1).max(start + chunk_size / 2);
    let mut best = (BreakStrength::None, hard_end);

    let mut end = hard_end;
    while end >= min_end && end > start {
        let strength = break_after(text, spans, end);
        if strength > best.0 {
            best = (strength, end);
            if strength == BreakStrength::Paragraph {
                break;
            }
        }
        end -= 1;
    }
    best.1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum BreakStrength {
    None,
    Sentence,
    Line,
    Paragraph,
}

/// Strength of the boundary between token `end - 1` and token `end`.
fn break_after(text: &str, spans: &[Span], end: usize) -> BreakStrength {
    let gap = &text[spans[end - 1].1..spans[end].0];
    if gap.matches('\n').count() >= 2 {
        BreakStrength::Paragraph
    } else if gap.contains('\n') {
        BreakStrength::Line
    } else if text[..spans[end - 1].1].ends_with(['.', '!', '?']) && !gap.is_empty() {
        BreakStrength::Sentence
    } else {
        BreakStrength::None
    }
}

fn make_chunk(metadata: &DocumentMetadata, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        chunk_index: index,
        content: text.to_string(),
        metadata: metadata.clone(),
        hash,
    }
}
