//! Retrieval chunk preparation.
//!
//! Filtered markdown is cut into overlapping chunks for a downstream
//! embedding index. Splitting is recursive over a separator ladder tuned for
//! Japanese prose (paragraph, line, 。, 、, space, character): text is split on
//! the coarsest separator it contains, small pieces are merged back up to the
//! chunk size, and pieces still too long are split again with the finer
//! separators. Each separator stays attached to the start of the piece that
//! follows it. Lengths are counted in characters.
//!
//! Every chunk is then stripped of markdown syntax and prefixed with its file
//! stem so the source document survives embedding.

use crate::config::ChunkConfig;
use crate::error::PrepError;
use crate::pipeline::input;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use tracing::debug;

/// Separators tried in order, coarsest first. `""` splits into characters.
pub const SEPARATORS: [&str; 6] = ["\n\n", "\n", "。", "、", " ", ""];

static RE_CODE_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[\s\S]*?```").unwrap());
static RE_INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]*)`").unwrap());
static RE_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\([^\)]+\)").unwrap());
static RE_BOLD_STARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.*?)\*\*").unwrap());
static RE_BOLD_UNDERSCORES: Lazy<Regex> = Lazy::new(|| Regex::new(r"__(.*?)__").unwrap());
static RE_ITALIC_STAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*(.*?)\*").unwrap());
static RE_ITALIC_UNDERSCORE: Lazy<Regex> = Lazy::new(|| Regex::new(r"_(.*?)_").unwrap());
static RE_HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*#{1,6}\s*").unwrap());
static RE_PAGE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[Pp]\.?\s*\d+\b").unwrap());
static RE_MULTI_NEWLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());
static RE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r" +").unwrap());

/// One prepared chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// File stem of the source document.
    pub source: String,
    /// Position among the source's chunks, 0-based.
    pub index: usize,
    /// `"<source>\n\n<cleaned chunk>"`.
    pub text: String,
}

/// Strip markdown syntax and page numbers from chunk text.
pub fn clean_chunk_text(text: &str) -> String {
    let s = RE_CODE_BLOCK.replace_all(text, "");
    let s = RE_INLINE_CODE.replace_all(&s, "$1");
    let s = RE_LINK.replace_all(&s, "$1");
    let s = RE_BOLD_STARS.replace_all(&s, "$1");
    let s = RE_BOLD_UNDERSCORES.replace_all(&s, "$1");
    let s = RE_ITALIC_STAR.replace_all(&s, "$1");
    let s = RE_ITALIC_UNDERSCORE.replace_all(&s, "$1");
    let s = RE_HEADER.replace_all(&s, "");
    let s = RE_PAGE_NUMBER.replace_all(&s, "");
    let s = RE_MULTI_NEWLINE.replace_all(&s, "\n\n");
    let s = RE_SPACES.replace_all(&s, " ");
    s.trim().to_string()
}

/// Split `text` into chunks of at most `config.chunk_size` characters.
///
/// A single piece that cannot be split further (one character) is the only
/// way a chunk may exceed the size.
pub fn split_text(text: &str, config: &ChunkConfig) -> Vec<String> {
    Splitter {
        size: config.chunk_size,
        overlap: config.chunk_overlap,
    }
    .split(text, &SEPARATORS)
}

/// Split, clean and label the chunks of one document.
///
/// Chunks that clean down to nothing are dropped.
pub fn prepare_chunks(path: &Path, text: &str, config: &ChunkConfig) -> Vec<Chunk> {
    let source = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let chunks: Vec<Chunk> = split_text(text, config)
        .iter()
        .map(|raw| clean_chunk_text(raw))
        .filter(|cleaned| !cleaned.is_empty())
        .enumerate()
        .map(|(index, cleaned)| Chunk {
            text: format!("{source}\n\n{cleaned}"),
            source: source.clone(),
            index,
        })
        .collect();

    debug!("Prepared {} chunks from {}", chunks.len(), path.display());
    chunks
}

/// Read a markdown file and [`prepare_chunks`] from it.
pub async fn prepare_chunks_from_file(
    path: &Path,
    config: &ChunkConfig,
) -> Result<Vec<Chunk>, PrepError> {
    let text = input::read_text(path).await?;
    Ok(prepare_chunks(path, &text, config))
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

struct Splitter {
    size: usize,
    overlap: usize,
}

impl Splitter {
    fn split(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let (separator, finer) = pick_separator(text, separators);
        let mut chunks = Vec::new();
        let mut small: Vec<&str> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.size {
                small.push(piece);
                continue;
            }
            if !small.is_empty() {
                chunks.extend(self.merge(&small));
                small.clear();
            }
            if finer.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split(piece, finer));
            }
        }
        if !small.is_empty() {
            chunks.extend(self.merge(&small));
        }
        chunks
    }

    /// Greedily pack pieces into chunks, carrying up to `overlap` characters
    /// of trailing pieces into the next chunk.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.size && !window.is_empty() {
                push_joined(&mut chunks, &window);
                while total > self.overlap || (total > 0 && total + len > self.size) {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }
            window.push_back(piece);
            total += len;
        }
        push_joined(&mut chunks, &window);
        chunks
    }
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<&str>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// The first separator present in `text`, and the finer ones after it.
fn pick_separator<'a, 's>(text: &str, separators: &'a [&'s str]) -> (&'s str, &'a [&'s str]) {
    for (i, &sep) in separators.iter().enumerate() {
        if sep.is_empty() {
            return (sep, &[]);
        }
        if text.contains(sep) {
            return (sep, &separators[i + 1..]);
        }
    }
    (separators.last().copied().unwrap_or(""), &[])
}

/// Split before every occurrence of `separator`. Empty pieces are dropped;
/// an empty separator yields single characters.
fn split_keeping_separator<'t>(text: &'t str, separator: &str) -> Vec<&'t str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }
    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}
