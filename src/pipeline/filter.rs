//! Markdown section filtering.
//!
//! A one-pass, line-oriented filter over a markdown document:
//!
//! 1. Lines carrying a page marker (`P.` followed by digits, anywhere in the
//!    line) are dropped.
//! 2. Every other line is cleaned: runs of spaces collapse to one, links
//!    `[text](url)` become `text`, surrounding whitespace is trimmed.
//! 3. A header (`#` after leading whitespace) whose text contains a banned
//!    header keyword drops itself and its whole section, up to the next header
//!    that is not itself banned. That next header is then judged like any
//!    other line.
//! 4. Remaining lines containing a banned line word are dropped.
//!
//! The output is written with the input's own line-ending convention and ends
//! with exactly one line ending.

use crate::config::FilterRules;
use crate::error::PrepError;
use crate::pipeline::{encode, input};
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Files filtered at once by [`filter_markdown_dir`].
const DIR_CONCURRENCY: usize = 8;

static RE_PAGE_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"P\.\d+").unwrap());
static RE_MULTI_NEWLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());
static RE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r" +").unwrap());
static RE_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\([^\)]+\)").unwrap());

/// A line-ending convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineEnding {
    CrLf,
    Cr,
    Lf,
}

impl LineEnding {
    /// The convention used by `text`: CRLF if it occurs anywhere, else CR,
    /// else LF. `None` when the text has no line break at all.
    pub fn detect(text: &str) -> Option<Self> {
        if text.contains("\r\n") {
            Some(LineEnding::CrLf)
        } else if text.contains('\r') {
            Some(LineEnding::Cr)
        } else if text.contains('\n') {
            Some(LineEnding::Lf)
        } else {
            None
        }
    }

    /// [`detect`](Self::detect), falling back to the platform convention.
    pub fn detect_or_default(text: &str) -> Self {
        Self::detect(text).unwrap_or_else(Self::platform_default)
    }

    pub fn platform_default() -> Self {
        if cfg!(windows) {
            LineEnding::CrLf
        } else {
            LineEnding::Lf
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::CrLf => "\r\n",
            LineEnding::Cr => "\r",
            LineEnding::Lf => "\n",
        }
    }
}

/// Whether `c` ends a line on its own. `\r\n` is handled by the caller.
fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r'
            | '\u{0b}' // vertical tab
            | '\u{0c}' // form feed
            | '\u{1c}'..='\u{1e}' // file, group, record separators
            | '\u{85}' // next line
            | '\u{2028}' // line separator
            | '\u{2029}' // paragraph separator
    )
}

/// Split `text` into lines without their terminators.
///
/// `\r\n` ends a line, and so does any single `\r`, `\n`, vertical tab,
/// form feed, `\x1c`–`\x1e`, NEL, U+2028 or U+2029. Form feeds are common
/// between pages of extracted PDF text. A terminator at the very end does
/// not start another line, so `"a\n"` is `["a"]` and `""` is `[]`.
pub fn split_lines(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if !is_line_break(c) {
            continue;
        }
        lines.push(&text[start..i]);
        let mut end = i + c.len_utf8();
        if c == '\r' {
            if let Some(&(_, '\n')) = chars.peek() {
                chars.next();
                end += 1;
            }
        }
        start = end;
    }
    if start < text.len() {
        lines.push(&text[start..]);
    }
    lines
}

/// Line counts of one filter pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterStats {
    pub lines_in: usize,
    pub lines_out: usize,
}

/// Where the scan is relative to excluded sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterState {
    Scanning,
    InExcludedSection,
}

fn clean_line(line: &str) -> String {
    let line = RE_MULTI_NEWLINE.replace_all(line, "\n\n");
    let line = RE_SPACES.replace_all(&line, " ");
    let line = RE_LINK.replace_all(&line, "$1");
    line.trim().to_string()
}

fn contains_any(line: &str, needles: &[String]) -> bool {
    needles.iter().any(|n| line.contains(n.as_str()))
}

/// Filter a markdown document.
pub fn filter_markdown(text: &str, rules: &FilterRules) -> String {
    filter_markdown_with_stats(text, rules).0
}

/// [`filter_markdown`], also reporting how many lines went in and came out.
pub fn filter_markdown_with_stats(text: &str, rules: &FilterRules) -> (String, FilterStats) {
    let ending = LineEnding::detect_or_default(text);
    let lines = split_lines(text);
    let mut kept: Vec<String> = Vec::with_capacity(lines.len());
    let mut state = FilterState::Scanning;

    for raw in &lines {
        if RE_PAGE_MARKER.is_match(raw) {
            continue;
        }
        let line = clean_line(raw);
        let is_header = line.trim_start().starts_with('#');

        if is_header && contains_any(&line, &rules.banned_header_keywords) {
            state = FilterState::InExcludedSection;
            continue;
        }
        match (state, is_header) {
            (FilterState::InExcludedSection, false) => continue,
            (FilterState::InExcludedSection, true) => state = FilterState::Scanning,
            (FilterState::Scanning, _) => {}
        }
        if contains_any(&line, &rules.banned_line_words) {
            continue;
        }
        kept.push(line);
    }

    let stats = FilterStats {
        lines_in: lines.len(),
        lines_out: kept.len(),
    };
    let mut out = kept.join(ending.as_str());
    out.push_str(ending.as_str());
    (out, stats)
}

/// Result of filtering one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilteredFile {
    pub input: PathBuf,
    pub output: PathBuf,
    pub stats: FilterStats,
}

/// Filter `input` and write the result to `output_dir/<file name>`.
///
/// The output directory is created if needed. Returns the output path.
pub async fn filter_markdown_file(
    input_path: &Path,
    rules: &FilterRules,
    output_dir: &Path,
) -> Result<PathBuf, PrepError> {
    Ok(filter_file(input_path, rules, output_dir).await?.output)
}

async fn filter_file(
    input_path: &Path,
    rules: &FilterRules,
    output_dir: &Path,
) -> Result<FilteredFile, PrepError> {
    let text = input::read_text(input_path).await?;
    let file_name = input_path.file_name().ok_or_else(|| {
        PrepError::InvalidConfig(format!("'{}' has no file name", input_path.display()))
    })?;
    let output = output_dir.join(file_name);

    let (filtered, stats) = filter_markdown_with_stats(&text, rules);
    encode::write_atomic_async(&output, filtered.as_bytes()).await?;

    debug!(
        "Filtered {} → {} ({} → {} lines)",
        input_path.display(),
        output.display(),
        stats.lines_in,
        stats.lines_out
    );
    Ok(FilteredFile {
        input: input_path.to_path_buf(),
        output,
        stats,
    })
}

/// Filter every `*.md` file directly inside `input_dir`.
///
/// Files are independent and processed concurrently; the summary is sorted by
/// input path. The first failure aborts the run.
pub async fn filter_markdown_dir(
    input_dir: &Path,
    rules: &FilterRules,
    output_dir: &Path,
) -> Result<Vec<FilteredFile>, PrepError> {
    let files = input::markdown_files(input_dir).await?;
    info!("Filtering {} markdown files from {}", files.len(), input_dir.display());

    let results: Vec<Result<FilteredFile, PrepError>> = stream::iter(
        files
            .iter()
            .map(|path| filter_file(path, rules, output_dir)),
    )
    .buffer_unordered(DIR_CONCURRENCY)
    .collect()
    .await;

    let mut summary = results.into_iter().collect::<Result<Vec<_>, _>>()?;
    summary.sort_by(|a, b| a.input.cmp(&b.input));
    info!("Filtered {} files into {}", summary.len(), output_dir.display());
    Ok(summary)
}
