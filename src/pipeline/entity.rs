//! Entity-name extraction from converted report text.
//!
//! Reports rarely state the issuing organisation in a fixed place, so the
//! name is found by anchors, tried in order until one yields a candidate
//! line:
//!
//! 1. the line around the first report-title anchor (previous line first),
//!    if it carries the corporate-suffix or group marker;
//! 2. the first marker-carrying line between the page-1 and page-2 headers;
//! 3. the line before the first postal mark, whatever it holds.
//!
//! A candidate without either marker is then corrected from the line before
//! the report title, or failing that from the line after a company-profile
//! section header, skipping blank lines forward in both cases. The winning
//! line is trimmed down to the bare name. Nothing here fails: the worst case
//! is [`UNKNOWN_ENTITY`].

use crate::config::EntityMarkers;
use crate::error::PrepError;
use crate::pipeline::{filter::split_lines, input};
use std::path::Path;
use tracing::debug;

/// Returned when no stage finds a candidate.
pub const UNKNOWN_ENTITY: &str = "unknown";

/// Extract the entity name from a document's lines.
pub fn extract_entity_name<S: AsRef<str>>(lines: &[S], markers: &EntityMarkers) -> String {
    let lines: Vec<&str> = lines.iter().map(AsRef::as_ref).collect();
    let has_marker =
        |line: &str| line.contains(&markers.corporate_suffix) || line.contains(&markers.group);

    let mut candidate = title_neighbour(&lines, markers, &has_marker);
    if candidate.is_none() {
        candidate = between_page_headers(&lines, markers, &has_marker);
    }
    if candidate.is_none() {
        candidate = before_postal_mark(&lines, markers);
    }

    if !candidate.is_some_and(|c| has_marker(c)) {
        if let Some(title) = markers.report_titles.first() {
            if let Some(i) = lines.iter().position(|l| l.contains(title.as_str())) {
                if i > 0 {
                    candidate = Some(first_non_blank_from(&lines, i - 1));
                }
            }
        }
        if !candidate.is_some_and(|c| has_marker(c)) {
            let section = lines.iter().position(|l| {
                markers
                    .section_headers
                    .iter()
                    .any(|h| l.contains(h.as_str()))
            });
            if let Some(i) = section {
                if i + 1 < lines.len() {
                    candidate = Some(first_non_blank_from(&lines, i + 1));
                }
            }
        }
    }

    match candidate.filter(|c| !c.is_empty()) {
        Some(c) => {
            debug!("Entity candidate line: {:?}", c);
            trim_candidate(c, markers)
        }
        None => UNKNOWN_ENTITY.to_string(),
    }
}

/// Split `text` on any line ending and run [`extract_entity_name`].
pub fn extract_entity_name_from_text(text: &str, markers: &EntityMarkers) -> String {
    extract_entity_name(&split_lines(text), markers)
}

/// Read a markdown file and extract its entity name.
pub fn extract_entity_name_from_file(
    path: &Path,
    markers: &EntityMarkers,
) -> Result<String, PrepError> {
    let text = input::read_text_blocking(path)?;
    Ok(extract_entity_name_from_text(&text, markers))
}

fn non_empty(s: &str) -> Option<&str> {
    (!s.is_empty()).then_some(s)
}

/// Only the first title occurrence is considered.
fn title_neighbour<'a>(
    lines: &[&'a str],
    markers: &EntityMarkers,
    has_marker: &impl Fn(&str) -> bool,
) -> Option<&'a str> {
    let i = lines.iter().position(|l| {
        markers
            .report_titles
            .iter()
            .any(|t| l.contains(t.as_str()))
    })?;
    let prev = if i > 0 { lines[i - 1] } else { "" };
    let next = lines.get(i + 1).copied().unwrap_or("");
    if has_marker(prev) {
        non_empty(prev)
    } else if has_marker(next) {
        non_empty(next)
    } else {
        None
    }
}

fn between_page_headers<'a>(
    lines: &[&'a str],
    markers: &EntityMarkers,
    has_marker: &impl Fn(&str) -> bool,
) -> Option<&'a str> {
    let mut start = None;
    let mut end = None;
    for (i, line) in lines.iter().enumerate() {
        if line.contains(markers.first_page_header.as_str()) {
            start = Some(i);
        }
        if start.is_some() && line.contains(markers.second_page_header.as_str()) {
            end = Some(i);
            break;
        }
    }
    let (start, end) = (start?, end?);
    if start >= end {
        return None;
    }
    lines[start + 1..end]
        .iter()
        .copied()
        .find(|&l| has_marker(l))
        .and_then(non_empty)
}

fn before_postal_mark<'a>(lines: &[&'a str], markers: &EntityMarkers) -> Option<&'a str> {
    let i = lines
        .iter()
        .position(|l| l.contains(markers.postal_mark.as_str()))?;
    if i > 0 {
        non_empty(lines[i - 1])
    } else {
        None
    }
}

/// `lines[from]`, or the first non-blank line after it. Stops at the last
/// line even if that one is blank too.
fn first_non_blank_from<'a>(lines: &[&'a str], from: usize) -> &'a str {
    let mut j = from;
    while lines[j].trim().is_empty() && j + 1 < lines.len() {
        j += 1;
    }
    lines[j]
}

/// Cut a candidate line down to the name itself.
fn trim_candidate(candidate: &str, markers: &EntityMarkers) -> String {
    let suffix = markers.corporate_suffix.as_str();
    let mut name: &str = candidate;

    if !suffix.is_empty() {
        match name.find(suffix) {
            Some(0) => name = &name[suffix.len()..],
            Some(pos) => {
                name = &name[..pos];
                if name.matches(' ').count() > 1 {
                    name = after_last_space(name);
                }
            }
            None => {}
        }
    }

    if name.contains(' ') {
        name = after_last_space(name);
    }

    let group = markers.group.as_str();
    if !group.is_empty() {
        if let Some(pos) = name.find(group) {
            name = &name[..pos + group.len()];
        }
    }

    name.trim().to_string()
}

fn after_last_space(s: &str) -> &str {
    match s.rfind(' ') {
        Some(pos) => &s[pos + 1..],
        None => s,
    }
}
