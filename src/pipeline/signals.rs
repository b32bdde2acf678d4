//! Per-page extraction signals, and the pdfium extractor that produces them.
//!
//! [`PageSignals`] is the input of [`crate::pipeline::blocks::reconcile`]. It
//! is plain serde data so signals from other extractors (a table detector, a
//! layout model) can be supplied as JSON; pdfium itself only fills the text
//! signals and leaves `tables` empty.
//!
//! All boxes are converted to a top-left origin with y growing downwards,
//! the convention the reconciler orders by.

use crate::error::PageError;
use crate::pipeline::blocks::{BBox, ContentBlock, ImageBlock, Span, TextBlock, TextLine};
use pdfium_render::prelude::*;
use serde::{Deserialize, Serialize};

/// Structured block type for text.
pub const TEXT_BLOCK: u8 = 0;
/// Structured block type for images.
pub const IMAGE_BLOCK: u8 = 1;

/// A block from a layout-aware extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredBlock {
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub number: usize,
    pub bbox: BBox,
    #[serde(default)]
    pub lines: Vec<TextLine>,
}

impl StructuredBlock {
    pub fn text(number: usize, bbox: BBox, lines: Vec<TextLine>) -> Self {
        Self {
            kind: TEXT_BLOCK,
            number,
            bbox,
            lines,
        }
    }

    pub fn is_text(&self) -> bool {
        self.kind == TEXT_BLOCK
    }

    /// Text blocks keep their lines; any other kind keeps only its box.
    pub fn into_content_block(self) -> ContentBlock {
        if self.is_text() {
            ContentBlock::Text(TextBlock {
                number: self.number,
                bbox: self.bbox,
                lines: self.lines,
            })
        } else {
            ContentBlock::Image(ImageBlock {
                number: self.number,
                bbox: self.bbox,
            })
        }
    }
}

/// A word with its box and position in the text layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordToken {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
    pub text: String,
    #[serde(default)]
    pub block_no: usize,
    #[serde(default)]
    pub line_no: usize,
    #[serde(default)]
    pub word_no: usize,
}

impl WordToken {
    pub fn bbox(&self) -> BBox {
        BBox::new(self.x0, self.y0, self.x1, self.y1)
    }
}

/// A detected table and its cell text, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRegion {
    pub bbox: BBox,
    #[serde(default)]
    pub data: Vec<Vec<Option<String>>>,
}

/// Everything the extractors found on one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSignals {
    #[serde(default)]
    pub structured_blocks: Vec<StructuredBlock>,
    #[serde(default)]
    pub raw_text: String,
    #[serde(default)]
    pub words: Vec<WordToken>,
    #[serde(default)]
    pub tables: Vec<TableRegion>,
}

/// Read the text signals of one page through pdfium.
///
/// `page_num` is 1-indexed and only used in errors.
pub fn extract_page_signals(page: &PdfPage<'_>, page_num: usize) -> Result<PageSignals, PageError> {
    let page_height = page.height().value;
    let text = page.text().map_err(|e| PageError::ExtractionFailed {
        page: page_num,
        detail: format!("{:?}", e),
    })?;

    let chars: Vec<(char, Option<BBox>)> = text
        .chars()
        .iter()
        .filter_map(|ch| {
            let c = ch.unicode_char()?;
            let bbox = ch
                .loose_bounds()
                .ok()
                .map(|r| to_top_left(&r, page_height));
            Some((c, bbox))
        })
        .collect();

    let segments: Vec<(String, BBox)> = text
        .segments()
        .iter()
        .map(|seg| (seg.text(), to_top_left(&seg.bounds(), page_height)))
        .collect();

    Ok(PageSignals {
        structured_blocks: group_segments(segments),
        raw_text: text.all(),
        words: group_words(chars),
        tables: Vec::new(),
    })
}

fn to_top_left(rect: &PdfRect, page_height: f32) -> BBox {
    BBox::new(
        rect.left().value,
        page_height - rect.top().value,
        rect.right().value,
        page_height - rect.bottom().value,
    )
}

/// Group a character stream into words.
///
/// Whitespace ends a word, a newline also ends the line, and an empty line
/// ends the block. Characters without a box still contribute text.
fn group_words(chars: impl IntoIterator<Item = (char, Option<BBox>)>) -> Vec<WordToken> {
    #[derive(Default)]
    struct Cursor {
        text: String,
        bbox: Option<BBox>,
        block_no: usize,
        line_no: usize,
        word_no: usize,
        line_has_words: bool,
    }

    fn flush(cur: &mut Cursor, out: &mut Vec<WordToken>) {
        if cur.text.is_empty() {
            return;
        }
        let b = cur.bbox.take().unwrap_or(BBox::new(0.0, 0.0, 0.0, 0.0));
        out.push(WordToken {
            x0: b.x0,
            y0: b.y0,
            x1: b.x1,
            y1: b.y1,
            text: std::mem::take(&mut cur.text),
            block_no: cur.block_no,
            line_no: cur.line_no,
            word_no: cur.word_no,
        });
        cur.word_no += 1;
        cur.line_has_words = true;
    }

    let mut out = Vec::new();
    let mut cur = Cursor::default();

    for (c, bbox) in chars {
        if c == '\n' {
            flush(&mut cur, &mut out);
            if cur.line_has_words {
                cur.line_no += 1;
            } else if cur.line_no > 0 {
                cur.block_no += 1;
                cur.line_no = 0;
            }
            cur.word_no = 0;
            cur.line_has_words = false;
        } else if c.is_whitespace() {
            flush(&mut cur, &mut out);
        } else {
            cur.text.push(c);
            if let Some(b) = bbox {
                cur.bbox = Some(match cur.bbox {
                    Some(acc) => acc.union(&b),
                    None => b,
                });
            }
        }
    }
    flush(&mut cur, &mut out);
    out
}

/// Group text segments into lines and lines into blocks.
///
/// A segment whose vertical centre falls inside the current line's extent
/// joins that line. A line starts a new block when the gap above it is
/// larger than the previous line's height.
fn group_segments(segments: Vec<(String, BBox)>) -> Vec<StructuredBlock> {
    let mut lines: Vec<TextLine> = Vec::new();
    for (text, bbox) in segments {
        if text.trim().is_empty() {
            continue;
        }
        let centre = (bbox.y0 + bbox.y1) / 2.0;
        match lines.last_mut() {
            Some(line) if centre >= line.bbox.y0 && centre <= line.bbox.y1 => {
                line.bbox = line.bbox.union(&bbox);
                line.spans.push(Span::plain(text, bbox));
            }
            _ => lines.push(TextLine::new(vec![Span::plain(text, bbox)], bbox)),
        }
    }

    let mut blocks: Vec<StructuredBlock> = Vec::new();
    let mut prev: Option<BBox> = None;
    for line in lines {
        let new_block = match prev {
            Some(p) => line.bbox.y0 - p.y1 > p.height(),
            None => true,
        };
        prev = Some(line.bbox);
        match blocks.last_mut() {
            Some(block) if !new_block => {
                block.bbox = block.bbox.union(&line.bbox);
                block.lines.push(line);
            }
            _ => {
                let number = blocks.len();
                blocks.push(StructuredBlock::text(number, line.bbox, vec![line]));
            }
        }
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<(char, Option<BBox>)> {
        s.chars()
            .enumerate()
            .map(|(i, c)| {
                let x = i as f32 * 10.0;
                (c, Some(BBox::new(x, 0.0, x + 8.0, 12.0)))
            })
            .collect()
    }

    #[test]
    fn words_split_on_whitespace_and_lines() {
        let words = group_words(chars("ab cd\nef"));
        let texts: Vec<&str> = words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["ab", "cd", "ef"]);
        assert_eq!((words[1].line_no, words[1].word_no), (0, 1));
        assert_eq!((words[2].line_no, words[2].word_no), (1, 0));
        assert_eq!(words[0].bbox(), BBox::new(0.0, 0.0, 18.0, 12.0));
    }

    #[test]
    fn blank_line_starts_a_new_block() {
        let words = group_words(chars("a\r\n\r\nb"));
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].block_no, 0);
        assert_eq!((words[1].block_no, words[1].line_no), (1, 0));
    }

    #[test]
    fn chars_without_boxes_still_form_words() {
        let words = group_words(vec![('x', None), ('y', None)]);
        assert_eq!(words[0].text, "xy");
        assert_eq!(words[0].bbox(), BBox::new(0.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn segments_group_into_lines_and_blocks() {
        let segments = vec![
            ("統合報告書".to_string(), BBox::new(10.0, 10.0, 100.0, 22.0)),
            ("2023".to_string(), BBox::new(110.0, 11.0, 140.0, 21.0)),
            ("株式会社".to_string(), BBox::new(10.0, 24.0, 80.0, 36.0)),
            ("   ".to_string(), BBox::new(0.0, 40.0, 5.0, 50.0)),
            ("本文".to_string(), BBox::new(10.0, 100.0, 40.0, 112.0)),
        ];
        let blocks = group_segments(segments);
        assert_eq!(blocks.len(), 2);
        assert!(blocks.iter().all(StructuredBlock::is_text));
        assert_eq!(blocks[0].lines.len(), 2);
        assert_eq!(blocks[0].lines[0].spans.len(), 2);
        assert_eq!(blocks[0].bbox, BBox::new(10.0, 10.0, 140.0, 36.0));
        assert_eq!(blocks[1].number, 1);
    }

    #[test]
    fn signals_parse_from_sparse_json() {
        let json = r#"{
            "raw_text": "x",
            "tables": [{"bbox": [0, 10, 100, 40], "data": [["a", null]]}]
        }"#;
        let signals: PageSignals = serde_json::from_str(json).unwrap();
        assert!(signals.structured_blocks.is_empty());
        assert_eq!(signals.tables[0].bbox.y1, 40.0);
        assert_eq!(signals.tables[0].data[0][1], None);
    }

    #[test]
    fn image_block_is_not_text() {
        let json = r#"{"type": 1, "number": 3, "bbox": [0, 0, 1, 1]}"#;
        let block: StructuredBlock = serde_json::from_str(json).unwrap();
        assert!(!block.is_text());
        assert_eq!(
            block.into_content_block(),
            ContentBlock::Image(ImageBlock {
                number: 3,
                bbox: BBox::new(0.0, 0.0, 1.0, 1.0),
            })
        );
    }
}
