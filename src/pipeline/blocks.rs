//! Block reconciliation: one ordered block list per page from four signals.
//!
//! A page's text arrives through several independent extractors (see
//! [`crate::pipeline::signals::PageSignals`]): structured blocks with
//! per-span boxes, the raw text layer, word tokens, and table regions. None
//! is complete on its own. [`reconcile`] merges them:
//!
//! * **Structured path.** When the structured list starts with a genuine text
//!   block it is authoritative and taken as it is, in its own order. Image
//!   blocks stay in place as [`ContentBlock::Image`]; they carry no text but
//!   still take part in table placement.
//! * **Word path.** Otherwise, if the page has any raw text, the word tokens
//!   are laid into one synthetic block holding a single line, one span per
//!   word, boxed by the union of all word boxes.
//! * **Empty.** No usable structured blocks and no raw text yields `[]`.
//!
//! Tables are then merged by vertical position. They are processed bottom to
//! top so earlier insertions never shift an index still to be computed; each
//! lands right before the first block whose top edge lies strictly below the
//! table's bottom edge, or at the end. The search is a linear scan per table,
//! which is fine for the handful of tables a page carries.

use crate::pipeline::signals::{PageSignals, StructuredBlock, TableRegion, WordToken};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// An axis-aligned box in page space, top-left origin.
///
/// Serialised as `[x0, y0, x1, y1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    pub const fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Top edge.
    pub fn top(&self) -> f32 {
        self.y0
    }

    /// Bottom edge.
    pub fn bottom(&self) -> f32 {
        self.y1
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Smallest box covering both.
    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }
}

impl From<[f32; 4]> for BBox {
    fn from(v: [f32; 4]) -> Self {
        BBox::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [f32; 4] {
    fn from(b: BBox) -> Self {
        [b.x0, b.y0, b.x1, b.y1]
    }
}

/// A run of text with one box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub text: String,
    pub bbox: BBox,
    #[serde(default = "unknown_font")]
    pub font: String,
    #[serde(default)]
    pub size: f32,
    #[serde(default)]
    pub flags: u32,
}

fn unknown_font() -> String {
    "unknown".to_string()
}

impl Span {
    /// A span with no font information.
    pub fn plain(text: impl Into<String>, bbox: BBox) -> Self {
        Self {
            text: text.into(),
            bbox,
            font: unknown_font(),
            size: 0.0,
            flags: 0,
        }
    }
}

/// One visual line: spans in reading order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLine {
    pub spans: Vec<Span>,
    pub bbox: BBox,
    /// Writing mode: 0 horizontal, 1 vertical.
    #[serde(default)]
    pub wmode: u8,
    /// Writing direction as a unit vector.
    #[serde(default = "horizontal")]
    pub dir: (f32, f32),
}

fn horizontal() -> (f32, f32) {
    (1.0, 0.0)
}

impl TextLine {
    /// A horizontal line.
    pub fn new(spans: Vec<Span>, bbox: BBox) -> Self {
        Self {
            spans,
            bbox,
            wmode: 0,
            dir: horizontal(),
        }
    }
}

/// A run of text lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub number: usize,
    pub bbox: BBox,
    pub lines: Vec<TextLine>,
}

/// A table region with its cell text, row-major. Empty cells are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableBlock {
    pub bbox: BBox,
    pub cells: Vec<Vec<Option<String>>>,
}

/// A non-text block of the structured signal, kept for its position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageBlock {
    pub number: usize,
    pub bbox: BBox,
}

/// One unit of page content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text(TextBlock),
    Image(ImageBlock),
    Table(TableBlock),
}

impl ContentBlock {
    pub fn bbox(&self) -> BBox {
        match self {
            ContentBlock::Text(b) => b.bbox,
            ContentBlock::Image(i) => i.bbox,
            ContentBlock::Table(t) => t.bbox,
        }
    }

    pub fn is_table(&self) -> bool {
        matches!(self, ContentBlock::Table(_))
    }
}

/// Merge one page's extraction signals into an ordered block list.
pub fn reconcile(
    structured_blocks: Vec<StructuredBlock>,
    raw_text: &str,
    words: &[WordToken],
    tables: &[TableRegion],
) -> Vec<ContentBlock> {
    let mut blocks: Vec<ContentBlock> = if structured_blocks
        .first()
        .is_some_and(StructuredBlock::is_text)
    {
        structured_blocks
            .into_iter()
            .map(StructuredBlock::into_content_block)
            .collect()
    } else if raw_text.is_empty() {
        return Vec::new();
    } else {
        blocks_from_words(words)
            .into_iter()
            .map(ContentBlock::Text)
            .collect()
    };

    insert_tables(&mut blocks, tables);
    blocks
}

/// [`reconcile`] over a [`PageSignals`] bundle.
pub fn reconcile_page(signals: PageSignals) -> Vec<ContentBlock> {
    let PageSignals {
        structured_blocks,
        raw_text,
        words,
        tables,
    } = signals;
    reconcile(structured_blocks, &raw_text, &words, &tables)
}

/// Lay all words into a single one-line block.
///
/// `None` without words: a page whose text layer has no word tokens gets no
/// text block at all rather than an empty one with a degenerate box, so its
/// tables are the only content.
fn blocks_from_words(words: &[WordToken]) -> Option<TextBlock> {
    let mut spans = Vec::with_capacity(words.len());
    let mut bbox: Option<BBox> = None;

    for word in words {
        let word_box = word.bbox();
        bbox = Some(match bbox {
            Some(acc) => acc.union(&word_box),
            None => word_box,
        });
        spans.push(Span::plain(word.text.clone(), word_box));
    }

    let bbox = bbox?;
    Some(TextBlock {
        number: 0,
        bbox,
        lines: vec![TextLine::new(spans, bbox)],
    })
}

fn insert_tables(blocks: &mut Vec<ContentBlock>, tables: &[TableRegion]) {
    for table in tables.iter().rev() {
        let table_bottom = table.bbox.bottom();
        let block = ContentBlock::Table(TableBlock {
            bbox: table.bbox,
            cells: table.data.clone(),
        });
        match blocks.iter().position(|b| b.bbox().top() > table_bottom) {
            Some(idx) => blocks.insert(idx, block),
            None => blocks.push(block),
        }
    }
}

/// Flatten blocks into the plain-text context handed to the page text
/// extractor alongside the page image.
///
/// Every span is followed by a space and every line by a newline; each table
/// row becomes its cells joined by `" | "`, and a blank line closes the table.
pub fn render_block_context(blocks: &[ContentBlock]) -> String {
    let mut out = String::new();
    for block in blocks {
        match block {
            ContentBlock::Text(text) => {
                for line in &text.lines {
                    for span in &line.spans {
                        out.push_str(&span.text);
                        out.push(' ');
                    }
                    out.push('\n');
                }
            }
            ContentBlock::Image(_) => {}
            ContentBlock::Table(table) => {
                for row in &table.cells {
                    let cells: Vec<&str> = row.iter().map(|c| c.as_deref().unwrap_or("")).collect();
                    let _ = writeln!(out, "{}", cells.join(" | "));
                }
                out.push('\n');
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::signals::IMAGE_BLOCK;

    fn text_block(number: usize, y0: f32, y1: f32, text: &str) -> StructuredBlock {
        let bbox = BBox::new(50.0, y0, 500.0, y1);
        StructuredBlock::text(
            number,
            bbox,
            vec![TextLine::new(vec![Span::plain(text, bbox)], bbox)],
        )
    }

    fn table(y0: f32, y1: f32) -> TableRegion {
        TableRegion {
            bbox: BBox::new(50.0, y0, 500.0, y1),
            data: vec![
                vec![Some("項目".into()), Some("金額".into())],
                vec![Some("売上".into()), None],
            ],
        }
    }

    fn word(x0: f32, y0: f32, x1: f32, y1: f32, text: &str) -> WordToken {
        WordToken {
            x0,
            y0,
            x1,
            y1,
            text: text.into(),
            block_no: 0,
            line_no: 0,
            word_no: 0,
        }
    }

    fn kinds(blocks: &[ContentBlock]) -> Vec<&'static str> {
        blocks
            .iter()
            .map(|b| match b {
                ContentBlock::Text(_) => "text",
                ContentBlock::Image(_) => "image",
                ContentBlock::Table(_) => "table",
            })
            .collect()
    }

    #[test]
    fn table_below_text_goes_after_it() {
        let blocks = reconcile(
            vec![text_block(0, 10.0, 40.0, "heading")],
            "heading",
            &[],
            &[table(100.0, 200.0)],
        );
        assert_eq!(kinds(&blocks), vec!["text", "table"]);
    }

    #[test]
    fn table_between_blocks_is_inserted_in_order() {
        let blocks = reconcile(
            vec![
                text_block(0, 10.0, 40.0, "above"),
                text_block(1, 300.0, 340.0, "below"),
            ],
            "above below",
            &[],
            &[table(100.0, 200.0)],
        );
        assert_eq!(kinds(&blocks), vec!["text", "table", "text"]);
    }

    #[test]
    fn multiple_tables_keep_page_order() {
        let blocks = reconcile(
            vec![
                text_block(0, 0.0, 20.0, "a"),
                text_block(1, 200.0, 220.0, "b"),
                text_block(2, 400.0, 420.0, "c"),
            ],
            "a b c",
            &[],
            &[table(50.0, 150.0), table(250.0, 350.0)],
        );
        assert_eq!(kinds(&blocks), vec!["text", "table", "text", "table", "text"]);
        assert_eq!(blocks[1].bbox().top(), 50.0);
        assert_eq!(blocks[3].bbox().top(), 250.0);
    }

    #[test]
    fn touching_edge_is_not_strictly_below() {
        // Block top equals table bottom: not strictly below, so table goes last.
        let blocks = reconcile(
            vec![text_block(0, 200.0, 240.0, "x")],
            "x",
            &[],
            &[table(100.0, 200.0)],
        );
        assert_eq!(kinds(&blocks), vec!["text", "table"]);
    }

    #[test]
    fn empty_signals_give_no_blocks() {
        assert!(reconcile(Vec::new(), "", &[], &[]).is_empty());
        // Tables alone do not make content when there is no text at all.
        assert!(reconcile(Vec::new(), "", &[], &[table(0.0, 10.0)]).is_empty());
    }

    #[test]
    fn words_are_laid_into_one_line() {
        let words = [
            word(10.0, 20.0, 40.0, 30.0, "株式会社"),
            word(45.0, 18.0, 80.0, 32.0, "XYZ"),
            word(5.0, 50.0, 30.0, 60.0, "2023"),
        ];
        let blocks = reconcile(Vec::new(), "株式会社 XYZ\n2023", &words, &[]);
        assert_eq!(blocks.len(), 1);
        let ContentBlock::Text(block) = &blocks[0] else {
            panic!("expected a text block");
        };
        assert_eq!(block.number, 0);
        assert_eq!(block.bbox, BBox::new(5.0, 18.0, 80.0, 60.0));
        assert_eq!(block.lines.len(), 1);
        assert_eq!(block.lines[0].bbox, block.bbox);
        let texts: Vec<&str> = block.lines[0].spans.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["株式会社", "XYZ", "2023"]);
        assert_eq!(block.lines[0].spans[1].bbox, BBox::new(45.0, 18.0, 80.0, 32.0));
        assert_eq!(block.lines[0].spans[0].font, "unknown");
    }

    #[test]
    fn leading_image_block_forces_word_path() {
        let image = StructuredBlock {
            kind: IMAGE_BLOCK,
            number: 0,
            bbox: BBox::new(0.0, 0.0, 100.0, 100.0),
            lines: Vec::new(),
        };
        let blocks = reconcile(
            vec![image, text_block(1, 200.0, 220.0, "ignored")],
            "from words",
            &[word(0.0, 300.0, 10.0, 310.0, "from"), word(12.0, 300.0, 40.0, 310.0, "words")],
            &[table(100.0, 150.0)],
        );
        assert_eq!(kinds(&blocks), vec!["table", "text"]);
        let ContentBlock::Text(block) = &blocks[1] else {
            panic!("expected a text block");
        };
        assert_eq!(block.lines[0].spans.len(), 2);
    }

    fn image_block(number: usize, y0: f32, y1: f32) -> StructuredBlock {
        StructuredBlock {
            kind: IMAGE_BLOCK,
            number,
            bbox: BBox::new(0.0, y0, 100.0, y1),
            lines: Vec::new(),
        }
    }

    #[test]
    fn later_image_blocks_are_kept_on_structured_path() {
        let blocks = reconcile(
            vec![text_block(0, 0.0, 20.0, "t"), image_block(1, 100.0, 200.0)],
            "t",
            &[],
            &[],
        );
        assert_eq!(kinds(&blocks), vec!["text", "image"]);
        assert_eq!(render_block_context(&blocks), "t \n");
    }

    #[test]
    fn unsorted_structured_list_places_table_before_first_lower_block() {
        // The image sits out of vertical order; it is still the first block
        // whose top lies below the table, so the table lands before it.
        let blocks = reconcile(
            vec![
                text_block(0, 0.0, 20.0, "a"),
                image_block(1, 100.0, 150.0),
                text_block(2, 50.0, 70.0, "b"),
            ],
            "a b",
            &[],
            &[table(40.0, 80.0)],
        );
        assert_eq!(kinds(&blocks), vec!["text", "table", "image", "text"]);
    }

    #[test]
    fn raw_text_without_words_keeps_tables() {
        let blocks = reconcile(Vec::new(), "scanned", &[], &[table(0.0, 10.0)]);
        assert_eq!(kinds(&blocks), vec!["table"]);
    }

    #[test]
    fn context_rendering() {
        let blocks = reconcile(
            vec![text_block(0, 0.0, 20.0, "売上高")],
            "売上高",
            &[],
            &[table(100.0, 200.0)],
        );
        assert_eq!(
            render_block_context(&blocks),
            "売上高 \n項目 | 金額\n売上 | \n\n"
        );
    }

    #[test]
    fn blocks_serialise_with_type_tag() {
        let blocks = reconcile(Vec::new(), "x", &[word(0.0, 0.0, 1.0, 1.0, "x")], &[]);
        let json = serde_json::to_value(&blocks).unwrap();
        assert_eq!(json[0]["type"], "text");
        assert_eq!(json[0]["bbox"], serde_json::json!([0.0, 0.0, 1.0, 1.0]));
    }
}
