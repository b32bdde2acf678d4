//! # edgequake-docprep
//!
//! Prepare scanned and born-digital report PDFs for text extraction and
//! retrieval.
//!
//! ## Why this crate?
//!
//! Corporate reports arrive as two-up scans, mixed text/table layouts and
//! boilerplate-heavy markdown. Before any model reads them, pages have to be
//! cut along the gutter, each page's text signals merged into one ordered
//! block list, and the converted markdown stripped of tables of contents,
//! page markers and other noise. This crate does those deterministic steps.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Split    detect two-up pages, write a single-page PDF
//!  ├─ 2. Blocks   per page: PNG + reconciled text/table blocks
//!  │
//! Markdown (from any page-to-text step)
//!  │
//!  ├─ 3. Filter   drop banned lines and sections, keep line endings
//!  ├─ 4. Entity   find the issuing organisation's name
//!  └─ 5. Chunk    clean, overlapping chunks for a retrieval index
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_docprep::{extract_blocks, split_document, IngestConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = IngestConfig::default();
//!     let report = split_document("scan.pdf", "scan.split.pdf", &config).await?;
//!     eprintln!("{} → {} pages", report.input_pages, report.output_pages);
//!
//!     let output = extract_blocks("scan.split.pdf", "out/", &config).await?;
//!     eprintln!("{} blocks", output.total_blocks());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docprep` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ## pdfium
//!
//! PDF rendering needs a pdfium shared library at runtime. It is looked up via
//! `PDFIUM_LIB_PATH`, then the working directory, then the system library
//! path. The markdown stages do not touch pdfium.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod ingest;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ChunkConfig, EntityMarkers, FilterRules, IngestConfig, IngestConfigBuilder, SplitHeuristics,
};
pub use error::{PageError, PrepError};
pub use ingest::{extract_blocks, reconcile_signals, reconcile_signals_file, split_document};
pub use output::{IngestOutput, PageDecision, PageRecord, SplitReport};
pub use pipeline::analyze::{analyze_page, decide, SplitReason, SplitVerdict};
pub use pipeline::blocks::{reconcile, render_block_context, BBox, ContentBlock, ImageBlock};
pub use pipeline::chunk::{clean_chunk_text, prepare_chunks, split_text, Chunk};
pub use pipeline::entity::{extract_entity_name, extract_entity_name_from_text, UNKNOWN_ENTITY};
pub use pipeline::filter::{
    filter_markdown, filter_markdown_dir, filter_markdown_file, FilteredFile, LineEnding,
};
pub use pipeline::signals::PageSignals;
pub use pipeline::split::{plan_split, PlannedPage};
pub use progress::{IngestProgressCallback, NoopProgressCallback, ProgressCallback};
