//! Pipeline stages for document preparation.
//!
//! Each submodule implements one transformation step and can be used on its
//! own; the document-level orchestration lives in [`crate::ingest`].
//!
//! ## Data Flow
//!
//! ```text
//! PDF ─▶ input ─▶ render ─▶ raster ─▶ analyze ─▶ split ─▶ PDF (single pages)
//!                   │
//!                   └──▶ signals ─▶ blocks ─▶ encode ─▶ page PNGs + blocks.json
//!
//! markdown ─▶ filter ─▶ filtered markdown ─▶ entity (name)
//!                                         └─▶ chunk (retrieval chunks)
//! ```
//!
//! 1. [`input`]   validate PDF paths, read text inputs
//! 2. [`render`]  bind pdfium, open documents, rasterise pages
//! 3. [`raster`]  normalise rasters to 3-channel RGB
//! 4. [`analyze`] gutter heuristic: split or keep whole
//! 5. [`split`]   plan and write the split document
//! 6. [`signals`] per-page extraction signals
//! 7. [`blocks`]  reconcile signals into ordered content blocks
//! 8. [`encode`]  PNG/JSON encoding and atomic writes
//! 9. [`filter`]  markdown section filter
//! 10. [`entity`] entity-name heuristic
//! 11. [`chunk`]  retrieval chunk preparation

pub mod analyze;
pub mod blocks;
pub mod chunk;
pub mod encode;
pub mod entity;
pub mod filter;
pub mod input;
pub mod raster;
pub mod render;
pub mod signals;
pub mod split;
