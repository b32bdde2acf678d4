//! Result types of the document-level operations.

use crate::error::PageError;
use crate::pipeline::analyze::SplitVerdict;
use crate::pipeline::blocks::ContentBlock;
use crate::pipeline::split::PageHalf;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of [`crate::split_document`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub input_pages: usize,
    pub output_pages: usize,
    /// One entry per input page, in page order.
    pub pages: Vec<PageDecision>,
}

impl SplitReport {
    /// Number of input pages that were split in two.
    pub fn split_pages(&self) -> usize {
        self.pages.iter().filter(|p| p.verdict.split).count()
    }
}

/// The split decision for one input page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageDecision {
    /// 1-indexed page number.
    pub page_num: usize,
    pub verdict: SplitVerdict,
    /// Halves this page became in the output, in output order.
    pub halves: Vec<PageHalf>,
}

/// Outcome of [`crate::extract_blocks`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutput {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    /// Path of the written `blocks.json`.
    pub blocks_file: PathBuf,
    pub pages: Vec<PageRecord>,
}

impl IngestOutput {
    pub fn failed_pages(&self) -> usize {
        self.pages.iter().filter(|p| !p.errors.is_empty()).count()
    }

    pub fn total_blocks(&self) -> usize {
        self.pages.iter().map(|p| p.blocks.len()).sum()
    }
}

/// Everything exported for one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    /// 1-indexed page number.
    pub page_num: usize,
    /// Page image, if it was written.
    pub image: Option<PathBuf>,
    /// Reconciled blocks; empty when extraction failed.
    pub blocks: Vec<ContentBlock>,
    /// Non-fatal failures on this page.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<PageError>,
}
