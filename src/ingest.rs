//! Document-level entry points for PDF ingestion.
//!
//! Both operations open the document once and walk its pages in order. pdfium
//! is blocking and its handles are not `Send`, so each whole run lives on one
//! `spawn_blocking` thread; the async wrappers only validate input and await
//! that thread.

use crate::config::IngestConfig;
use crate::error::{PageError, PrepError};
use crate::output::{IngestOutput, PageDecision, PageRecord, SplitReport};
use crate::pipeline::analyze::{self, SplitVerdict};
use crate::pipeline::blocks::{self, ContentBlock};
use crate::pipeline::render::{self, PageGeometry};
use crate::pipeline::signals::{self, PageSignals};
use crate::pipeline::{encode, input, split};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Name of the block file written by [`extract_blocks`].
pub const BLOCKS_FILE_NAME: &str = "blocks.json";

/// Split two-up pages of `input` into single pages and save the result to
/// `output`.
///
/// Every page is rendered at `config.analysis_scale`, run through the gutter
/// heuristic, and either kept whole or replaced by its left and right halves.
/// The input file is never modified.
///
/// # Errors
/// Fatal for the whole document: unreadable or non-PDF input, wrong password,
/// a page that fails to render or has an unsupported channel layout, and
/// failure to write the output.
pub async fn split_document(
    input_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &IngestConfig,
) -> Result<SplitReport, PrepError> {
    let pdf_path = input::resolve_pdf(input_path.as_ref())?;
    let output = output_path.as_ref().to_path_buf();
    let config = config.clone();
    info!("Splitting {} → {}", pdf_path.display(), output.display());

    tokio::task::spawn_blocking(move || split_document_blocking(&pdf_path, &output, &config))
        .await
        .map_err(|e| PrepError::Internal(format!("Split task panicked: {}", e)))?
}

fn split_document_blocking(
    pdf_path: &Path,
    output: &Path,
    config: &IngestConfig,
) -> Result<SplitReport, PrepError> {
    let pdfium = render::bind_pdfium()?;
    let document = render::open_document(&pdfium, pdf_path, config.password.as_deref())?;
    let total = render::page_count(&document);
    info!("PDF has {} pages", total);

    let cb = config.progress_callback.as_ref();
    if let Some(cb) = cb {
        cb.on_ingest_start(total);
    }

    let mut geometries = Vec::with_capacity(total);
    let mut verdicts = Vec::with_capacity(total);
    for idx in 0..total {
        let page_num = idx + 1;
        if let Some(cb) = cb {
            cb.on_page_start(page_num, total);
        }

        let (geometry, verdict) = match analyse_page(&document, idx, config) {
            Ok(v) => v,
            Err(e) => {
                if let Some(cb) = cb {
                    cb.on_page_error(page_num, total, &e.to_string());
                    cb.on_ingest_complete(total, idx);
                }
                return Err(e);
            }
        };
        debug!(
            "Page {}: split={} ({:?}, edge density {:?}, band range {:?})",
            page_num, verdict.split, verdict.reason, verdict.edge_density, verdict.band_range
        );
        if let Some(cb) = cb {
            let detail = if verdict.split { "split" } else { "whole" };
            cb.on_page_complete(page_num, total, detail);
        }
        geometries.push(geometry);
        verdicts.push(verdict);
    }

    let decisions: Vec<bool> = verdicts.iter().map(|v| v.split).collect();
    let plan = split::plan_split(&geometries, &decisions)?;
    let written = split::write_split_pdf(&pdfium, &document, &geometries, &plan, output);
    if let Some(cb) = cb {
        cb.on_ingest_complete(total, if written.is_ok() { total } else { 0 });
    }
    written?;

    let pages = verdicts
        .into_iter()
        .enumerate()
        .map(|(idx, verdict)| PageDecision {
            page_num: idx + 1,
            verdict,
            halves: plan
                .iter()
                .filter(|p| p.source_index == idx)
                .map(|p| p.half)
                .collect(),
        })
        .collect::<Vec<_>>();

    let report = SplitReport {
        input: pdf_path.to_path_buf(),
        output: output.to_path_buf(),
        input_pages: total,
        output_pages: plan.len(),
        pages,
    };
    info!(
        "Split {} of {} pages → {} output pages",
        report.split_pages(),
        report.input_pages,
        report.output_pages
    );
    Ok(report)
}

fn analyse_page(
    document: &PdfDocument<'_>,
    idx: usize,
    config: &IngestConfig,
) -> Result<(PageGeometry, SplitVerdict), PrepError> {
    let page = render::page_at(document, idx)?;
    let (geometry, raster) = render::render_page(&page, idx, config.analysis_scale)?;
    let rgb = raster.to_rgb(idx + 1)?;
    Ok((geometry, analyze::analyze_page(&rgb, &config.heuristics)))
}

/// Export every page of `input` as `page_NNN.png` plus its reconciled blocks
/// into `output_dir`, and write all page records to `blocks.json`.
///
/// Text extraction and image export failures are recorded on the page and
/// the run continues; rendering failures and unsupported channel layouts
/// abort the document.
pub async fn extract_blocks(
    input_path: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    config: &IngestConfig,
) -> Result<IngestOutput, PrepError> {
    let pdf_path = input::resolve_pdf(input_path.as_ref())?;
    let output_dir = output_dir.as_ref().to_path_buf();
    let config = config.clone();
    info!("Extracting blocks from {} into {}", pdf_path.display(), output_dir.display());

    tokio::task::spawn_blocking(move || extract_blocks_blocking(&pdf_path, &output_dir, &config))
        .await
        .map_err(|e| PrepError::Internal(format!("Extraction task panicked: {}", e)))?
}

fn extract_blocks_blocking(
    pdf_path: &Path,
    output_dir: &Path,
    config: &IngestConfig,
) -> Result<IngestOutput, PrepError> {
    let pdfium = render::bind_pdfium()?;
    let document = render::open_document(&pdfium, pdf_path, config.password.as_deref())?;
    let total = render::page_count(&document);
    info!("PDF has {} pages", total);

    std::fs::create_dir_all(output_dir).map_err(|source| PrepError::OutputWriteFailed {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let cb = config.progress_callback.as_ref();
    if let Some(cb) = cb {
        cb.on_ingest_start(total);
    }

    let scale = render::scale_for_dpi(config.image_dpi);
    let mut records: Vec<PageRecord> = Vec::with_capacity(total);
    for idx in 0..total {
        let page_num = idx + 1;
        if let Some(cb) = cb {
            cb.on_page_start(page_num, total);
        }

        let record = match export_page(&document, idx, scale, output_dir) {
            Ok(record) => record,
            Err(e) => {
                if let Some(cb) = cb {
                    cb.on_page_error(page_num, total, &e.to_string());
                    let clean = records.iter().filter(|r| r.errors.is_empty()).count();
                    cb.on_ingest_complete(total, clean);
                }
                return Err(e);
            }
        };

        if let Some(cb) = cb {
            match record.errors.first() {
                None => cb.on_page_complete(
                    page_num,
                    total,
                    &format!("{} blocks", record.blocks.len()),
                ),
                Some(e) => cb.on_page_error(page_num, total, &e.to_string()),
            }
        }
        records.push(record);
    }

    let blocks_file = output_dir.join(BLOCKS_FILE_NAME);
    let written = encode::to_json_bytes(&records)
        .and_then(|bytes| encode::write_atomic(&blocks_file, &bytes));
    if let Some(cb) = cb {
        let clean = if written.is_ok() {
            records.iter().filter(|r| r.errors.is_empty()).count()
        } else {
            0
        };
        cb.on_ingest_complete(total, clean);
    }
    written?;

    let output = IngestOutput {
        input: pdf_path.to_path_buf(),
        output_dir: output_dir.to_path_buf(),
        blocks_file,
        pages: records,
    };
    info!(
        "Exported {} pages ({} blocks, {} pages with errors)",
        output.pages.len(),
        output.total_blocks(),
        output.failed_pages()
    );
    Ok(output)
}

fn export_page(
    document: &PdfDocument<'_>,
    idx: usize,
    scale: f32,
    output_dir: &Path,
) -> Result<PageRecord, PrepError> {
    let page_num = idx + 1;
    let page = render::page_at(document, idx)?;
    let (_, raster) = render::render_page(&page, idx, scale)?;
    let rgb = raster.to_rgb(page_num)?;
    let mut errors = Vec::new();

    let image_path = output_dir.join(encode::page_image_name(page_num));
    let image = match write_page_image(DynamicImage::ImageRgb8(rgb), &image_path, page_num) {
        Ok(()) => Some(image_path),
        Err(e) => {
            warn!("{}", e);
            errors.push(e);
            None
        }
    };

    let blocks = match signals::extract_page_signals(&page, page_num) {
        Ok(signals) => blocks::reconcile_page(signals),
        Err(e) => {
            warn!("{}", e);
            errors.push(e);
            Vec::new()
        }
    };
    debug!("Page {}: {} blocks", page_num, blocks.len());

    Ok(PageRecord {
        page_num,
        image,
        blocks,
        errors,
    })
}

fn write_page_image(img: DynamicImage, path: &Path, page_num: usize) -> Result<(), PageError> {
    let png = encode::encode_png(&img).map_err(|e| PageError::ImageExportFailed {
        page: page_num,
        detail: e.to_string(),
    })?;
    encode::write_atomic(path, &png).map_err(|e| PageError::ImageExportFailed {
        page: page_num,
        detail: e.to_string(),
    })
}

/// Reconcile pre-extracted signals, one entry per page.
pub fn reconcile_signals(pages: Vec<PageSignals>) -> Vec<Vec<ContentBlock>> {
    pages.into_iter().map(blocks::reconcile_page).collect()
}

/// Read a JSON array of [`PageSignals`] and reconcile each page.
pub async fn reconcile_signals_file(
    path: impl AsRef<Path>,
) -> Result<Vec<Vec<ContentBlock>>, PrepError> {
    let path: PathBuf = path.as_ref().to_path_buf();
    let raw = input::read_text(&path).await?;
    let pages: Vec<PageSignals> = serde_json::from_str(&raw).map_err(|e| {
        PrepError::InvalidConfig(format!("signals file '{}': {e}", path.display()))
    })?;
    info!("Reconciling {} pages from {}", pages.len(), path.display());
    Ok(reconcile_signals(pages))
}
