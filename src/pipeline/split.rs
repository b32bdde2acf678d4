//! Page splitting: turn per-page split decisions into a new PDF.
//!
//! Splitting happens in two steps:
//!
//! 1. [`plan_split`] is pure. From each page's geometry and decision it lays
//!    out the output pages: a split page becomes a left and a right half
//!    (in that order, in place of the original), a kept page stays whole at
//!    its declared size.
//! 2. [`write_split_pdf`] applies a plan with pdfium. Every planned page is a
//!    copy of its source page; halves get their media and crop boxes set to
//!    the clip rectangle, so the content outside the half is clipped away
//!    and the page measures exactly that half. The input document is never
//!    modified.
//!
//! Clips are computed in raster pixels, the space the split decision was
//! made in, and converted to the source page's user space only when
//! writing.

use crate::error::PrepError;
use crate::pipeline::render::PageGeometry;
use pdfium_render::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Which part of the source page an output page shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageHalf {
    Left,
    Right,
    Whole,
}

/// An axis-aligned rectangle, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClipRect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl ClipRect {
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }
}

/// One page of the output document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlannedPage {
    /// 0-based index of the source page.
    pub source_index: usize,
    pub half: PageHalf,
    /// Clip in source raster pixels; `None` for whole pages.
    pub clip: Option<ClipRect>,
    /// Output page width in PDF points.
    pub width: f32,
    /// Output page height in PDF points.
    pub height: f32,
}

impl PlannedPage {
    /// The clip converted to a rectangle in the source page's user space,
    /// or `None` for whole pages.
    ///
    /// The clip is taken on the page as displayed, so the crop-box origin
    /// and `/Rotate` are undone here. The copied page keeps its rotation and
    /// therefore shows exactly the clipped half.
    pub fn media_box(&self, geometry: &PageGeometry) -> Option<PdfRect> {
        let clip = self.clip?;
        let (sx, sy) = geometry.points_per_pixel();
        let (ax, ay) = geometry.to_user_space(clip.x0 * sx, clip.y0 * sy);
        let (bx, by) = geometry.to_user_space(clip.x1 * sx, clip.y1 * sy);
        Some(PdfRect::new_from_values(
            ay.min(by),
            ax.min(bx),
            ay.max(by),
            ax.max(bx),
        ))
    }
}

/// Lay out the output pages for `decisions` (one per source page).
pub fn plan_split(
    pages: &[PageGeometry],
    decisions: &[bool],
) -> Result<Vec<PlannedPage>, PrepError> {
    if pages.len() != decisions.len() {
        return Err(PrepError::InvalidConfig(format!(
            "{} split decisions for {} pages",
            decisions.len(),
            pages.len()
        )));
    }

    let mut plan = Vec::with_capacity(pages.len() * 2);
    for (source_index, (geometry, &split)) in pages.iter().zip(decisions).enumerate() {
        if !split {
            plan.push(PlannedPage {
                source_index,
                half: PageHalf::Whole,
                clip: None,
                width: geometry.declared_width,
                height: geometry.declared_height,
            });
            continue;
        }

        let (sx, sy) = geometry.points_per_pixel();
        let raster_w = geometry.raster_width as f32;
        let raster_h = geometry.raster_height as f32;
        let mid = raster_w / 2.0;
        let halves = [
            (PageHalf::Left, 0.0, mid),
            (PageHalf::Right, mid, raster_w),
        ];
        for (half, x0, x1) in halves {
            let clip = ClipRect {
                x0,
                y0: 0.0,
                x1,
                y1: raster_h,
            };
            plan.push(PlannedPage {
                source_index,
                half,
                clip: Some(clip),
                width: clip.width() * sx,
                height: clip.height() * sy,
            });
        }
    }
    Ok(plan)
}

/// Number of output pages a decision list produces.
pub fn output_page_count(decisions: &[bool]) -> usize {
    decisions.iter().map(|&s| if s { 2 } else { 1 }).sum()
}

/// Build a new PDF from `source` according to `plan` and save it to
/// `output`, atomically (temp file in the target directory, then rename).
pub fn write_split_pdf(
    pdfium: &Pdfium,
    source: &PdfDocument<'_>,
    geometries: &[PageGeometry],
    plan: &[PlannedPage],
    output: &Path,
) -> Result<(), PrepError> {
    let write_err = |detail: String| PrepError::PdfWriteFailed {
        path: output.to_path_buf(),
        detail,
    };

    let mut target = pdfium
        .create_new_pdf()
        .map_err(|e| write_err(format!("create document: {e:?}")))?;

    for (dest, planned) in plan.iter().enumerate() {
        let geometry = geometries.get(planned.source_index).ok_or_else(|| {
            PrepError::Internal(format!(
                "plan references page {} but only {} geometries are known",
                planned.source_index + 1,
                geometries.len()
            ))
        })?;
        let dest_index = dest as PdfPageIndex;

        target
            .pages_mut()
            .copy_page_from_document(source, planned.source_index as PdfPageIndex, dest_index)
            .map_err(|e| {
                write_err(format!(
                    "copy page {} → {}: {e:?}",
                    planned.source_index + 1,
                    dest + 1
                ))
            })?;

        if let Some(rect) = planned.media_box(geometry) {
            let mut page = target
                .pages()
                .get(dest_index)
                .map_err(|e| write_err(format!("reopen page {}: {e:?}", dest + 1)))?;
            let boundaries = page.boundaries_mut();
            boundaries
                .set_media(rect)
                .map_err(|e| write_err(format!("media box of page {}: {e:?}", dest + 1)))?;
            boundaries
                .set_crop(rect)
                .map_err(|e| write_err(format!("crop box of page {}: {e:?}", dest + 1)))?;
        }
        debug!(
            "Output page {} ← source page {} ({:?}, {}x{} pt)",
            dest + 1,
            planned.source_index + 1,
            planned.half,
            planned.width,
            planned.height
        );
    }

    let dir = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|source| PrepError::OutputWriteFailed {
        path: output.to_path_buf(),
        source,
    })?;
    let tmp = tempfile::Builder::new()
        .suffix(".pdf.tmp")
        .tempfile_in(&dir)
        .map_err(|source| PrepError::OutputWriteFailed {
            path: output.to_path_buf(),
            source,
        })?;
    target
        .save_to_file(tmp.path())
        .map_err(|e| write_err(format!("save: {e:?}")))?;
    tmp.persist(output)
        .map_err(|e| PrepError::OutputWriteFailed {
            path: output.to_path_buf(),
            source: e.error,
        })?;

    info!("Wrote {} pages to {}", plan.len(), output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a4() -> PageGeometry {
        PageGeometry::at_unit_scale(842.0, 595.0)
    }

    #[test]
    fn split_page_becomes_two_halves() {
        let plan = plan_split(&[a4()], &[true]).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].half, PageHalf::Left);
        assert_eq!(plan[1].half, PageHalf::Right);
        assert_eq!(plan[0].width + plan[1].width, 842.0);
        assert!(plan.iter().all(|p| p.height == 595.0));
        assert_eq!(plan[0].clip.unwrap().x1, plan[1].clip.unwrap().x0);
    }

    #[test]
    fn kept_page_uses_declared_size() {
        // Declared size differs from the raster on purpose.
        let geometry = PageGeometry {
            raster_width: 1200,
            raster_height: 1700,
            ..PageGeometry::at_unit_scale(600.0, 850.0)
        };
        let plan = plan_split(&[geometry], &[false]).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].half, PageHalf::Whole);
        assert_eq!(plan[0].clip, None);
        assert_eq!((plan[0].width, plan[0].height), (600.0, 850.0));
    }

    #[test]
    fn halves_are_scaled_back_to_points() {
        let geometry = PageGeometry {
            raster_width: 1684,
            raster_height: 1190,
            ..PageGeometry::at_unit_scale(842.0, 595.0)
        };
        let plan = plan_split(&[geometry], &[true]).unwrap();
        assert_eq!(plan[0].width, 421.0);
        assert_eq!(plan[0].height, 595.0);
        assert_eq!(plan[1].clip.unwrap().x0, 842.0);
    }

    #[test]
    fn order_is_depth_first() {
        let pages = [a4(), a4(), a4()];
        let plan = plan_split(&pages, &[false, true, false]).unwrap();
        let layout: Vec<(usize, PageHalf)> =
            plan.iter().map(|p| (p.source_index, p.half)).collect();
        assert_eq!(
            layout,
            vec![
                (0, PageHalf::Whole),
                (1, PageHalf::Left),
                (1, PageHalf::Right),
                (2, PageHalf::Whole),
            ]
        );
    }

    #[test]
    fn output_count_matches_plan() {
        let decisions = [true, false, true, true, false];
        let pages = vec![a4(); decisions.len()];
        let plan = plan_split(&pages, &decisions).unwrap();
        assert_eq!(plan.len(), output_page_count(&decisions));
        assert_eq!(output_page_count(&decisions), 8);
    }

    #[test]
    fn mismatched_decisions_are_rejected() {
        let err = plan_split(&[a4(), a4()], &[true]).unwrap_err();
        assert!(matches!(err, PrepError::InvalidConfig(_)));
    }

    #[test]
    fn right_half_media_box_in_pdf_space() {
        let plan = plan_split(&[a4()], &[true]).unwrap();
        let rect = plan[1].media_box(&a4()).unwrap();
        assert_eq!(rect.left().value, 421.0);
        assert_eq!(rect.right().value, 842.0);
        assert_eq!(rect.bottom().value, 0.0);
        assert_eq!(rect.top().value, 595.0);
        assert!(plan_split(&[a4()], &[false]).unwrap()[0]
            .media_box(&a4())
            .is_none());
    }

    fn corners(rect: PdfRect) -> (f32, f32, f32, f32) {
        (
            rect.left().value,
            rect.bottom().value,
            rect.right().value,
            rect.top().value,
        )
    }

    #[test]
    fn halves_follow_crop_box_origin() {
        // CropBox [36 36 878 631].
        let geometry = a4().with_origin(36.0, 36.0);
        let plan = plan_split(&[geometry], &[true]).unwrap();
        assert_eq!(
            corners(plan[0].media_box(&geometry).unwrap()),
            (36.0, 36.0, 457.0, 631.0)
        );
        assert_eq!(
            corners(plan[1].media_box(&geometry).unwrap()),
            (457.0, 36.0, 878.0, 631.0)
        );
    }

    #[test]
    fn halves_of_rotated_page_map_to_unrotated_box() {
        // Portrait MediaBox [0 0 595 842] with /Rotate 90, shown as 842x595.
        let geometry = a4().with_rotation(90);
        let plan = plan_split(&[geometry], &[true]).unwrap();
        // The displayed left half is the bottom half of the unrotated page.
        assert_eq!(
            corners(plan[0].media_box(&geometry).unwrap()),
            (0.0, 0.0, 595.0, 421.0)
        );
        assert_eq!(
            corners(plan[1].media_box(&geometry).unwrap()),
            (0.0, 421.0, 595.0, 842.0)
        );

        let geometry = a4().with_rotation(270);
        let plan = plan_split(&[geometry], &[true]).unwrap();
        assert_eq!(
            corners(plan[0].media_box(&geometry).unwrap()),
            (0.0, 421.0, 595.0, 842.0)
        );
    }
}
