//! PDF access through pdfium: binding, opening, and page rasterisation.
//!
//! pdfium keeps thread-local state and is not async-safe, so everything here
//! is blocking; the async entry points in [`crate::ingest`] run it inside
//! `tokio::task::spawn_blocking`.
//!
//! Rasters are returned as [`PageRaster`] together with the page's declared
//! size in PDF points. The two differ whenever the render scale is not 1.0,
//! and the split writer needs both to map pixel clips back to page space.
//! The geometry also records where the visible box sits in user space and
//! the page's `/Rotate`, since the raster shows the page after both.

use crate::error::PrepError;
use crate::pipeline::raster::PageRaster;
use pdfium_render::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Points per inch in PDF user space.
pub const POINTS_PER_INCH: f32 = 72.0;

/// Raster and declared dimensions of one page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    /// Rendered width in pixels.
    pub raster_width: u32,
    /// Rendered height in pixels.
    pub raster_height: u32,
    /// Declared page width in PDF points.
    pub declared_width: f32,
    /// Declared page height in PDF points.
    pub declared_height: f32,
    /// Left edge of the visible (crop) box in PDF user space.
    #[serde(default)]
    pub origin_x: f32,
    /// Bottom edge of the visible (crop) box in PDF user space.
    #[serde(default)]
    pub origin_y: f32,
    /// Clockwise display rotation in degrees: 0, 90, 180 or 270.
    #[serde(default)]
    pub rotation: u16,
}

impl PageGeometry {
    /// Geometry of a page rendered at one pixel per point.
    pub fn at_unit_scale(declared_width: f32, declared_height: f32) -> Self {
        Self {
            raster_width: declared_width.round() as u32,
            raster_height: declared_height.round() as u32,
            declared_width,
            declared_height,
            origin_x: 0.0,
            origin_y: 0.0,
            rotation: 0,
        }
    }

    /// Same page, with its visible box at (`x`, `y`) in user space.
    pub fn with_origin(mut self, x: f32, y: f32) -> Self {
        self.origin_x = x;
        self.origin_y = y;
        self
    }

    /// Same page, displayed rotated clockwise by `degrees`.
    pub fn with_rotation(mut self, degrees: u16) -> Self {
        self.rotation = degrees % 360;
        self
    }

    /// Map a point of the displayed page (points, top-left origin, as the
    /// raster shows it) to PDF user space (bottom-left origin, unrotated).
    pub fn to_user_space(&self, x: f32, y: f32) -> (f32, f32) {
        // Unrotated box size: odd quarter turns swap the displayed axes.
        let (w, h) = match self.rotation {
            90 | 270 => (self.declared_height, self.declared_width),
            _ => (self.declared_width, self.declared_height),
        };
        let (u, v) = match self.rotation {
            90 => (y, x),
            180 => (w - x, y),
            270 => (w - y, h - x),
            _ => (x, h - y),
        };
        (self.origin_x + u, self.origin_y + v)
    }

    /// Points per raster pixel, horizontally and vertically.
    pub fn points_per_pixel(&self) -> (f32, f32) {
        let sx = if self.raster_width == 0 {
            1.0
        } else {
            self.declared_width / self.raster_width as f32
        };
        let sy = if self.raster_height == 0 {
            1.0
        } else {
            self.declared_height / self.raster_height as f32
        };
        (sx, sy)
    }
}

/// Bind to a pdfium shared library.
///
/// Lookup order: `PDFIUM_LIB_PATH` (file or directory), the working
/// directory, then the system library search path.
pub fn bind_pdfium() -> Result<Pdfium, PrepError> {
    let from_env = std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from);

    let bindings = match from_env {
        Some(path) => {
            let lib = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&path)
            } else {
                path
            };
            Pdfium::bind_to_library(&lib)
        }
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| PrepError::PdfiumBindingFailed(format!("{e:?}")))?;

    Ok(Pdfium::new(bindings))
}

/// Open a PDF, mapping pdfium's load errors onto [`PrepError`].
pub fn open_document<'a>(
    pdfium: &'a Pdfium,
    pdf_path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, PrepError> {
    pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                PrepError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                PrepError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            PrepError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })
}

/// Number of pages in an open document.
pub fn page_count(document: &PdfDocument<'_>) -> usize {
    document.pages().len() as usize
}

/// Fetch a page by 0-based index.
pub fn page_at<'a>(document: &PdfDocument<'a>, idx: usize) -> Result<PdfPage<'a>, PrepError> {
    let total = page_count(document);
    if idx >= total {
        return Err(PrepError::PageOutOfRange {
            page: idx + 1,
            total,
        });
    }
    document
        .pages()
        .get(idx as PdfPageIndex)
        .map_err(|e| PrepError::RasterisationFailed {
            page: idx + 1,
            detail: format!("{:?}", e),
        })
}

/// Rasterise one page at `scale` pixels per point.
///
/// `idx` is the 0-based page index, used for error reporting.
pub fn render_page(
    page: &PdfPage<'_>,
    idx: usize,
    scale: f32,
) -> Result<(PageGeometry, PageRaster), PrepError> {
    let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| PrepError::RasterisationFailed {
            page: idx + 1,
            detail: format!("{:?}", e),
        })?;

    let image = bitmap.as_image();
    let (origin_x, origin_y) = visible_box_origin(page);
    let geometry = PageGeometry {
        raster_width: image.width(),
        raster_height: image.height(),
        declared_width: page.width().value,
        declared_height: page.height().value,
        origin_x,
        origin_y,
        rotation: rotation_degrees(page),
    };
    debug!(
        "Rendered page {} → {}x{} px ({}x{} pt)",
        idx + 1,
        geometry.raster_width,
        geometry.raster_height,
        geometry.declared_width,
        geometry.declared_height
    );

    Ok((geometry, PageRaster::from(image)))
}

/// Lower-left corner of the crop box, or of the media box when the page
/// has no crop box.
fn visible_box_origin(page: &PdfPage<'_>) -> (f32, f32) {
    let boundaries = page.boundaries();
    match boundaries.crop().or_else(|_| boundaries.media()) {
        Ok(b) => (b.bounds.left().value, b.bounds.bottom().value),
        Err(_) => (0.0, 0.0),
    }
}

fn rotation_degrees(page: &PdfPage<'_>) -> u16 {
    match page.rotation() {
        Ok(PdfPageRenderRotation::Degrees90) => 90,
        Ok(PdfPageRenderRotation::Degrees180) => 180,
        Ok(PdfPageRenderRotation::Degrees270) => 270,
        _ => 0,
    }
}

/// Render scale for a target DPI.
pub fn scale_for_dpi(dpi: u32) -> f32 {
    dpi as f32 / POINTS_PER_INCH
}
