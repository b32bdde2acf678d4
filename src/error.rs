//! Error types for the edgequake-docprep library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PrepError`] — **Fatal**: the document cannot be processed at all
//!   (bad input file, wrong password, a page raster in a colour layout we
//!   cannot interpret). Returned as `Err(PrepError)` from the top-level
//!   operations.
//!
//! * [`PageError`] — **Non-fatal**: text extraction or PNG export failed for
//!   a single page. Stored inside [`crate::output::PageRecord`]; the page
//!   still gets an (empty) block list and the remaining pages are processed.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-docprep library.
#[derive(Debug, Error)]
pub enum PrepError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// No file at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Magic bytes are not `%PDF`.
    #[error("'{path}' is not a PDF (starts with {magic:?})")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// A text input could not be read (missing, unreadable or not UTF-8).
    #[error("Failed to read '{path}': {source}")]
    InputReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// pdfium could not parse the document.
    #[error("Cannot open PDF '{path}': {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    #[error("PDF '{path}' is encrypted; pass --password or set DOCPREP_PASSWORD")]
    PasswordRequired { path: PathBuf },

    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// A page index exceeds the actual page count.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    #[error("Page {page}: rendering failed: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// A rendered page has a colour layout other than 3 colour channels or
    /// 1 grey channel (alpha excluded).
    #[error("Page {page}: unsupported number of colour channels: {channels}")]
    UnsupportedChannels { page: usize, channels: u8 },

    /// Building or saving the split PDF failed inside pdfium.
    #[error("Failed to write PDF '{path}': {detail}")]
    PdfWriteFailed { path: PathBuf, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config / runtime ──────────────────────────────────────────────────
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
You can:\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium (file or directory).\n\
  • Place libpdfium next to the executable or in the working directory.\n\
  • Install pdfium system-wide so the loader can find it.\n"
    )]
    PdfiumBindingFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A per-page failure that does not stop the run.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The page text layer could not be read.
    #[error("Page {page}: text extraction failed: {detail}")]
    ExtractionFailed { page: usize, detail: String },

    /// The page image could not be encoded or written.
    #[error("Page {page}: image export failed: {detail}")]
    ImageExportFailed { page: usize, detail: String },
}
