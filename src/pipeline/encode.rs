//! Output encoding: page PNGs, JSON documents, and atomic file writes.
//!
//! Everything the crate writes goes through [`write_atomic`] or
//! [`write_atomic_async`]: the bytes land in a temp file next to the target
//! and are renamed over it, so a crash never leaves a half-written file where
//! a downstream stage would pick it up.

use crate::error::PrepError;
use image::DynamicImage;
use serde::Serialize;
use std::ffi::OsString;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of a page image: `page_001.png` for page 1.
pub fn page_image_name(page_num: usize) -> String {
    format!("page_{:03}.png", page_num)
}

/// Encode a rendered page as PNG.
///
/// PNG keeps rendered text crisp; the exported images are read by OCR and
/// vision models downstream.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!("Encoded {}x{} image → {} bytes PNG", img.width(), img.height(), buf.len());
    Ok(buf)
}

/// Pretty-printed JSON bytes with a trailing newline.
pub fn to_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, PrepError> {
    let mut bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| PrepError::Internal(format!("JSON encoding failed: {e}")))?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Write `bytes` to `path` via a temp file in the same directory.
///
/// Parent directories are created as needed.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PrepError> {
    let write_err = |source: std::io::Error| PrepError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let dir = parent_dir(path);
    std::fs::create_dir_all(&dir).map_err(write_err)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".docprep-")
        .suffix(".tmp")
        .tempfile_in(&dir)
        .map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.flush().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// Async variant of [`write_atomic`] for the tokio file pipeline.
pub async fn write_atomic_async(path: &Path, bytes: &[u8]) -> Result<(), PrepError> {
    let write_err = |source: std::io::Error| PrepError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    tokio::fs::create_dir_all(parent_dir(path))
        .await
        .map_err(write_err)?;

    let tmp_path = tmp_path_for(path);
    tokio::fs::write(&tmp_path, bytes).await.map_err(write_err)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }
    Ok(())
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// `dir/name.ext` → `dir/name.ext.tmp`.
fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn page_names_are_zero_padded() {
        assert_eq!(page_image_name(1), "page_001.png");
        assert_eq!(page_image_name(42), "page_042.png");
        assert_eq!(page_image_name(1234), "page_1234.png");
    }

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let png = encode_png(&img).expect("encode should succeed");
        assert_eq!(&png[1..4], b"PNG");
        let decoded = image::load_from_memory(&png).expect("valid png");
        assert_eq!(decoded.width(), 10);
    }

    #[test]
    fn tmp_path_appends_suffix() {
        assert_eq!(tmp_path_for(Path::new("out/a.md")), PathBuf::from("out/a.md.tmp"));
    }

    #[test]
    fn atomic_write_creates_parents_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("blocks.json");
        write_atomic(&target, b"first").unwrap();
        write_atomic(&target, b"second").unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"second");
        let leftovers = std::fs::read_dir(target.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn async_atomic_write_keeps_bytes_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("doc.md");
        write_atomic_async(&target, b"a\r\nb\r\n").await.unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"a\r\nb\r\n");
        assert!(!dir.path().join("doc.md.tmp").exists());
    }

    #[test]
    fn json_has_trailing_newline() {
        let bytes = to_json_bytes(&vec![1, 2]).unwrap();
        assert_eq!(bytes.last(), Some(&b'\n'));
    }
}
