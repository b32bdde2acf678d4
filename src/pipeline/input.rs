//! Input resolution: validate user-supplied paths before any stage runs.
//!
//! pdfium crashes or returns opaque errors on non-PDF input, so PDF paths are
//! checked for existence, readability and the `%PDF` magic bytes first. Text
//! inputs (markdown, signal JSON) are read as UTF-8 with the same error
//! mapping.

use crate::error::PrepError;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Validate a local PDF path, checking existence, permissions and magic bytes.
pub fn resolve_pdf(path: &Path) -> Result<PathBuf, PrepError> {
    if !path.exists() {
        return Err(PrepError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    match std::fs::File::open(path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(PrepError::NotAPdf {
                    path: path.to_path_buf(),
                    magic,
                });
            }
        }
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            return Err(PrepError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(PrepError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path.to_path_buf())
}

fn map_read_error(path: &Path, e: std::io::Error) -> PrepError {
    match e.kind() {
        ErrorKind::NotFound => PrepError::FileNotFound {
            path: path.to_path_buf(),
        },
        ErrorKind::PermissionDenied => PrepError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => PrepError::InputReadFailed {
            path: path.to_path_buf(),
            source: e,
        },
    }
}

/// Read a UTF-8 text file.
pub async fn read_text(path: &Path) -> Result<String, PrepError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| map_read_error(path, e))
}

/// Blocking variant of [`read_text`].
pub fn read_text_blocking(path: &Path) -> Result<String, PrepError> {
    std::fs::read_to_string(path).map_err(|e| map_read_error(path, e))
}

/// The `*.md` files directly inside `dir`, sorted by path.
pub async fn markdown_files(dir: &Path) -> Result<Vec<PathBuf>, PrepError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| map_read_error(dir, e))?;

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| map_read_error(dir, e))?
    {
        let path = entry.path();
        let is_md = path.extension().is_some_and(|ext| ext == "md");
        if is_md && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_pdf_is_not_found() {
        let err = resolve_pdf(Path::new("/definitely/not/here.pdf")).unwrap_err();
        assert!(matches!(err, PrepError::FileNotFound { .. }));
    }

    #[test]
    fn non_pdf_is_rejected_by_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.pdf");
        std::fs::write(&path, b"PK\x03\x04zip").unwrap();
        match resolve_pdf(&path).unwrap_err() {
            PrepError::NotAPdf { magic, .. } => assert_eq!(&magic, b"PK\x03\x04"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn pdf_magic_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.pdf");
        std::fs::write(&path, b"%PDF-1.7\n").unwrap();
        assert_eq!(resolve_pdf(&path).unwrap(), path);
    }

    #[tokio::test]
    async fn markdown_files_are_filtered_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.md", "a.md", "notes.txt"] {
            std::fs::write(dir.path().join(name), "x").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub.md")).unwrap();
        let files = markdown_files(dir.path()).await.unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.md", "b.md"]);
    }

    #[tokio::test]
    async fn invalid_utf8_is_a_read_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.md");
        std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        assert!(matches!(
            read_text(&path).await.unwrap_err(),
            PrepError::InputReadFailed { .. }
        ));
    }
}
