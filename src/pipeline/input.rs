//! Input resolution: every document reaches pdfium as a local `%PDF` file.
//!
//! There are three ways in: a local path (checked in place), an http(s) URL
//! (downloaded) and bytes already in memory. The last two are staged into a
//! `TempDir` owned by the returned [`ResolvedInput`], so the file lives
//! exactly as long as the handle. The magic bytes are checked before
//! anything is written or opened, so a mislabelled file fails with a
//! readable error instead of a pdfium one.

use crate::error::CatalogError;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// File name used when a URL does not end in one.
pub const STAGED_FILE_NAME: &str = "document.pdf";

/// A local PDF, possibly staged into a temp dir that is removed on drop.
#[derive(Debug)]
pub struct ResolvedInput {
    path: PathBuf,
    staging: Option<TempDir>,
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file lives in a temp dir owned by this handle.
    pub fn is_staged(&self) -> bool {
        self.staging.is_some()
    }
}

pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a local path or an http(s) URL to a checked local PDF.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, CatalogError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CatalogError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        let bytes = download(input, timeout_secs).await?;
        stage_bytes(&bytes, &filename_from_url(input))
    } else {
        check_local(Path::new(input))
    }
}

/// Write in-memory PDF bytes to a fresh temp dir as `name`.
pub fn stage_bytes(bytes: &[u8], name: &str) -> Result<ResolvedInput, CatalogError> {
    let staging = tempfile::Builder::new()
        .prefix("catalog-input-")
        .tempdir()
        .map_err(|e| CatalogError::Internal(format!("input temp dir: {e}")))?;
    let path = staging.path().join(name);
    check_magic(bytes, &path)?;

    std::fs::write(&path, bytes)
        .map_err(|e| CatalogError::Internal(format!("staging {}: {e}", path.display())))?;
    debug!("Staged {} bytes at {}", bytes.len(), path.display());

    Ok(ResolvedInput {
        path,
        staging: Some(staging),
    })
}

fn check_local(path: &Path) -> Result<ResolvedInput, CatalogError> {
    let header = read_header(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => CatalogError::FileNotFound {
            path: path.to_path_buf(),
        },
        ErrorKind::PermissionDenied => CatalogError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => CatalogError::InvalidInput {
            input: path.display().to_string(),
        },
    })?;
    check_magic(&header, path)?;

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput {
        path: path.to_path_buf(),
        staging: None,
    })
}

fn read_header(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut header = Vec::with_capacity(PDF_MAGIC.len());
    std::fs::File::open(path)?
        .take(PDF_MAGIC.len() as u64)
        .read_to_end(&mut header)?;
    Ok(header)
}

/// Files shorter than the magic are rejected too.
fn check_magic(bytes: &[u8], path: &Path) -> Result<(), CatalogError> {
    if bytes.starts_with(PDF_MAGIC) {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = bytes.len().min(magic.len());
    magic[..n].copy_from_slice(&bytes[..n]);
    Err(CatalogError::NotAPdf {
        path: path.to_path_buf(),
        magic,
    })
}

async fn download(url: &str, timeout_secs: u64) -> Result<Vec<u8>, CatalogError> {
    info!("Downloading PDF from {}", url);

    let to_error = |e: reqwest::Error| {
        if e.is_timeout() {
            CatalogError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            CatalogError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(to_error)?;
    let bytes = client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(to_error)?
        .bytes()
        .await
        .map_err(to_error)?;

    info!("Downloaded {} bytes", bytes.len());
    Ok(bytes.to_vec())
}

/// Last path segment of the URL when it looks like a file name.
fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|last| last.contains('.'))
        .unwrap_or_else(|| STAGED_FILE_NAME.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[tokio::test]
    async fn empty_input_is_invalid() {
        let err = resolve_input("  ", 5).await.unwrap_err();
        assert!(matches!(err, CatalogError::InvalidInput { .. }));
    }

    #[test]
    fn missing_local_file() {
        let err = check_local(Path::new("/nonexistent/catalog.pdf")).unwrap_err();
        assert!(matches!(err, CatalogError::FileNotFound { .. }));
    }

    #[test]
    fn rejects_non_pdf_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parts.pdf");
        std::fs::write(&path, b"PK\x03\x04 not a pdf").unwrap();
        match check_local(&path).unwrap_err() {
            CatalogError::NotAPdf { magic, .. } => assert_eq!(&magic, b"PK\x03\x04"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parts.pdf");
        std::fs::write(&path, b"%P").unwrap();
        match check_local(&path).unwrap_err() {
            CatalogError::NotAPdf { magic, .. } => assert_eq!(&magic, b"%P\0\0"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn accepts_pdf_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parts.pdf");
        std::fs::write(&path, b"%PDF-1.7\n").unwrap();
        let resolved = check_local(&path).unwrap();
        assert_eq!(resolved.path(), path.as_path());
        assert!(!resolved.is_staged());
    }

    #[test]
    fn staged_bytes_live_as_long_as_the_handle() {
        let resolved = stage_bytes(b"%PDF-1.4\n%%EOF\n", "catalog.pdf").unwrap();
        let path = resolved.path().to_path_buf();
        assert!(resolved.is_staged());
        assert!(path.ends_with("catalog.pdf"));
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4\n%%EOF\n");

        drop(resolved);
        assert!(!path.exists());
    }

    #[test]
    fn staging_rejects_non_pdf_bytes() {
        match stage_bytes(b"<html>", STAGED_FILE_NAME).unwrap_err() {
            CatalogError::NotAPdf { magic, .. } => assert_eq!(&magic, b"<htm"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn filename_from_url_path() {
        assert_eq!(
            filename_from_url("https://example.com/catalogs/brake-2021.pdf"),
            "brake-2021.pdf"
        );
        assert_eq!(filename_from_url("https://example.com/download"), STAGED_FILE_NAME);
        assert_eq!(filename_from_url("not a url"), STAGED_FILE_NAME);
    }
}
