//! Error types for the catalog-extract library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`CatalogError`] — **Fatal**: the run cannot proceed at all (bad input
//!   file, unreadable PDF, provider not configured). Returned as
//!   `Err(CatalogError)` from the top-level `extract*` functions.
//!
//! * [`PageError`] — **Non-fatal**: one step on one page failed (render
//!   glitch, OCR crash, network error, malformed LLM reply). Recorded inside
//!   [`crate::output::PageOutcome`]; the page contributes no items from that
//!   step and the run moves on.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the catalog-extract library.
#[derive(Debug, Error)]
pub enum CatalogError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// The source document could not be opened.
    #[error("Failed to load PDF '{path}': {detail}")]
    LoadFailed { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Run errors ────────────────────────────────────────────────────────
    /// A run finished with `success == false`.
    ///
    /// Returned by [`crate::output::RunResult::into_result`].
    #[error("Extraction run failed: {reason}")]
    RunFailed { reason: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output JSON file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not serialise a result or dump to JSON.
    #[error("Failed to serialise JSON: {0}")]
    Serialize(#[from] serde_json::Error),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for one extraction step.
///
/// Collaborator failures are caught at the page boundary and stored here;
/// the step is treated as having contributed nothing.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Reading the page text from the PDF failed.
    #[error("Page {page}: text extraction failed: {detail}")]
    ReadFailed { page: usize, detail: String },

    /// Rendering the page to an image failed.
    #[error("Page {page}: rendering failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// An OCR or cloud vision engine failed.
    #[error("OCR engine '{engine}' failed: {detail}")]
    OcrFailed { engine: String, detail: String },

    /// The LLM call failed.
    #[error("LLM call failed: {detail}")]
    LlmFailed { detail: String },

    /// The LLM call exceeded the configured timeout.
    #[error("LLM call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// A rendered image could not be read back for upload.
    #[error("Image '{path}' unreadable: {detail}")]
    ImageUnreadable { path: PathBuf, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_failed_display() {
        let e = CatalogError::LoadFailed {
            path: PathBuf::from("catalog.pdf"),
            detail: "bad xref".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("catalog.pdf"), "got: {msg}");
        assert!(msg.contains("bad xref"), "got: {msg}");
    }

    #[test]
    fn run_failed_display() {
        let e = CatalogError::RunFailed {
            reason: "Failed to load PDF".into(),
        };
        assert!(e.to_string().contains("Failed to load PDF"));
    }

    #[test]
    fn page_error_display_names_page() {
        let e = PageError::RenderFailed {
            page: 7,
            detail: "bitmap alloc".into(),
        };
        assert!(e.to_string().contains("Page 7"));
    }

    #[test]
    fn timeout_display() {
        let e = PageError::Timeout { secs: 60 };
        assert!(e.to_string().contains("60s"));
    }

    #[test]
    fn page_error_serialises() {
        let e = PageError::OcrFailed {
            engine: "tesseract".into(),
            detail: "exit 1".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("tesseract"));
        let back: PageError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
