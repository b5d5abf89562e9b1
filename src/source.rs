//! The PDF collaborator: page text, layout blocks and page images.
//!
//! Parsing and rasterisation are delegated to a PDF library; the
//! orchestrator only sees the [`PdfSource`] trait. The production
//! implementation is [`crate::pipeline::render::PdfiumSource`]; tests
//! substitute in-memory sources.

use crate::config::RenderQuality;
use crate::error::{CatalogError, PageError};
use crate::output::DocumentMetadata;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One page as produced by the PDF collaborator. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    /// 1-indexed page number.
    pub page_number: usize,
    pub raw_text: String,
    pub text_blocks: Vec<TextBlock>,
    /// Page width and height in points.
    pub page_size: (f32, f32),
}

impl PageRecord {
    /// A page with text only, no layout information.
    pub fn from_text(page_number: usize, raw_text: impl Into<String>) -> Self {
        Self {
            page_number,
            raw_text: raw_text.into(),
            text_blocks: Vec::new(),
            page_size: (0.0, 0.0),
        }
    }
}

/// A run of text with its bounding box, in page points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

/// Read access to a PDF document.
///
/// `load` must succeed before any other method is called; it is the only
/// fatal operation. Per-page failures come back as [`PageError`] so the
/// caller can skip the page and continue.
pub trait PdfSource {
    /// Open the document.
    fn load(&mut self) -> Result<(), CatalogError>;

    /// Document metadata; valid after `load`.
    fn metadata(&self) -> DocumentMetadata;

    /// Number of pages; valid after `load`.
    fn page_count(&self) -> usize;

    /// Text and layout of one 1-indexed page.
    fn page(&self, page_number: usize) -> Result<PageRecord, PageError>;

    /// Render one 1-indexed page as `page_{n}.png` under `dir` and return its path.
    fn render_page_image(
        &self,
        page_number: usize,
        quality: RenderQuality,
        dir: &Path,
    ) -> Result<PathBuf, PageError>;
}

/// File name used for a rendered page image.
pub fn page_image_name(page_number: usize) -> String {
    format!("page_{page_number}.png")
}
