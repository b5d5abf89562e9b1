//! Output types: document metadata, per-page outcomes and the run result.

use crate::classify::PageAnalysis;
use crate::config::ExtractionMode;
use crate::error::{CatalogError, PageError};
use serde::{Deserialize, Serialize};

/// One extracted catalog entry, exactly as the LLM returned it.
///
/// No schema is enforced; fields vary by catalog.
pub type ExtractedItem = serde_json::Map<String, serde_json::Value>;

/// Metadata read from the PDF without touching page content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub filename: String,
    pub page_count: usize,
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
}

/// Which step of the per-page fallback chain produced the items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStep {
    /// OCR text combined with native text.
    Multimodal,
    /// Native text only.
    Text,
    /// Page image sent to a vision model.
    Vision,
}

/// What happened to one page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageOutcome {
    pub page_number: usize,
    pub items: Vec<ExtractedItem>,
    /// The step that produced `items`; None when nothing was extracted.
    pub step: Option<ExtractionStep>,
    pub image_rendered: bool,
    pub llm_calls: usize,
    /// Degraded steps, in the order they failed.
    pub errors: Vec<PageError>,
}

impl PageOutcome {
    pub fn new(page_number: usize) -> Self {
        Self {
            page_number,
            ..Default::default()
        }
    }
}

/// Summary counters for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub mode: Option<ExtractionMode>,
    /// Pages in the document.
    pub total_pages: usize,
    /// Pages given a classifier decision.
    pub analyzed_pages: usize,
    /// Analysed pages judged to be product pages.
    pub product_pages: usize,
    /// Pages sent through the extraction chain.
    pub processed_pages: usize,
    pub pages_with_items: usize,
    pub items_extracted: usize,
    pub images_rendered: usize,
    pub llm_calls: usize,
    pub failed_steps: usize,
    pub multimodal_hits: usize,
    pub text_hits: usize,
    pub vision_hits: usize,
    pub duration_ms: u64,
}

/// The packaged result of one run. Built once, never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub pdf_info: Option<DocumentMetadata>,
    /// Items in page-visitation order.
    pub items: Vec<ExtractedItem>,
    /// Page count of the document.
    pub pages: usize,
    pub analysis: Vec<PageAnalysis>,
    pub stats: RunStats,
}

impl RunResult {
    /// A failed run: nothing was extracted.
    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(reason.into()),
            pdf_info: None,
            items: Vec::new(),
            pages: 0,
            analysis: Vec::new(),
            stats: RunStats::default(),
        }
    }

    /// Convert a failed run into `Err(CatalogError::RunFailed)`.
    pub fn into_result(self) -> Result<Self, CatalogError> {
        if self.success {
            Ok(self)
        } else {
            Err(CatalogError::RunFailed {
                reason: self.error.unwrap_or_else(|| "unknown error".to_string()),
            })
        }
    }
}
