//! # catalog-extract
//!
//! Extract structured catalog listings (part numbers, fitment, years) from
//! PDF catalogs using native text, OCR and language models.
//!
//! ## Why this crate?
//!
//! Parts catalogs mix clean text pages, scanned tables and pure images.
//! Sending every page to a vision model is slow and expensive; trusting
//! native text alone misses scanned pages. This crate classifies each page
//! first, skips boilerplate (table of contents, warnings, index), and then
//! tries the cheapest extraction that works, falling back page by page.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     resolve local file or download from URL
//!  ├─ 2. Read      page text + text segments via pdfium
//!  ├─ 3. Classify  product page? text / hybrid / vision?
//!  ├─ 4. Render    page images, eagerly or lazily (minimize_memory)
//!  ├─ 5. Extract   OCR+text ─▶ text ─▶ vision, first non-empty wins
//!  ├─ 6. Parse     JSON array out of fenced or chatty LLM replies
//!  └─ 7. Output    ordered items + per-page analysis + run stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use catalog_extract::{extract, ExtractionConfig, ExtractionMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / GEMINI_API_KEY / …
//!     let config = ExtractionConfig::builder()
//!         .mode(ExtractionMode::Streaming)
//!         .catalog_type("automotive")
//!         .build()?;
//!     let result = extract("catalog.pdf", &config).await?.into_result()?;
//!     println!("{}", serde_json::to_string_pretty(&result.items)?);
//!     eprintln!(
//!         "{} items from {} pages",
//!         result.stats.items_extracted, result.stats.pages_with_items
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `catalog-extract` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! catalog-extract = { version = "0.3", default-features = false }
//! ```
//!
//! ## Testing without services
//!
//! [`run`] takes its collaborators as trait objects ([`PdfSource`],
//! [`StructuredExtractor`], [`OcrEngine`] inside an [`OcrToolkit`]), so the
//! whole orchestration can be driven by in-memory fakes.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod aggregate;
pub mod classify;
pub mod config;
pub mod dump;
pub mod error;
pub mod extract;
pub mod ocr;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod source;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use aggregate::ResultAggregator;
pub use classify::{
    ClassifierRules, Confidence, ExtractionMethod, PageAnalysis, PageClassifier, ProductVerdict,
    StrategyDecision,
};
pub use config::{ExtractionConfig, ExtractionConfigBuilder, ExtractionMode, RenderQuality};
pub use dump::{default_dump_path, dump_document, dump_pdf, write_dump, DocumentDump};
pub use error::{CatalogError, PageError};
pub use extract::{
    analyze, analyze_source, extract, extract_from_bytes, extract_sync, extract_to_file, inspect,
    ocr_toolkit, run, run_batch, ImageWorkspace,
};
pub use ocr::{GoogleVisionEngine, OcrEngine, OcrEngineKind, OcrToolkit, TesseractEngine};
pub use output::{
    DocumentMetadata, ExtractedItem, ExtractionStep, PageOutcome, RunResult, RunStats,
};
pub use pipeline::llm::{LlmExtractor, StructuredExtractor};
pub use pipeline::render::PdfiumSource;
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use source::{PageRecord, PdfSource, TextBlock};
pub use stream::{extract_stream, run_streaming, stream_pages, PageStream, StreamedPage};
