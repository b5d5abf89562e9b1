//! Extraction orchestrator and the eager (whole-document) entry points.
//!
//! A run loads the document, classifies pages and sends each selected page
//! through the same fallback chain:
//!
//! ```text
//! OCR + native text ──▶ native text ──▶ page image
//!   (multimodal)          (text)         (vision)
//! ```
//!
//! The first step that yields a non-empty item list wins; later steps are
//! not called. Every collaborator failure is recorded on the page's
//! [`PageOutcome`] and the run moves on. Only a failure to load the
//! document ends the run early, as a [`RunResult::failure`].
//!
//! Pages are processed strictly one after another. Batch mode lives here;
//! streaming mode lives in [`crate::stream`] and shares the per-page code.

use crate::aggregate::ResultAggregator;
use crate::classify::{PageAnalysis, PageClassifier};
use crate::config::{ExtractionConfig, ExtractionMode};
use crate::error::{CatalogError, PageError};
use crate::ocr::OcrToolkit;
use crate::output::{
    DocumentMetadata, ExtractedItem, ExtractionStep, PageOutcome, RunResult, RunStats,
};
use crate::pipeline::llm::{LlmExtractor, StructuredExtractor};
use crate::pipeline::render::PdfiumSource;
use crate::pipeline::input::{self, ResolvedInput};
use crate::pipeline::response;
use crate::progress::ProgressCallback;
use crate::prompts::default_extraction_prompt;
use crate::source::{PageRecord, PdfSource};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Extract catalog items from a PDF file or URL.
///
/// This is the primary entry point for the library. It resolves the input,
/// binds pdfium, resolves the LLM provider, detects the OCR engines once and
/// then runs the configured mode.
///
/// # Returns
/// `Ok(RunResult)` whenever the run could be set up. A document that fails
/// to load yields `success == false`; call [`RunResult::into_result`] to
/// turn that into an error.
///
/// # Errors
/// - input not found, unreadable, not a PDF, or download failure
/// - pdfium library cannot be bound
/// - no LLM provider configured
pub async fn extract(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<RunResult, CatalogError> {
    let input_str = input_str.as_ref();
    info!("Starting extraction: {}", input_str);

    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    extract_resolved(&resolved, config).await
}

/// Set up the collaborators for a checked local PDF and run.
async fn extract_resolved(
    resolved: &ResolvedInput,
    config: &ExtractionConfig,
) -> Result<RunResult, CatalogError> {
    let extractor = LlmExtractor::from_config(config)?;
    let ocr = ocr_toolkit(config).await;
    let mut source = PdfiumSource::open(resolved.path(), config.password.clone())?;

    Ok(run(&mut source, &extractor, ocr.as_ref(), config).await)
}

/// Extract and write the run result as pretty JSON to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files. A run
/// that fails to load the document is returned as an error and nothing is
/// written.
pub async fn extract_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<RunStats, CatalogError> {
    let result = extract(input_str, config).await?.into_result()?;
    write_json_atomic(output_path.as_ref(), &serde_json::to_string_pretty(&result)?).await?;
    Ok(result.stats)
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<RunResult, CatalogError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CatalogError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(input_str, config))
}

/// Extract from PDF bytes held in memory.
///
/// The bytes are checked for the `%PDF` magic and staged to a temp file
/// that is removed on return.
pub async fn extract_from_bytes(
    bytes: &[u8],
    config: &ExtractionConfig,
) -> Result<RunResult, CatalogError> {
    let staged = input::stage_bytes(bytes, input::STAGED_FILE_NAME)?;
    extract_resolved(&staged, config).await
}

/// Classify pages without any LLM or OCR calls.
///
/// Honours `max_pages`. Returns one [`PageAnalysis`] per page read.
pub async fn analyze(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<Vec<PageAnalysis>, CatalogError> {
    let resolved = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    let mut source = PdfiumSource::open(resolved.path(), config.password.clone())?;
    analyze_source(&mut source, config)
}

/// [`analyze`] over any loaded-or-not [`PdfSource`].
pub fn analyze_source(
    source: &mut dyn PdfSource,
    config: &ExtractionConfig,
) -> Result<Vec<PageAnalysis>, CatalogError> {
    source.load()?;
    let classifier = config.classifier();
    let limit = config.page_limit(source.page_count());
    Ok((1..=limit)
        .map(|n| {
            let text = source.page(n).map(|r| r.raw_text).unwrap_or_else(|e| {
                warn!("{}", e);
                String::new()
            });
            classifier.analyze(n, &text)
        })
        .collect())
}

/// Read PDF metadata without extracting anything.
///
/// Does not require an LLM provider or API key. Uses the download timeout
/// and password from `config`.
pub async fn inspect(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<DocumentMetadata, CatalogError> {
    let resolved = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    let mut source = PdfiumSource::open(resolved.path(), config.password.clone())?;
    source.load()?;
    Ok(source.metadata())
}

/// Detect the configured OCR engines once for a run.
///
/// Returns None when the multimodal step is disabled, so no engine is
/// checked in memory-conservative mode.
pub async fn ocr_toolkit(config: &ExtractionConfig) -> Option<OcrToolkit> {
    if !config.multimodal_enabled() || config.ocr_engines.is_empty() {
        return None;
    }
    let toolkit = OcrToolkit::detect(
        &config.ocr_engines,
        Duration::from_secs(config.api_timeout_secs),
    )
    .await;
    toolkit.is_available().then_some(toolkit)
}

/// Run the configured mode over already-constructed collaborators.
///
/// `ocr` is borrowed for the whole run and never rebuilt.
pub async fn run(
    source: &mut dyn PdfSource,
    extractor: &dyn StructuredExtractor,
    ocr: Option<&OcrToolkit>,
    config: &ExtractionConfig,
) -> RunResult {
    match config.mode {
        ExtractionMode::Batch => run_batch(source, extractor, ocr, config).await,
        ExtractionMode::Streaming => {
            crate::stream::run_streaming(source, extractor, ocr, config).await
        }
    }
}

/// Batch mode: read and classify every page, then extract the product pages.
///
/// With `analyze_pages` off the working set is every page read. Images are
/// rendered for the whole working set up front unless `minimize_memory` is
/// set, in which case they are rendered lazily for candidate pages only.
pub async fn run_batch(
    source: &mut dyn PdfSource,
    extractor: &dyn StructuredExtractor,
    ocr: Option<&OcrToolkit>,
    config: &ExtractionConfig,
) -> RunResult {
    let start = Instant::now();
    let (metadata, workspace) = match prepare(source, config) {
        Ok(prepared) => prepared,
        Err(e) => return RunResult::failure(e.to_string()),
    };
    let limit = config.page_limit(metadata.page_count);
    info!("Batch extraction over {} of {} pages", limit, metadata.page_count);

    let classifier = config.classifier();
    let prompt = extraction_prompt(config);
    let ctx = PageContext {
        source: &*source,
        extractor,
        ocr,
        config,
        workspace: &workspace,
        classifier: &classifier,
        prompt: &prompt,
    };
    let mut aggregator = ResultAggregator::new(ExtractionMode::Batch);
    if let Some(cb) = ctx.callback() {
        cb.on_run_start(limit);
    }

    // ── Read and classify every page ─────────────────────────────────────
    let pages: Vec<(PageRecord, Option<PageError>)> = (1..=limit).map(|n| ctx.read_page(n)).collect();

    let mut work: Vec<(&PageRecord, PageOutcome)> = Vec::new();
    for (record, read_error) in &pages {
        let analysis = classifier.analyze(record.page_number, &record.raw_text);
        debug!(
            "Page {}: product={} ({}), method={}",
            record.page_number,
            analysis.product.is_product_page,
            analysis.product.confidence,
            analysis.strategy.method
        );
        let selected = !config.analyze_pages || analysis.product.is_product_page;
        aggregator.record_analysis(analysis);

        if selected {
            let mut outcome = PageOutcome::new(record.page_number);
            outcome.errors.extend(read_error.clone());
            work.push((record, outcome));
        } else {
            if let Some(e) = read_error {
                aggregator.record_error(e);
            }
            if let Some(cb) = ctx.callback() {
                cb.on_page_skipped(record.page_number, limit);
            }
        }
    }
    info!("{} of {} pages selected for extraction", work.len(), limit);

    // ── Pre-render the working set ───────────────────────────────────────
    let images: Vec<Option<PathBuf>> = if config.minimize_memory {
        vec![None; work.len()]
    } else {
        work.iter_mut()
            .map(|(record, outcome)| ctx.render(record.page_number, outcome))
            .collect()
    };

    // ── Extract ──────────────────────────────────────────────────────────
    for ((record, mut outcome), image) in work.into_iter().zip(images) {
        let page_num = record.page_number;
        if let Some(cb) = ctx.callback() {
            cb.on_page_start(page_num, limit);
        }

        let image = match image {
            Some(path) => Some(path),
            None if config.minimize_memory
                && classifier.is_extraction_candidate(&record.raw_text) =>
            {
                ctx.render(page_num, &mut outcome)
            }
            None => None,
        };

        ctx.process(record, image.as_deref(), &mut outcome).await;
        if let Some(cb) = ctx.callback() {
            cb.on_page_complete(page_num, limit, outcome.items.len());
        }
        aggregator.append(outcome);
    }

    finish(aggregator, metadata, &ctx, start)
}

/// Load the source and set up the image directory.
pub(crate) fn prepare(
    source: &mut dyn PdfSource,
    config: &ExtractionConfig,
) -> Result<(DocumentMetadata, ImageWorkspace), CatalogError> {
    source.load().map_err(|e| {
        warn!("Failed to load PDF: {}", e);
        e
    })?;
    let metadata = source.metadata();
    let workspace = ImageWorkspace::for_config(config)?;
    Ok((metadata, workspace))
}

pub(crate) fn finish(
    aggregator: ResultAggregator,
    metadata: DocumentMetadata,
    ctx: &PageContext<'_>,
    start: Instant,
) -> RunResult {
    let result = aggregator.finalize(metadata, start.elapsed());
    if let Some(cb) = ctx.callback() {
        cb.on_run_complete(result.stats.processed_pages, result.items.len());
    }
    info!(
        "Extraction done: {} items from {}/{} pages in {}ms",
        result.items.len(),
        result.stats.pages_with_items,
        result.stats.processed_pages,
        result.stats.duration_ms
    );
    result
}

/// The configured extraction prompt or the built-in one.
pub(crate) fn extraction_prompt(config: &ExtractionConfig) -> String {
    config
        .extraction_prompt
        .clone()
        .unwrap_or_else(|| default_extraction_prompt(&config.catalog_type))
}

// ── Per-page processing ──────────────────────────────────────────────────

/// Everything one page needs, borrowed for the length of a run.
pub(crate) struct PageContext<'a> {
    pub source: &'a dyn PdfSource,
    pub extractor: &'a dyn StructuredExtractor,
    pub ocr: Option<&'a OcrToolkit>,
    pub config: &'a ExtractionConfig,
    pub workspace: &'a ImageWorkspace,
    pub classifier: &'a PageClassifier,
    pub prompt: &'a str,
}

impl PageContext<'_> {
    pub fn callback(&self) -> Option<&ProgressCallback> {
        self.config.progress_callback.as_ref()
    }

    /// Read one page; a failed read becomes an empty page plus its error.
    pub fn read_page(&self, page_number: usize) -> (PageRecord, Option<PageError>) {
        match self.source.page(page_number) {
            Ok(record) => (record, None),
            Err(e) => {
                warn!("{}", e);
                (PageRecord::from_text(page_number, ""), Some(e))
            }
        }
    }

    /// Render one page into the workspace.
    pub fn render(&self, page_number: usize, outcome: &mut PageOutcome) -> Option<PathBuf> {
        match self.source.render_page_image(
            page_number,
            self.config.render_quality,
            self.workspace.dir(),
        ) {
            Ok(path) => {
                outcome.image_rendered = true;
                Some(path)
            }
            Err(e) => {
                warn!("{}", e);
                outcome.errors.push(e);
                None
            }
        }
    }

    /// Run the fallback chain for one page, filling `outcome`.
    pub async fn process(&self, record: &PageRecord, image: Option<&Path>, outcome: &mut PageOutcome) {
        if !self.extractor.is_available() {
            debug!("Page {}: LLM extractor unavailable", record.page_number);
            return;
        }
        let raw = record.raw_text.as_str();

        // 1. OCR text merged into native text.
        if self.config.multimodal_enabled() {
            if let (Some(ocr), Some(image)) = (self.ocr.filter(|o| o.is_available()), image) {
                let (combined, reading) = ocr.combine_with_text(image, raw).await;
                outcome.errors.extend(reading.errors);
                if !combined.trim().is_empty() {
                    let items = self.structured(&combined, outcome).await;
                    if accept(items, ExtractionStep::Multimodal, outcome) {
                        return;
                    }
                }
            }
        }

        // 2. Native text alone.
        if raw.trim().chars().count() > self.config.min_text_chars {
            let items = self.structured(raw, outcome).await;
            if accept(items, ExtractionStep::Text, outcome) {
                return;
            }
        }

        // 3. Page image to a vision model.
        if let Some(image) = image {
            let items = self.vision(image, outcome).await;
            accept(items, ExtractionStep::Vision, outcome);
        }

        if outcome.items.is_empty() {
            debug!("Page {}: no items", record.page_number);
        }
    }

    async fn structured(&self, text: &str, outcome: &mut PageOutcome) -> Vec<ExtractedItem> {
        outcome.llm_calls += 1;
        let reply = self.extractor.extract_structured(text, self.prompt).await;
        self.items_from(reply, outcome)
    }

    async fn vision(&self, image: &Path, outcome: &mut PageOutcome) -> Vec<ExtractedItem> {
        outcome.llm_calls += 1;
        let reply = self.extractor.extract_from_image(image, self.prompt).await;
        self.items_from(reply, outcome)
    }

    fn items_from(
        &self,
        reply: Result<Option<String>, PageError>,
        outcome: &mut PageOutcome,
    ) -> Vec<ExtractedItem> {
        match reply {
            Ok(Some(raw)) => response::items_from_response(&raw),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Page {}: {}", outcome.page_number, e);
                outcome.errors.push(e);
                Vec::new()
            }
        }
    }
}

/// Keep `items` when non-empty; true means the chain stops here.
fn accept(items: Vec<ExtractedItem>, step: ExtractionStep, outcome: &mut PageOutcome) -> bool {
    if items.is_empty() {
        return false;
    }
    debug!(
        "Page {}: {} items via {:?}",
        outcome.page_number,
        items.len(),
        step
    );
    outcome.items = items;
    outcome.step = Some(step);
    true
}

// ── Image workspace ──────────────────────────────────────────────────────

/// Directory that receives rendered page images.
///
/// Either a run-scoped temp dir, removed on drop, or a caller-chosen
/// directory whose images are kept.
#[derive(Debug)]
pub struct ImageWorkspace {
    dir: PathBuf,
    _temp: Option<TempDir>,
}

impl ImageWorkspace {
    pub fn for_config(config: &ExtractionConfig) -> Result<Self, CatalogError> {
        match config.image_dir {
            Some(ref dir) => Self::at(dir),
            None => Self::temporary(),
        }
    }

    pub fn temporary() -> Result<Self, CatalogError> {
        let temp = tempfile::Builder::new()
            .prefix("catalog-pages-")
            .tempdir()
            .map_err(|e| CatalogError::Internal(format!("image temp dir: {e}")))?;
        Ok(Self {
            dir: temp.path().to_path_buf(),
            _temp: Some(temp),
        })
    }

    pub fn at(dir: &Path) -> Result<Self, CatalogError> {
        std::fs::create_dir_all(dir).map_err(|e| CatalogError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
            _temp: None,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether images are deleted once a page is done.
    pub fn is_temporary(&self) -> bool {
        self._temp.is_some()
    }

    /// Delete a page image from a temporary workspace.
    pub fn release(&self, image: &Path) {
        if !self.is_temporary() {
            return;
        }
        if let Err(e) = std::fs::remove_file(image) {
            debug!("Could not remove {}: {}", image.display(), e);
        }
    }
}

/// Write `contents` to `path` via a sibling temp file and rename.
pub(crate) async fn write_json_atomic(path: &Path, contents: &str) -> Result<(), CatalogError> {
    let write_failed = |e: std::io::Error| CatalogError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(write_failed)?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(write_failed)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temporary_workspace_releases_images() {
        let ws = ImageWorkspace::temporary().unwrap();
        let image = ws.dir().join("page_1.png");
        std::fs::write(&image, b"png").unwrap();
        assert!(ws.is_temporary());
        ws.release(&image);
        assert!(!image.exists());
    }

    #[test]
    fn fixed_workspace_keeps_images() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("pages");
        let ws = ImageWorkspace::at(&dir).unwrap();
        assert!(dir.is_dir());

        let image = ws.dir().join("page_2.png");
        std::fs::write(&image, b"png").unwrap();
        ws.release(&image);
        assert!(image.exists());
    }

    #[test]
    fn temporary_dir_removed_on_drop() {
        let ws = ImageWorkspace::temporary().unwrap();
        let dir = ws.dir().to_path_buf();
        drop(ws);
        assert!(!dir.exists());
    }

    #[test]
    fn prompt_override() {
        let config = ExtractionConfig::builder()
            .extraction_prompt("List parts.")
            .build()
            .unwrap();
        assert_eq!(extraction_prompt(&config), "List parts.");

        let config = ExtractionConfig::builder().catalog_type("marine").build().unwrap();
        assert!(extraction_prompt(&config).contains("marine"));
    }

    #[tokio::test]
    async fn atomic_write_creates_parent() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("out").join("result.json");
        write_json_atomic(&path, "{}").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn minimize_memory_skips_ocr_detection() {
        let config = ExtractionConfig::builder().minimize_memory(true).build().unwrap();
        let toolkit = tokio_test::block_on(ocr_toolkit(&config));
        assert!(toolkit.is_none());
    }

    #[tokio::test]
    async fn bytes_without_pdf_magic_are_rejected_up_front() {
        let err = extract_from_bytes(b"PK\x03\x04zip", &ExtractionConfig::default())
            .await
            .unwrap_err();
        match err {
            CatalogError::NotAPdf { magic, .. } => assert_eq!(&magic, b"PK\x03\x04"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
