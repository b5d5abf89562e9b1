//! Streaming extraction: read, classify and extract one page at a time.
//!
//! Unlike batch mode, nothing is computed for the whole document up front.
//! Each page is read, classified, optionally rendered, sent through the
//! fallback chain and its image released before the next page is read, so
//! at most one page image exists at any time. Every page is processed; the
//! candidate heuristic only decides whether a page gets an image when
//! `minimize_memory` is set.
//!
//! [`run_streaming`] drains the pages into a [`RunResult`].
//! [`extract_stream`] hands them to the caller as a `Stream` instead, so
//! items can be written out as they arrive.

use crate::aggregate::ResultAggregator;
use crate::classify::{PageAnalysis, PageClassifier};
use crate::config::{ExtractionConfig, ExtractionMode};
use crate::error::CatalogError;
use crate::extract::{extraction_prompt, finish, ocr_toolkit, prepare, ImageWorkspace, PageContext};
use crate::ocr::OcrToolkit;
use crate::output::{DocumentMetadata, PageOutcome, RunResult};
use crate::pipeline::input::{self, ResolvedInput};
use crate::pipeline::llm::{LlmExtractor, StructuredExtractor};
use crate::pipeline::render::PdfiumSource;
use crate::source::PdfSource;
use futures::stream::{self, LocalBoxStream, StreamExt};
use std::time::Instant;
use tracing::{debug, info};

/// One page as emitted by the streaming loop.
#[derive(Debug, Clone)]
pub struct StreamedPage {
    pub analysis: PageAnalysis,
    pub outcome: PageOutcome,
}

/// A stream of processed pages in page order.
///
/// Local (not `Send`) because the pdfium bindings are driven from the
/// polling thread.
pub type PageStream<'a> = LocalBoxStream<'a, StreamedPage>;

/// Streaming mode over already-constructed collaborators.
pub async fn run_streaming(
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
    info!(
        "Streaming {} pages in {} mode",
        limit,
        if config.minimize_memory { "low-memory" } else { "standard" }
    );

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
    let mut aggregator = ResultAggregator::new(ExtractionMode::Streaming);
    if let Some(cb) = ctx.callback() {
        cb.on_run_start(limit);
    }

    for page_number in 1..=limit {
        let page = stream_page(&ctx, page_number, limit).await;
        aggregator.record_analysis(page.analysis);
        aggregator.append(page.outcome);
        debug!("Total items so far: {}", aggregator.items().len());
    }

    finish(aggregator, metadata, &ctx, start)
}

/// Read, classify and extract one page, then release its image.
pub(crate) async fn stream_page(
    ctx: &PageContext<'_>,
    page_number: usize,
    total_pages: usize,
) -> StreamedPage {
    let (record, read_error) = ctx.read_page(page_number);
    let analysis = ctx.classifier.analyze(page_number, &record.raw_text);
    let candidate = ctx.classifier.is_extraction_candidate(&record.raw_text);
    info!(
        "Page {}/{}: candidate={} text_len={}",
        page_number,
        total_pages,
        candidate,
        record.raw_text.chars().count()
    );

    if let Some(cb) = ctx.callback() {
        cb.on_page_start(page_number, total_pages);
    }

    let mut outcome = PageOutcome::new(page_number);
    outcome.errors.extend(read_error);

    let image = if !ctx.config.minimize_memory || candidate {
        ctx.render(page_number, &mut outcome)
    } else {
        None
    };

    ctx.process(&record, image.as_deref(), &mut outcome).await;

    if let Some(ref path) = image {
        ctx.workspace.release(path);
    }

    info!("  Extracted {} items from page {}", outcome.items.len(), page_number);
    if let Some(cb) = ctx.callback() {
        cb.on_page_complete(page_number, total_pages, outcome.items.len());
    }

    StreamedPage { analysis, outcome }
}

/// Owns every collaborator for a caller-driven stream.
struct StreamSession {
    _input: Option<ResolvedInput>,
    source: Box<dyn PdfSource>,
    extractor: Box<dyn StructuredExtractor>,
    ocr: Option<OcrToolkit>,
    config: ExtractionConfig,
    workspace: ImageWorkspace,
    classifier: PageClassifier,
    prompt: String,
    next_page: usize,
    limit: usize,
    items: usize,
}

impl StreamSession {
    fn context(&self) -> PageContext<'_> {
        PageContext {
            source: &*self.source,
            extractor: &*self.extractor,
            ocr: self.ocr.as_ref(),
            config: &self.config,
            workspace: &self.workspace,
            classifier: &self.classifier,
            prompt: &self.prompt,
        }
    }

    fn complete(&self) {
        info!("Streaming done: {} items from {} pages", self.items, self.limit);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_run_complete(self.limit, self.items);
        }
    }
}

/// Extract from a PDF file or URL, yielding each page as it completes.
///
/// Setup failures, including a document that cannot be loaded, are
/// returned as `Err` before any page is read. Pages then arrive in order;
/// per-page failures are reported inside each [`PageOutcome`].
///
/// # Example
/// ```rust,no_run
/// use catalog_extract::{extract_stream, ExtractionConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ExtractionConfig::default();
/// let (meta, mut pages) = extract_stream("catalog.pdf", &config).await?;
/// println!("{} pages", meta.page_count);
/// while let Some(page) = pages.next().await {
///     println!("page {}: {} items", page.outcome.page_number, page.outcome.items.len());
/// }
/// # Ok(())
/// # }
/// ```
pub async fn extract_stream(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<(DocumentMetadata, PageStream<'static>), CatalogError> {
    let input_str = input_str.as_ref();
    info!("Starting streaming extraction: {}", input_str);

    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let extractor = LlmExtractor::from_config(config)?;
    let ocr = ocr_toolkit(config).await;
    let source = PdfiumSource::open(resolved.path(), config.password.clone())?;
    open_stream(Some(resolved), Box::new(source), Box::new(extractor), ocr, config)
}

/// Stream pages from already-constructed collaborators.
///
/// The caller-driven counterpart of [`run_streaming`]: the stream owns the
/// source and extractor, and the progress callback sees `on_run_start`
/// before the first page and `on_run_complete` once after the last. The
/// stream is fused, so polling past the end keeps returning `None`.
pub fn stream_pages<S, E>(
    source: S,
    extractor: E,
    ocr: Option<OcrToolkit>,
    config: &ExtractionConfig,
) -> Result<(DocumentMetadata, PageStream<'static>), CatalogError>
where
    S: PdfSource + 'static,
    E: StructuredExtractor + 'static,
{
    open_stream(None, Box::new(source), Box::new(extractor), ocr, config)
}

fn open_stream(
    input: Option<ResolvedInput>,
    mut source: Box<dyn PdfSource>,
    extractor: Box<dyn StructuredExtractor>,
    ocr: Option<OcrToolkit>,
    config: &ExtractionConfig,
) -> Result<(DocumentMetadata, PageStream<'static>), CatalogError> {
    let (metadata, workspace) = prepare(source.as_mut(), config)?;
    let limit = config.page_limit(metadata.page_count);

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(limit);
    }

    let session = StreamSession {
        _input: input,
        source,
        extractor,
        ocr,
        config: config.clone(),
        workspace,
        classifier: config.classifier(),
        prompt: extraction_prompt(config),
        next_page: 1,
        limit,
        items: 0,
    };

    let pages = stream::unfold(session, |mut session| async move {
        if session.next_page > session.limit {
            session.complete();
            return None;
        }
        let page_number = session.next_page;
        session.next_page += 1;

        let page = {
            let ctx = session.context();
            stream_page(&ctx, page_number, session.limit).await
        };
        session.items += page.outcome.items.len();
        Some((page, session))
    })
    .fuse()
    .boxed_local();

    Ok((metadata, pages))
}
