//! CLI binary for catalog-extract.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and prints results.

use anyhow::{Context, Result};
use catalog_extract::pipeline::input::resolve_input;
use catalog_extract::{
    analyze, default_dump_path, dump_pdf, extract, inspect, write_dump, ExtractionConfig,
    ExtractionMode, ExtractionProgressCallback, OcrEngineKind, PageAnalysis, ProgressCallback,
    RenderQuality, RunResult,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per page.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Start of the page currently being processed.
    page_started: Mutex<Option<Instant>>,
    skipped: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_run_start` reports the page count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            page_started: Mutex::new(None),
            skipped: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }

    fn page_elapsed_secs(&self) -> f64 {
        self.page_started
            .lock()
            .ok()
            .and_then(|mut started| started.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_run_start(&self, pages: usize) {
        self.activate_bar(pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Scanning {pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut started) = self.page_started.lock() {
            *started = Some(Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, items: usize) {
        let elapsed = self.page_elapsed_secs();
        let mark = if items > 0 { green("✓") } else { dim("·") };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<10}  {}",
            mark,
            page_num,
            total,
            dim(&format!("{items:>4} items")),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_skipped(&self, _page_num: usize, _total: usize) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
        self.bar.inc(1);
    }

    fn on_run_complete(&self, processed_pages: usize, items: usize) {
        self.bar.finish_and_clear();
        let skipped = self.skipped.load(Ordering::SeqCst);
        eprintln!(
            "{} {} items from {} pages{}",
            green("✔"),
            bold(&items.to_string()),
            processed_pages,
            if skipped > 0 {
                dim(&format!("  ({skipped} non-product pages skipped)"))
            } else {
                String::new()
            }
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract items as JSON on stdout
  catalog-extract catalog.pdf

  # Write the run result to a file
  catalog-extract catalog.pdf -o items.json

  # Page-by-page with minimal memory (no OCR, lazy rendering)
  catalog-extract --mode streaming --minimize-memory big-catalog.pdf -o items.json

  # Only the first 10 pages, every page (no product-page filter)
  catalog-extract --max-pages 10 --no-analysis catalog.pdf

  # Custom extraction prompt and model
  catalog-extract --prompt-file prompt.txt --model gpt-4o catalog.pdf

  # Also write the text dump to extracted_data/<stem>_extracted.json
  catalog-extract catalog.pdf -o items.json --dump

  # Classify pages without calling any LLM
  catalog-extract --analyze-only catalog.pdf

  # Inspect PDF metadata (no API key needed)
  catalog-extract --inspect-only catalog.pdf

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  GEMINI_API_KEY          Google Gemini API key
  CATALOG_LLM_PROVIDER    Override provider (openai, anthropic, gemini, ollama)
  CATALOG_MODEL           Override model ID
  GOOGLE_VISION_API_KEY   Enables the Google Cloud Vision OCR engine
  PDFIUM_LIB_PATH         Path to libpdfium (else the system library is used)
  RUST_LOG                Log filter, overrides --verbose/--quiet
"#;

/// Extract structured catalog listings from PDF files and URLs.
#[derive(Parser, Debug)]
#[command(
    name = "catalog-extract",
    version,
    about = "Extract structured catalog listings from PDF files and URLs",
    long_about = "Extract structured catalog listings (part numbers, fitment, years) from PDF \
catalogs. Pages are classified first; product pages are read from native text, OCR text or \
the page image, whichever yields items first.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Write the run result (JSON) to this file instead of stdout.
    #[arg(short, long, env = "CATALOG_OUTPUT")]
    output: Option<PathBuf>,

    /// Scheduling: batch (classify first, product pages only) or streaming (every page).
    #[arg(long, env = "CATALOG_MODE", value_enum, default_value = "batch")]
    mode: ModeArg,

    /// Render lazily for candidate pages only and skip OCR.
    #[arg(long, env = "CATALOG_MINIMIZE_MEMORY")]
    minimize_memory: bool,

    /// Disable the OCR + text step.
    #[arg(long, env = "CATALOG_NO_MULTIMODAL")]
    no_multimodal: bool,

    /// Batch mode: process every page instead of product pages only.
    #[arg(long, env = "CATALOG_NO_ANALYSIS")]
    no_analysis: bool,

    /// Render page images at 2x instead of 1.5x.
    #[arg(long, env = "CATALOG_HIGH_QUALITY")]
    high_quality: bool,

    /// Read at most this many pages.
    #[arg(long, env = "CATALOG_MAX_PAGES",
          value_parser = clap::value_parser!(u64).range(1..))]
    max_pages: Option<u64>,

    /// Catalog family named in the built-in prompt.
    #[arg(long, env = "CATALOG_TYPE", default_value = "automotive")]
    catalog_type: String,

    /// Path to a text file with custom extraction instructions.
    #[arg(long, env = "CATALOG_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "CATALOG_SYSTEM_PROMPT_FILE")]
    system_prompt_file: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4o-mini, gpt-4o, gemini-2.0-flash).
    #[arg(long, env = "CATALOG_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "CATALOG_PROVIDER")]
    provider: Option<String>,

    /// OCR engines in priority order (comma-separated).
    #[arg(long, env = "CATALOG_OCR", value_delimiter = ',',
          default_value = "tesseract,google-vision")]
    ocr: Vec<OcrEngineKind>,

    /// Keep rendered page images in this directory.
    #[arg(long, env = "CATALOG_IMAGE_DIR")]
    image_dir: Option<PathBuf>,

    /// Also write the document dump (metadata, page text, full text).
    /// Default path: extracted_data/<stem>_extracted.json
    #[arg(long, num_args = 0..=1, value_name = "PATH")]
    dump: Option<Option<PathBuf>>,

    /// Classify pages only; no LLM calls.
    #[arg(long)]
    analyze_only: bool,

    /// Print PDF metadata only, no extraction.
    #[arg(long)]
    inspect_only: bool,

    /// Print JSON for --inspect-only and --analyze-only.
    #[arg(long, env = "CATALOG_JSON")]
    json: bool,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "CATALOG_PASSWORD")]
    password: Option<String>,

    /// Max LLM output tokens for text extraction.
    #[arg(long, env = "CATALOG_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "CATALOG_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Disable progress bar.
    #[arg(long, env = "CATALOG_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "CATALOG_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "CATALOG_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "CATALOG_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-call LLM / cloud OCR timeout in seconds.
    #[arg(long, env = "CATALOG_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Batch,
    Streaming,
}

impl From<ModeArg> for ExtractionMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Batch => ExtractionMode::Batch,
            ModeArg::Streaming => ExtractionMode::Streaming,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let report_only = cli.inspect_only || cli.analyze_only;
    let show_progress = !cli.quiet && !cli.no_progress && !report_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;

    // Download once; every later step reads the local copy.
    let resolved = resolve_input(&cli.input, config.download_timeout_secs)
        .await
        .context("Failed to open input")?;
    let pdf_path = resolved.path().to_path_buf();
    let pdf_str = pdf_path.to_string_lossy().to_string();

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let meta = inspect(&pdf_str, &config).await.context("Failed to inspect PDF")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
            );
        } else {
            println!("File:         {}", cli.input);
            if let Some(ref t) = meta.title {
                println!("Title:        {}", t);
            }
            if let Some(ref a) = meta.author {
                println!("Author:       {}", a);
            }
            if let Some(ref s) = meta.subject {
                println!("Subject:      {}", s);
            }
            println!("Pages:        {}", meta.page_count);
            if let Some(ref p) = meta.producer {
                println!("Producer:     {}", p);
            }
            if let Some(ref c) = meta.creator {
                println!("Creator:      {}", c);
            }
        }
        return Ok(());
    }

    // ── Analyze-only mode ────────────────────────────────────────────────
    if cli.analyze_only {
        let analysis = analyze(&pdf_str, &config)
            .await
            .context("Failed to analyze PDF")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&analysis).context("Failed to serialize analysis")?
            );
        } else {
            print_analysis(&analysis);
        }
        return Ok(());
    }

    // ── Optional dump ────────────────────────────────────────────────────
    if let Some(ref requested) = cli.dump {
        let dump_path = requested.clone().unwrap_or_else(|| {
            default_dump_path(Path::new("extracted_data"), Path::new(&cli.input))
        });
        let dump = dump_pdf(&pdf_str, &config)
            .await
            .context("Failed to read PDF for dump")?;
        write_dump(&dump, &dump_path)
            .await
            .context("Failed to write document dump")?;
        if !cli.quiet {
            eprintln!("{} dump  →  {}", dim("·"), dump_path.display());
        }
    }

    // ── Run extraction ───────────────────────────────────────────────────
    let result = extract(&pdf_str, &config)
        .await
        .context("Extraction failed")?
        .into_result()
        .context("Extraction failed")?;

    let json = serde_json::to_string_pretty(&result).context("Failed to serialise result")?;
    match cli.output {
        Some(ref output_path) => {
            if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            std::fs::write(output_path, &json)
                .with_context(|| format!("Failed to write {}", output_path.display()))?;
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            writeln!(handle, "{json}").context("Failed to write to stdout")?;
        }
    }

    if !cli.quiet {
        print_summary(&result, cli.output.as_deref(), show_progress);
    }

    Ok(())
}

fn print_summary(result: &RunResult, output: Option<&Path>, show_progress: bool) {
    let stats = &result.stats;
    if !show_progress {
        eprintln!(
            "Extracted {} items from {}/{} pages in {}ms",
            stats.items_extracted, stats.pages_with_items, stats.processed_pages, stats.duration_ms
        );
    }
    eprintln!(
        "   {} llm calls  /  {} images  /  hits: {} ocr+text, {} text, {} vision{}",
        dim(&stats.llm_calls.to_string()),
        dim(&stats.images_rendered.to_string()),
        stats.multimodal_hits,
        stats.text_hits,
        stats.vision_hits,
        if stats.failed_steps > 0 {
            format!("  ({} failed steps)", stats.failed_steps)
        } else {
            String::new()
        }
    );
    if let Some(path) = output {
        eprintln!("   →  {}", bold(&path.display().to_string()));
    }
}

fn print_analysis(analysis: &[PageAnalysis]) {
    println!("Page  Product  Confidence  Method  Reason");
    for a in analysis {
        println!(
            "{:>4}  {:<7}  {:<10}  {:<6}  {}",
            a.page_number,
            if a.product.is_product_page { "yes" } else { "no" },
            a.product.confidence,
            a.strategy.method,
            a.strategy.reason
        );
    }
    let products = analysis.iter().filter(|a| a.product.is_product_page).count();
    println!("{products}/{} product pages", analysis.len());
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let extraction_prompt = read_optional(cli.prompt_file.as_deref()).await?;
    let system_prompt = read_optional(cli.system_prompt_file.as_deref()).await?;

    let mut builder = ExtractionConfig::builder()
        .mode(cli.mode.into())
        .multimodal(!cli.no_multimodal)
        .minimize_memory(cli.minimize_memory)
        .analyze_pages(!cli.no_analysis)
        .render_quality(if cli.high_quality {
            RenderQuality::High
        } else {
            RenderQuality::Standard
        })
        .catalog_type(cli.catalog_type.clone())
        .ocr_engines(cli.ocr.clone())
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(n) = cli.max_pages {
        builder = builder.max_pages(n as usize);
    }
    if let Some(prompt) = extraction_prompt {
        builder = builder.extraction_prompt(prompt);
    }
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref dir) = cli.image_dir {
        builder = builder.image_dir(dir.clone());
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn read_optional(path: Option<&Path>) -> Result<Option<String>> {
    match path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
            .map(Some),
        None => Ok(None),
    }
}
