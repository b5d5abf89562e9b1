//! Configuration types for catalog extraction runs.
//!
//! All run behaviour is controlled through [`ExtractionConfig`], built via
//! its [`ExtractionConfigBuilder`]. Every knob lives in one struct so a run
//! can be logged, cloned into the streaming state, and diffed against
//! another run.

use crate::classify::{ClassifierRules, PageClassifier};
use crate::error::CatalogError;
use crate::ocr::OcrEngineKind;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for an extraction run.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use catalog_extract::{ExtractionConfig, ExtractionMode};
///
/// let config = ExtractionConfig::builder()
///     .mode(ExtractionMode::Streaming)
///     .minimize_memory(true)
///     .catalog_type("automotive")
///     .build()
///     .unwrap();
/// assert!(!config.multimodal_enabled());
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Batch (classify up front, process product pages) or streaming
    /// (one page at a time, every page). Default: Batch.
    pub mode: ExtractionMode,

    /// Combine OCR text with native text before the first LLM call. Default: true.
    ///
    /// Has no effect when `minimize_memory` is set or no OCR engine is
    /// available.
    pub multimodal: bool,

    /// Memory-conservative mode. Default: false.
    ///
    /// Pages are not pre-rendered; an image is rendered lazily, just before
    /// extraction, and only for pages the candidate heuristic flags. The
    /// multimodal OCR step is disabled.
    pub minimize_memory: bool,

    /// Page image resolution. Default: [`RenderQuality::Standard`].
    pub render_quality: RenderQuality,

    /// Classify pages in batch mode and keep only product pages. Default: true.
    ///
    /// When false, batch mode processes every page.
    pub analyze_pages: bool,

    /// Read at most this many pages. Default: all.
    pub max_pages: Option<usize>,

    /// Catalog family used in the built-in prompt. Default: "automotive".
    pub catalog_type: String,

    /// Extraction instructions sent with every page. If None, uses the
    /// built-in prompt for `catalog_type`.
    pub extraction_prompt: Option<String>,

    /// Custom system prompt. If None, uses the built-in one.
    pub system_prompt: Option<String>,

    /// LLM model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "gemini", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens generated for a text extraction call. Default: 4096.
    pub max_tokens: usize,

    /// Maximum tokens generated for a vision call. Default: 2000.
    pub vision_max_tokens: usize,

    /// Page text sent to the LLM is truncated to this many characters. Default: 8000.
    pub max_text_chars: usize,

    /// Raw text must be longer than this for the text-only step. Default: 100.
    pub min_text_chars: usize,

    /// OCR engines to try, in priority order. Default: Tesseract, then
    /// Google Cloud Vision. Unavailable engines are skipped.
    pub ocr_engines: Vec<OcrEngineKind>,

    /// Keyword lists for the page classifier. Default: automotive catalogs.
    pub classifier_rules: ClassifierRules,

    /// Directory for rendered page images. If None, a temporary directory
    /// is created for the run and removed afterwards.
    pub image_dir: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-call timeout for LLM and cloud OCR requests in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            mode: ExtractionMode::default(),
            multimodal: true,
            minimize_memory: false,
            render_quality: RenderQuality::default(),
            analyze_pages: true,
            max_pages: None,
            catalog_type: "automotive".to_string(),
            extraction_prompt: None,
            system_prompt: None,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            vision_max_tokens: 2000,
            max_text_chars: 8000,
            min_text_chars: 100,
            ocr_engines: vec![OcrEngineKind::Tesseract, OcrEngineKind::GoogleVision],
            classifier_rules: ClassifierRules::default(),
            image_dir: None,
            password: None,
            download_timeout_secs: 120,
            api_timeout_secs: 60,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("mode", &self.mode)
            .field("multimodal", &self.multimodal)
            .field("minimize_memory", &self.minimize_memory)
            .field("render_quality", &self.render_quality)
            .field("analyze_pages", &self.analyze_pages)
            .field("max_pages", &self.max_pages)
            .field("catalog_type", &self.catalog_type)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_text_chars", &self.max_text_chars)
            .field("min_text_chars", &self.min_text_chars)
            .field("ocr_engines", &self.ocr_engines)
            .field("classifier_rules", &self.classifier_rules)
            .field("image_dir", &self.image_dir)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Whether the OCR + text step runs at all for this configuration.
    pub fn multimodal_enabled(&self) -> bool {
        self.multimodal && !self.minimize_memory
    }

    /// Page classifier over the configured rules.
    pub fn classifier(&self) -> PageClassifier {
        PageClassifier::new(self.classifier_rules.clone())
    }

    /// Number of pages to read from a document with `total` pages.
    pub fn page_limit(&self, total: usize) -> usize {
        self.max_pages.map_or(total, |m| m.min(total))
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn mode(mut self, mode: ExtractionMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn multimodal(mut self, v: bool) -> Self {
        self.config.multimodal = v;
        self
    }

    pub fn minimize_memory(mut self, v: bool) -> Self {
        self.config.minimize_memory = v;
        self
    }

    pub fn render_quality(mut self, quality: RenderQuality) -> Self {
        self.config.render_quality = quality;
        self
    }

    pub fn analyze_pages(mut self, v: bool) -> Self {
        self.config.analyze_pages = v;
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = Some(n);
        self
    }

    pub fn catalog_type(mut self, kind: impl Into<String>) -> Self {
        self.config.catalog_type = kind.into();
        self
    }

    pub fn extraction_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.extraction_prompt = Some(prompt.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn vision_max_tokens(mut self, n: usize) -> Self {
        self.config.vision_max_tokens = n;
        self
    }

    pub fn max_text_chars(mut self, n: usize) -> Self {
        self.config.max_text_chars = n;
        self
    }

    pub fn min_text_chars(mut self, n: usize) -> Self {
        self.config.min_text_chars = n;
        self
    }

    pub fn ocr_engines(mut self, engines: Vec<OcrEngineKind>) -> Self {
        self.config.ocr_engines = engines;
        self
    }

    pub fn classifier_rules(mut self, rules: ClassifierRules) -> Self {
        self.config.classifier_rules = rules;
        self
    }

    pub fn image_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.image_dir = Some(dir.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, CatalogError> {
        let c = &self.config;
        if c.max_pages == Some(0) {
            return Err(CatalogError::InvalidConfig(
                "max_pages must be ≥ 1".into(),
            ));
        }
        if c.max_text_chars == 0 {
            return Err(CatalogError::InvalidConfig(
                "max_text_chars must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(CatalogError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.catalog_type.trim().is_empty() {
            return Err(CatalogError::InvalidConfig(
                "catalog_type must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How pages are scheduled through the extraction loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Read and classify every page first, then extract product pages. (default)
    #[default]
    Batch,
    /// Read, extract and release one page at a time; every page is processed.
    Streaming,
}

/// Page rasterisation scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderQuality {
    /// 1.5× page scale. (default)
    #[default]
    Standard,
    /// 2.0× page scale, for small print.
    High,
}

impl RenderQuality {
    /// Scale factor applied to the page's point size.
    pub fn scale(self) -> f32 {
        match self {
            RenderQuality::Standard => 1.5,
            RenderQuality::High => 2.0,
        }
    }
}
