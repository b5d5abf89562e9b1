//! OCR and cloud vision engines behind one capability-checked interface.
//!
//! Engines are optional: a local binary may be missing, a cloud key may be
//! unset. Each engine answers [`OcrEngine::is_available`] and
//! [`OcrToolkit::detect`] keeps only the ones that do, in priority order.
//! The toolkit is built once per run and lent to the orchestrator; nothing
//! about it changes while pages are processed.

use crate::error::PageError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One text-from-image engine.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Short identifier used in logs and errors.
    fn name(&self) -> &str;

    /// Whether the engine can be called in this environment.
    fn is_available(&self) -> bool {
        true
    }

    /// Read the text in `image`. `Ok(None)` means nothing was recognised.
    async fn extract(&self, image: &Path) -> Result<Option<String>, PageError>;
}

/// Engines that can be requested by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OcrEngineKind {
    Tesseract,
    GoogleVision,
}

impl FromStr for OcrEngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tesseract" => Ok(OcrEngineKind::Tesseract),
            "google-vision" | "gcp-vision" | "gcp_vision" => Ok(OcrEngineKind::GoogleVision),
            other => Err(format!("unknown OCR engine '{other}'")),
        }
    }
}

/// Result of running the toolkit over one image.
#[derive(Debug, Clone, Default)]
pub struct OcrReading {
    /// Engine that produced `text`.
    pub engine: Option<String>,
    pub text: Option<String>,
    /// Engines that failed before one succeeded.
    pub errors: Vec<PageError>,
}

/// An ordered list of available engines.
#[derive(Default)]
pub struct OcrToolkit {
    engines: Vec<Box<dyn OcrEngine>>,
}

impl std::fmt::Debug for OcrToolkit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.engines.iter().map(|e| e.name()))
            .finish()
    }
}

impl OcrToolkit {
    /// Keep the available engines from `engines`, preserving their order.
    pub fn from_engines(engines: Vec<Box<dyn OcrEngine>>) -> Self {
        let engines = engines
            .into_iter()
            .filter(|e| {
                let ok = e.is_available();
                if !ok {
                    debug!("OCR engine '{}' unavailable, skipping", e.name());
                }
                ok
            })
            .collect();
        Self { engines }
    }

    /// Construct the requested engines in priority order, probing each.
    pub async fn detect(kinds: &[OcrEngineKind], api_timeout: Duration) -> Self {
        let mut engines: Vec<Box<dyn OcrEngine>> = Vec::with_capacity(kinds.len());
        for kind in kinds {
            match kind {
                OcrEngineKind::Tesseract => {
                    let detected = TesseractEngine::detect("tesseract", "eng", api_timeout).await;
                    if let Some(engine) = detected {
                        engines.push(Box::new(engine));
                    }
                }
                OcrEngineKind::GoogleVision => {
                    if let Some(engine) = GoogleVisionEngine::from_env(api_timeout) {
                        engines.push(Box::new(engine));
                    }
                }
            }
        }
        let toolkit = Self::from_engines(engines);
        info!("OCR engines available: {:?}", toolkit);
        toolkit
    }

    /// Whether any engine is available.
    pub fn is_available(&self) -> bool {
        !self.engines.is_empty()
    }

    pub fn engine_names(&self) -> Vec<&str> {
        self.engines.iter().map(|e| e.name()).collect()
    }

    /// Try engines in priority order; the first non-empty text wins.
    pub async fn extract(&self, image: &Path) -> OcrReading {
        let mut reading = OcrReading::default();
        for engine in &self.engines {
            match engine.extract(image).await {
                Ok(Some(text)) if !text.trim().is_empty() => {
                    debug!("OCR '{}' read {} chars", engine.name(), text.len());
                    reading.engine = Some(engine.name().to_string());
                    reading.text = Some(text);
                    return reading;
                }
                Ok(_) => debug!("OCR '{}' found no text", engine.name()),
                Err(e) => {
                    warn!("{}", e);
                    reading.errors.push(e);
                }
            }
        }
        reading
    }

    /// OCR `image` and merge the result into `raw_text`.
    pub async fn combine_with_text(&self, image: &Path, raw_text: &str) -> (String, OcrReading) {
        let reading = self.extract(image).await;
        let combined = combine_with_text(raw_text, reading.text.as_deref());
        (combined, reading)
    }
}

/// Append OCR text to native text unless the native text already contains it.
pub fn combine_with_text(raw_text: &str, ocr_text: Option<&str>) -> String {
    match ocr_text.map(str::trim).filter(|t| !t.is_empty()) {
        Some(ocr) if !raw_text.contains(ocr) => {
            if raw_text.is_empty() {
                ocr.to_string()
            } else {
                format!("{raw_text}\n\n{ocr}")
            }
        }
        _ => raw_text.to_string(),
    }
}

// ── Tesseract ────────────────────────────────────────────────────────────

/// Local `tesseract` binary, run once per image.
///
/// Each run is bounded by `timeout`; a run that overshoots is killed and
/// reported as a failed OCR step.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binary: String,
    lang: String,
    timeout: Duration,
}

impl TesseractEngine {
    pub fn new(binary: impl Into<String>, lang: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            lang: lang.into(),
            timeout,
        }
    }

    /// Return an engine only if `binary --version` runs.
    pub async fn detect(binary: &str, lang: &str, timeout: Duration) -> Option<Self> {
        let version = tokio::process::Command::new(binary)
            .arg("--version")
            .kill_on_drop(true)
            .output();
        match tokio::time::timeout(timeout, version).await {
            Ok(Ok(out)) if out.status.success() => Some(Self::new(binary, lang, timeout)),
            _ => {
                debug!("'{}' not found on PATH", binary);
                None
            }
        }
    }

    fn failure(&self, detail: impl Into<String>) -> PageError {
        PageError::OcrFailed {
            engine: self.name().to_string(),
            detail: detail.into(),
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn extract(&self, image: &Path) -> Result<Option<String>, PageError> {
        let run = tokio::process::Command::new(&self.binary)
            .arg(image)
            .arg("stdout")
            .args(["-l", &self.lang])
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| self.failure(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| self.failure(e.to_string()))?;

        if !output.status.success() {
            return Err(self.failure(String::from_utf8_lossy(&output.stderr).trim()));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!text.is_empty()).then_some(text))
    }
}

// ── Google Cloud Vision ──────────────────────────────────────────────────

const GOOGLE_VISION_ENDPOINT: &str = "https://vision.googleapis.com/v1/images:annotate";

/// Google Cloud Vision `DOCUMENT_TEXT_DETECTION` over REST.
#[derive(Debug, Clone)]
pub struct GoogleVisionEngine {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl GoogleVisionEngine {
    /// Fails when the HTTP client cannot be built with `timeout`.
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, PageError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PageError::OcrFailed {
                engine: "google-vision".to_string(),
                detail: format!("HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: GOOGLE_VISION_ENDPOINT.to_string(),
        })
    }

    /// Build from `GOOGLE_VISION_API_KEY`; None when unset or unusable.
    pub fn from_env(timeout: Duration) -> Option<Self> {
        let key = std::env::var("GOOGLE_VISION_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())?;
        match Self::new(key, timeout) {
            Ok(engine) => Some(engine),
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }

    fn failure(&self, detail: impl Into<String>) -> PageError {
        PageError::OcrFailed {
            engine: self.name().to_string(),
            detail: detail.into(),
        }
    }
}

#[async_trait]
impl OcrEngine for GoogleVisionEngine {
    fn name(&self) -> &str {
        "google-vision"
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn extract(&self, image: &Path) -> Result<Option<String>, PageError> {
        let bytes = tokio::fs::read(image)
            .await
            .map_err(|e| self.failure(format!("read {}: {e}", image.display())))?;

        let body = json!({
            "requests": [{
                "image": { "content": STANDARD.encode(&bytes) },
                "features": [{ "type": "DOCUMENT_TEXT_DETECTION" }]
            }]
        });

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", &self.api_key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| self.failure(e.to_string()))?;

        if !response.status().is_success() {
            return Err(self.failure(format!("HTTP {}", response.status())));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| self.failure(e.to_string()))?;
        annotation_text(&value).map_err(|detail| self.failure(detail))
    }
}

/// Pull the recognised text out of an `images:annotate` response.
fn annotation_text(value: &Value) -> Result<Option<String>, String> {
    let first = &value["responses"][0];
    if let Some(message) = first["error"]["message"].as_str() {
        return Err(message.to_string());
    }
    let text = first["fullTextAnnotation"]["text"]
        .as_str()
        .or_else(|| first["textAnnotations"][0]["description"].as_str())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Scripted {
        name: &'static str,
        available: bool,
        reply: Result<Option<&'static str>, &'static str>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl OcrEngine for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        fn is_available(&self) -> bool {
            self.available
        }

        async fn extract(&self, _image: &Path) -> Result<Option<String>, PageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Ok(text) => Ok(text.map(str::to_string)),
                Err(detail) => Err(PageError::OcrFailed {
                    engine: self.name.to_string(),
                    detail: detail.to_string(),
                }),
            }
        }
    }

    fn engine(
        name: &'static str,
        available: bool,
        reply: Result<Option<&'static str>, &'static str>,
    ) -> (Box<dyn OcrEngine>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let e = Scripted {
            name,
            available,
            reply,
            calls: Arc::clone(&calls),
        };
        (Box::new(e), calls)
    }

    #[test]
    fn unavailable_engines_are_dropped() {
        let (a, _) = engine("a", false, Ok(Some("x")));
        let (b, _) = engine("b", true, Ok(Some("y")));
        let toolkit = OcrToolkit::from_engines(vec![a, b]);
        assert_eq!(toolkit.engine_names(), vec!["b"]);
        assert!(toolkit.is_available());
        assert!(!OcrToolkit::default().is_available());
    }

    #[tokio::test]
    async fn first_non_empty_engine_wins() {
        let (a, a_calls) = engine("a", true, Err("crashed"));
        let (b, b_calls) = engine("b", true, Ok(Some("  ")));
        let (c, c_calls) = engine("c", true, Ok(Some("86-1000 CAMRY")));
        let (d, d_calls) = engine("d", true, Ok(Some("never")));
        let toolkit = OcrToolkit::from_engines(vec![a, b, c, d]);

        let reading = toolkit.extract(Path::new("page_1.png")).await;
        assert_eq!(reading.text.as_deref(), Some("86-1000 CAMRY"));
        assert_eq!(reading.engine.as_deref(), Some("c"));
        assert_eq!(reading.errors.len(), 1);
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
        assert_eq!(c_calls.load(Ordering::SeqCst), 1);
        assert_eq!(d_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn empty_toolkit_reads_nothing() {
        let reading = tokio_test::block_on(OcrToolkit::default().extract(Path::new("x.png")));
        assert!(reading.text.is_none());
        assert!(reading.errors.is_empty());
    }

    #[tokio::test]
    async fn toolkit_combine_merges_ocr_text() {
        let (a, _) = engine("a", true, Ok(Some("FRONT LEFT")));
        let toolkit = OcrToolkit::from_engines(vec![a]);
        let (text, reading) = toolkit
            .combine_with_text(Path::new("page_2.png"), "86-1000 Camry")
            .await;
        assert_eq!(text, "86-1000 Camry\n\nFRONT LEFT");
        assert_eq!(reading.engine.as_deref(), Some("a"));
    }

    #[test]
    fn combine_appends_new_text_only() {
        assert_eq!(combine_with_text("abc", Some("def")), "abc\n\ndef");
        assert_eq!(combine_with_text("abc def", Some("def")), "abc def");
        assert_eq!(combine_with_text("abc", None), "abc");
        assert_eq!(combine_with_text("abc", Some("   ")), "abc");
        assert_eq!(combine_with_text("", Some("def")), "def");
    }

    #[test]
    fn engine_kind_parsing() {
        assert_eq!("Tesseract".parse(), Ok(OcrEngineKind::Tesseract));
        assert_eq!("google-vision".parse(), Ok(OcrEngineKind::GoogleVision));
        assert!("paddle".parse::<OcrEngineKind>().is_err());
    }

    #[test]
    fn annotation_text_variants() {
        let full = json!({"responses": [{"fullTextAnnotation": {"text": "86-1000\n"}}]});
        assert_eq!(annotation_text(&full), Ok(Some("86-1000".to_string())));

        let legacy = json!({"responses": [{"textAnnotations": [{"description": "abc"}]}]});
        assert_eq!(annotation_text(&legacy), Ok(Some("abc".to_string())));

        let empty = json!({"responses": [{}]});
        assert_eq!(annotation_text(&empty), Ok(None));

        let err = json!({"responses": [{"error": {"message": "bad image"}}]});
        assert_eq!(annotation_text(&err), Err("bad image".to_string()));
    }

    #[test]
    fn vision_engine_builds_with_timeout() {
        let engine = GoogleVisionEngine::new("key", Duration::from_secs(5)).unwrap();
        assert!(engine.is_available());
        assert_eq!(engine.name(), "google-vision");
    }

    // `sh <script> stdout -l eng` stands in for the tesseract binary.
    #[cfg(unix)]
    #[tokio::test]
    async fn tesseract_output_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("ocr.sh");
        std::fs::write(&script, "echo '  Camry 86-1000  '\n").unwrap();

        let engine = TesseractEngine::new("sh", "eng", Duration::from_secs(10));
        let text = engine.extract(&script).await.unwrap();
        assert_eq!(text.as_deref(), Some("Camry 86-1000"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hung_tesseract_run_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("ocr.sh");
        std::fs::write(&script, "sleep 30\n").unwrap();

        let engine = TesseractEngine::new("sh", "eng", Duration::from_millis(200));
        let started = std::time::Instant::now();
        let err = engine.extract(&script).await.unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(10));
        match err {
            PageError::OcrFailed { engine, detail } => {
                assert_eq!(engine, "tesseract");
                assert!(detail.contains("timed out"), "{detail}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
