//! LLM interaction: structured extraction from page text or page images.
//!
//! The orchestrator talks to the [`StructuredExtractor`] trait and never to
//! a provider directly, so tests can script replies and the production
//! [`LlmExtractor`] stays a thin adapter over `edgequake_llm`.
//!
//! Calls are made once: there is no retry loop. A failed or timed-out call
//! comes back as a [`PageError`] and the page falls through to its next
//! extraction step.

use crate::config::ExtractionConfig;
use crate::error::{CatalogError, PageError};
use crate::pipeline::encode;
use crate::prompts::{text_extraction_message, DEFAULT_SYSTEM_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default model when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// The LLM structured-extraction and vision services.
///
/// Both calls return the raw reply text; `Ok(None)` means the service
/// answered with nothing usable. Reply parsing happens in
/// [`crate::pipeline::response`].
#[async_trait]
pub trait StructuredExtractor: Send + Sync {
    /// Whether calls can be made at all (e.g. credentials are present).
    fn is_available(&self) -> bool {
        true
    }

    /// Extract structured data from page text.
    async fn extract_structured(
        &self,
        text: &str,
        prompt: &str,
    ) -> Result<Option<String>, PageError>;

    /// Extract structured data from a rendered page image.
    async fn extract_from_image(
        &self,
        image: &Path,
        prompt: &str,
    ) -> Result<Option<String>, PageError>;
}

/// [`StructuredExtractor`] backed by an `edgequake_llm` chat provider.
pub struct LlmExtractor {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    temperature: f32,
    max_tokens: usize,
    vision_max_tokens: usize,
    max_text_chars: usize,
    timeout: Duration,
}

impl LlmExtractor {
    /// Wrap an existing provider with the call settings from `config`.
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            vision_max_tokens: config.vision_max_tokens,
            max_text_chars: config.max_text_chars,
            timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    /// Resolve the provider named by `config` (or the environment) and wrap it.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, CatalogError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config))
    }

    async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        max_tokens: usize,
    ) -> Result<Option<String>, PageError> {
        let options = completion_options(self.temperature, max_tokens);
        let start = Instant::now();

        let response = tokio::time::timeout(self.timeout, self.provider.chat(&messages, Some(&options)))
            .await
            .map_err(|_| PageError::Timeout {
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| PageError::LlmFailed {
                detail: e.to_string(),
            })?;

        debug!(
            "LLM reply: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        let content = response.content;
        Ok((!content.trim().is_empty()).then_some(content))
    }
}

#[async_trait]
impl StructuredExtractor for LlmExtractor {
    async fn extract_structured(
        &self,
        text: &str,
        prompt: &str,
    ) -> Result<Option<String>, PageError> {
        let messages = vec![
            ChatMessage::system(&self.system_prompt),
            ChatMessage::user(text_extraction_message(prompt, text, self.max_text_chars)),
        ];
        self.chat(messages, self.max_tokens).await
    }

    async fn extract_from_image(
        &self,
        image: &Path,
        prompt: &str,
    ) -> Result<Option<String>, PageError> {
        let image_data = encode::encode_image_file(image)?;
        let messages = vec![
            ChatMessage::system(&self.system_prompt),
            ChatMessage::user_with_images(prompt, vec![image_data]),
        ];
        self.chat(messages, self.vision_max_tokens).await
    }
}

/// Build `CompletionOptions` for one call.
fn completion_options(temperature: f32, max_tokens: usize) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(max_tokens),
        ..Default::default()
    }
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. pre-built provider (`config.provider`)
/// 2. named provider + model (`config.provider_name`)
/// 3. `CATALOG_LLM_PROVIDER` + `CATALOG_MODEL` environment pair
/// 4. OpenAI when `OPENAI_API_KEY` is set
/// 5. `ProviderFactory::from_env()` auto-detection
pub fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, CatalogError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("CATALOG_LLM_PROVIDER"),
        std::env::var("CATALOG_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| CatalogError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY or GEMINI_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, CatalogError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        CatalogError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}
