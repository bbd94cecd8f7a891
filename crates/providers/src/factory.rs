//! Provider factory: explicit settings in, a ready provider out.
//!
//! No environment lookups happen here; the caller resolves credentials.

use std::sync::Arc;
use taor_core::error::ProviderError;
use taor_core::provider::Provider;

use crate::anthropic::AnthropicProvider;
use crate::openai_compat::OpenAiCompatProvider;
use crate::retry::{RetryPolicy, RetryingProvider};

/// Known backend families.
pub const SUPPORTED_PROVIDERS: &[&str] = &["anthropic", "openai", "gemini", "ollama"];

/// Everything needed to construct one provider.
#[derive(Clone, Default)]
pub struct ProviderSettings {
    /// "anthropic", "openai", "gemini" or "ollama"
    pub provider: String,
    /// Model id; the family default when empty
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub prompt_cache: bool,
    pub temperature: Option<f32>,
    pub retry: RetryPolicy,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("prompt_cache", &self.prompt_cache)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Default model id for a provider family.
pub fn default_model(provider: &str) -> &'static str {
    match provider {
        "anthropic" => "claude-sonnet-4-20250514",
        "openai" => "gpt-4o",
        "gemini" => "gemini/gemini-2.0-flash",
        "ollama" => "llama3.1",
        _ => "",
    }
}

/// Whether the family needs an API key.
pub fn requires_api_key(provider: &str) -> bool {
    provider != "ollama"
}

/// Build a provider from settings, wrapped in the retry policy.
pub fn build_provider(settings: &ProviderSettings) -> Result<Arc<dyn Provider>, ProviderError> {
    let name = settings.provider.as_str();
    if !SUPPORTED_PROVIDERS.contains(&name) {
        return Err(ProviderError::NotConfigured(format!(
            "Unknown provider '{name}' (expected one of: {})",
            SUPPORTED_PROVIDERS.join(", ")
        )));
    }

    let api_key = settings.api_key.clone().unwrap_or_default();
    if requires_api_key(name) && api_key.is_empty() {
        return Err(ProviderError::NotConfigured(format!(
            "No API key configured for '{name}'"
        )));
    }

    let model = settings
        .model
        .clone()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| default_model(name).to_string());

    let provider: Arc<dyn Provider> = match name {
        "anthropic" => {
            // Use native Anthropic provider for direct API access
            let mut p = AnthropicProvider::new(api_key, model).with_prompt_cache(settings.prompt_cache);
            if let Some(url) = &settings.base_url {
                p = p.with_base_url(url);
            }
            if let Some(t) = settings.temperature {
                p = p.with_temperature(t);
            }
            Arc::new(p)
        }
        _ => {
            let mut p = match (name, &settings.base_url) {
                (_, Some(url)) => OpenAiCompatProvider::new(name, url, api_key, model),
                ("gemini", None) => OpenAiCompatProvider::gemini(api_key, model),
                ("ollama", None) => OpenAiCompatProvider::ollama(None, model),
                _ => OpenAiCompatProvider::openai(api_key, model),
            };
            if let Some(t) = settings.temperature {
                p = p.with_temperature(t);
            }
            Arc::new(p)
        }
    };

    Ok(Arc::new(RetryingProvider::new(provider, settings.retry.clone())))
}
