//! Shared wiring for `chat` and `serve`: credentials, providers, tools and
//! pricing built from the config file and the environment.

use std::collections::HashMap;
use std::sync::Arc;

use taor_config::AppConfig;
use taor_core::error::ProviderError;
use taor_core::provider::Provider;
use taor_core::tool::ToolRegistry;
use taor_providers::{ProviderSettings, RetryPolicy, SUPPORTED_PROVIDERS, build_provider};
use taor_server::ProviderFactory;
use taor_telemetry::{ModelPricing, PricingTable};
use taor_tools::{ResultStore, default_registry};

/// Environment variable holding each provider's API key.
pub const KEY_VARS: &[(&str, &str)] = &[
    ("anthropic", "ANTHROPIC_API_KEY"),
    ("openai", "OPENAI_API_KEY"),
    ("gemini", "GEMINI_API_KEY"),
];

/// Builds providers from config plus credentials resolved once at startup.
pub struct ConfiguredFactory {
    config: AppConfig,
    keys: HashMap<String, String>,
    /// Model override from the command line, for the default provider only
    model: Option<String>,
}

impl ConfiguredFactory {
    pub fn new(config: AppConfig, keys: HashMap<String, String>) -> Self {
        Self {
            config,
            keys,
            model: None,
        }
    }

    /// Resolve keys from the environment first, then from the config file.
    pub fn from_env(config: AppConfig) -> Self {
        Self::resolve(config, |var| std::env::var(var).ok())
    }

    pub fn resolve(config: AppConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let mut keys = HashMap::new();
        for (provider, var) in KEY_VARS {
            let key = env(var)
                .filter(|k| !k.trim().is_empty())
                .or_else(|| config.provider(provider).api_key);
            if let Some(key) = key {
                keys.insert(provider.to_string(), key);
            }
        }
        Self::new(config, keys)
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn has_credentials(&self, provider: &str) -> bool {
        provider == "ollama" || self.keys.contains_key(provider)
    }

    /// Pick the provider to use: the requested one, else the configured
    /// default, else the first family with a key. Fails with setup
    /// instructions when nothing usable is configured.
    pub fn select(&self, requested: Option<&str>) -> anyhow::Result<String> {
        if let Some(name) = requested {
            if !SUPPORTED_PROVIDERS.contains(&name) {
                anyhow::bail!(
                    "Unknown provider '{name}' (expected one of: {})",
                    SUPPORTED_PROVIDERS.join(", ")
                );
            }
            if !self.has_credentials(name) {
                anyhow::bail!("{}", missing_key_help(Some(name)));
            }
            return Ok(name.to_string());
        }

        let default = self.config.default_provider.as_str();
        if self.has_credentials(default) {
            return Ok(default.to_string());
        }
        KEY_VARS
            .iter()
            .map(|(provider, _)| *provider)
            .find(|p| self.keys.contains_key(*p))
            .map(String::from)
            .ok_or_else(|| anyhow::anyhow!("{}", missing_key_help(None)))
    }

    pub fn settings(&self, provider: &str, model: Option<&str>) -> ProviderSettings {
        let configured = self.config.provider(provider);
        let model = model
            .map(String::from)
            .or_else(|| {
                (provider == self.config.default_provider)
                    .then(|| self.model.clone().or(self.config.default_model.clone()))
                    .flatten()
            })
            .or(configured.default_model);
        let retry = &self.config.retry;

        ProviderSettings {
            provider: provider.to_string(),
            model,
            api_key: self.keys.get(provider).cloned(),
            base_url: configured.api_url,
            prompt_cache: configured.prompt_cache,
            temperature: Some(self.config.default_temperature),
            retry: RetryPolicy {
                max_retries: retry.max_retries,
                base_delay: retry.base_delay(),
                max_delay: retry.max_delay(),
            },
        }
    }
}

impl ProviderFactory for ConfiguredFactory {
    fn create(
        &self,
        provider: &str,
        model: Option<&str>,
    ) -> Result<Arc<dyn Provider>, ProviderError> {
        build_provider(&self.settings(provider, model))
    }
}

fn missing_key_help(provider: Option<&str>) -> String {
    let mut help = match provider {
        Some(name) => format!("No API key configured for '{name}'.\n"),
        None => "No API key found for any provider.\n".to_string(),
    };
    help.push_str("\n  Set one of these environment variables:\n");
    for (_, var) in KEY_VARS {
        help.push_str(&format!("    {var}\n"));
    }
    help.push_str(&format!(
        "\n  Or add an api_key under [providers.<name>] in:\n    {}\n",
        AppConfig::config_dir().join("config.toml").display()
    ));
    help.push_str("\n  A local model needs no key: --provider ollama\n");
    help
}

/// The registry every session starts from.
pub fn tool_registry(store: Arc<ResultStore>) -> anyhow::Result<ToolRegistry> {
    Ok(default_registry(store)?)
}

/// Built-in prices plus any `[pricing.<model>]` overrides.
pub fn pricing_table(config: &AppConfig) -> PricingTable {
    let table = PricingTable::with_defaults();
    for (model, price) in &config.pricing {
        table.set(model.clone(), ModelPricing::new(price.input_per_m, price.output_per_m));
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory(vars: &[(&str, &str)]) -> ConfiguredFactory {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ConfiguredFactory::resolve(AppConfig::default(), move |var| vars.get(var).cloned())
    }

    #[test]
    fn no_keys_fails_with_instructions() {
        let err = factory(&[]).select(None).unwrap_err().to_string();
        assert!(err.contains("ANTHROPIC_API_KEY"));
        assert!(err.contains("--provider ollama"));
    }

    #[test]
    fn default_provider_wins_when_keyed() {
        let f = factory(&[("OPENAI_API_KEY", "sk-o"), ("ANTHROPIC_API_KEY", "sk-a")]);
        assert_eq!(f.select(None).unwrap(), "anthropic");
    }

    #[test]
    fn falls_back_to_first_keyed_provider() {
        let f = factory(&[("GEMINI_API_KEY", "g-1")]);
        assert_eq!(f.select(None).unwrap(), "gemini");
    }

    #[test]
    fn blank_env_key_is_ignored() {
        let f = factory(&[("ANTHROPIC_API_KEY", "  ")]);
        assert!(f.select(None).is_err());
    }

    #[test]
    fn ollama_needs_no_key() {
        assert_eq!(factory(&[]).select(Some("ollama")).unwrap(), "ollama");
    }

    #[test]
    fn requested_provider_is_checked() {
        let f = factory(&[("ANTHROPIC_API_KEY", "sk-a")]);
        assert!(f.select(Some("openai")).is_err());
        assert!(f.select(Some("mystery")).is_err());
    }

    #[test]
    fn config_file_key_is_used() {
        let mut config = AppConfig::default();
        config.providers.insert(
            "openai".into(),
            taor_config::ProviderConfig {
                api_key: Some("sk-file".into()),
                ..Default::default()
            },
        );
        let f = ConfiguredFactory::resolve(config, |_| None);
        assert_eq!(f.select(Some("openai")).unwrap(), "openai");
        assert_eq!(
            f.settings("openai", None).api_key.as_deref(),
            Some("sk-file")
        );
    }

    #[test]
    fn model_override_applies_to_default_provider_only() {
        let f = factory(&[("ANTHROPIC_API_KEY", "sk-a")]).with_model(Some("claude-x".into()));
        assert_eq!(f.settings("anthropic", None).model.as_deref(), Some("claude-x"));
        assert_eq!(f.settings("openai", None).model, None);
        assert_eq!(
            f.settings("anthropic", Some("claude-y")).model.as_deref(),
            Some("claude-y")
        );
    }

    #[test]
    fn factory_builds_ollama_without_network() {
        let provider = factory(&[]).create("ollama", None).unwrap();
        assert_eq!(provider.model(), "llama3.1");
    }

    #[test]
    fn pricing_overrides_are_applied() {
        let mut config = AppConfig::default();
        config.pricing.insert(
            "my-model".into(),
            taor_config::PricingOverrideConfig {
                input_per_m: 1.0,
                output_per_m: 2.0,
            },
        );
        let table = pricing_table(&config);
        assert!(table.lookup("my-model").is_some());
    }
}
