//! Built-in pricing table for common LLM models.
//!
//! Prices are in USD per 1 million tokens. Each model has an input and
//! output price, plus optional prompt-cache prices. Custom pricing can be
//! added at runtime via TOML config.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use taor_core::provider::Usage;
use tracing::debug;

/// Cache writes cost this multiple of the input price unless overridden.
const CACHE_WRITE_MULTIPLIER: f64 = 1.25;
/// Cache reads cost this multiple of the input price unless overridden.
const CACHE_READ_MULTIPLIER: f64 = 0.1;

/// Per-million-token pricing for a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Price per 1M input tokens in USD.
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD.
    pub output_per_m: f64,
    /// Price per 1M cache-creation tokens in USD.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_write_per_m: Option<f64>,
    /// Price per 1M cache-read tokens in USD.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_per_m: Option<f64>,
}

impl ModelPricing {
    /// Create a new pricing entry.
    pub fn new(input_per_m: f64, output_per_m: f64) -> Self {
        Self {
            input_per_m,
            output_per_m,
            cache_write_per_m: None,
            cache_read_per_m: None,
        }
    }

    pub fn with_cache(mut self, write_per_m: f64, read_per_m: f64) -> Self {
        self.cache_write_per_m = Some(write_per_m);
        self.cache_read_per_m = Some(read_per_m);
        self
    }

    /// Compute cost for the given usage.
    pub fn cost(&self, usage: &Usage) -> f64 {
        let cache_write = self
            .cache_write_per_m
            .unwrap_or(self.input_per_m * CACHE_WRITE_MULTIPLIER);
        let cache_read = self
            .cache_read_per_m
            .unwrap_or(self.input_per_m * CACHE_READ_MULTIPLIER);

        (usage.input_tokens as f64 * self.input_per_m
            + usage.output_tokens as f64 * self.output_per_m
            + usage.cache_creation_tokens as f64 * cache_write
            + usage.cache_read_tokens as f64 * cache_read)
            / 1_000_000.0
    }
}

/// Thread-safe pricing table with built-in defaults and custom overrides.
pub struct PricingTable {
    prices: RwLock<HashMap<String, ModelPricing>>,
}

impl PricingTable {
    /// Create a pricing table with built-in model prices.
    pub fn with_defaults() -> Self {
        let mut prices = HashMap::new();

        // ── Anthropic ──────────────────────────────────────────────
        prices.insert(
            "anthropic/claude-opus-4".into(),
            ModelPricing::new(15.0, 75.0).with_cache(18.75, 1.5),
        );
        prices.insert(
            "anthropic/claude-sonnet-4".into(),
            ModelPricing::new(3.0, 15.0).with_cache(3.75, 0.3),
        );
        prices.insert(
            "anthropic/claude-3-7-sonnet".into(),
            ModelPricing::new(3.0, 15.0).with_cache(3.75, 0.3),
        );
        prices.insert(
            "anthropic/claude-3-5-sonnet".into(),
            ModelPricing::new(3.0, 15.0).with_cache(3.75, 0.3),
        );
        prices.insert(
            "anthropic/claude-3-5-haiku".into(),
            ModelPricing::new(0.8, 4.0).with_cache(1.0, 0.08),
        );

        // ── OpenAI ─────────────────────────────────────────────────
        prices.insert(
            "openai/gpt-4o".into(),
            ModelPricing::new(2.5, 10.0).with_cache(2.5, 1.25),
        );
        prices.insert(
            "openai/gpt-4o-mini".into(),
            ModelPricing::new(0.15, 0.6).with_cache(0.15, 0.075),
        );
        prices.insert(
            "openai/gpt-4.1".into(),
            ModelPricing::new(2.0, 8.0).with_cache(2.0, 0.5),
        );
        prices.insert(
            "openai/gpt-4.1-mini".into(),
            ModelPricing::new(0.4, 1.6).with_cache(0.4, 0.1),
        );
        prices.insert(
            "openai/gpt-4.1-nano".into(),
            ModelPricing::new(0.1, 0.4).with_cache(0.1, 0.025),
        );
        prices.insert("openai/o3".into(), ModelPricing::new(2.0, 8.0).with_cache(2.0, 0.5));
        prices.insert(
            "openai/o3-mini".into(),
            ModelPricing::new(1.1, 4.4).with_cache(1.1, 0.55),
        );
        prices.insert(
            "openai/o4-mini".into(),
            ModelPricing::new(1.1, 4.4).with_cache(1.1, 0.275),
        );

        // ── Google ─────────────────────────────────────────────────
        prices.insert(
            "google/gemini-2.0-flash".into(),
            ModelPricing::new(0.1, 0.4).with_cache(0.1, 0.025),
        );
        prices.insert(
            "google/gemini-2.5-flash".into(),
            ModelPricing::new(0.3, 2.5).with_cache(0.3, 0.075),
        );
        prices.insert(
            "google/gemini-2.5-pro".into(),
            ModelPricing::new(1.25, 10.0).with_cache(1.25, 0.31),
        );

        Self {
            prices: RwLock::new(prices),
        }
    }

    /// Create an empty pricing table.
    pub fn empty() -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
        }
    }

    /// Add or update pricing for a model.
    pub fn set(&self, model: impl Into<String>, pricing: ModelPricing) {
        self.prices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(model.into(), pricing);
    }

    /// Look up pricing for a model.
    ///
    /// Supports flexible matching: tries exact match first, then the bare
    /// name under any vendor prefix (`gemini/gemini-2.0-flash` finds
    /// `google/gemini-2.0-flash`), then the longest key whose bare name is
    /// a prefix of the model followed by a snapshot suffix
    /// (`claude-sonnet-4-20250514` → `claude-sonnet-4`). Another variant
    /// such as `o3-mini` never falls back to `o3`.
    pub fn lookup(&self, model: &str) -> Option<ModelPricing> {
        let prices = self.prices.read().unwrap_or_else(PoisonError::into_inner);

        // 1. Exact match
        if let Some(p) = prices.get(model) {
            return Some(p.clone());
        }

        let model_lower = model.to_lowercase();
        let bare_model = bare(&model_lower);

        // 2. Same bare name under any prefix
        if let Some((_, p)) = prices
            .iter()
            .find(|(key, _)| bare(key).eq_ignore_ascii_case(bare_model))
        {
            return Some(p.clone());
        }

        // 3. Longest bare-name prefix match (dated snapshots)
        prices
            .iter()
            .filter(|(key, _)| {
                bare_model
                    .strip_prefix(bare(key).to_lowercase().as_str())
                    .is_some_and(is_snapshot_suffix)
            })
            .max_by_key(|(key, _)| bare(key).len())
            .map(|(_, p)| p.clone())
    }

    /// Cost of one call, or `None` if the model is not priced.
    pub fn compute_cost(&self, model: &str, usage: &Usage) -> Option<f64> {
        let cost = self.lookup(model).map(|p| p.cost(usage));
        if cost.is_none() {
            debug!(model, "No pricing for model; cost unknown");
        }
        cost
    }

    /// List all known model names.
    pub fn models(&self) -> Vec<String> {
        let prices = self.prices.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = prices.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of models in the pricing table.
    pub fn len(&self) -> usize {
        self.prices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn bare(model: &str) -> &str {
    model.rsplit('/').next().unwrap_or(model)
}

/// `-20250514`, `-2024-07-18`, `@20241022` or `-latest`.
fn is_snapshot_suffix(rest: &str) -> bool {
    if let Some(version) = rest.strip_prefix('@') {
        return !version.is_empty();
    }
    match rest.strip_prefix('-') {
        Some("latest") => true,
        Some(tail) => tail.starts_with(|c: char| c.is_ascii_digit()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(input: u64, output: u64) -> Usage {
        Usage {
            input_tokens: input,
            output_tokens: output,
            ..Usage::default()
        }
    }

    #[test]
    fn default_table_has_models() {
        let table = PricingTable::with_defaults();
        assert!(table.len() >= 10);
        assert!(!table.is_empty());
    }

    #[test]
    fn known_model_cost() {
        let table = PricingTable::with_defaults();

        // Claude Sonnet 4: $3/M input, $15/M output
        let cost = table
            .compute_cost("anthropic/claude-sonnet-4", &usage(1000, 500))
            .unwrap();
        // Expected: (1000 * 3.0 + 500 * 15.0) / 1_000_000 = 0.0105
        assert!((cost - 0.0105).abs() < 1e-10);
    }

    #[test]
    fn dated_snapshot_matches_family() {
        let table = PricingTable::with_defaults();
        let cost = table
            .compute_cost("claude-sonnet-4-20250514", &usage(1_000_000, 0))
            .unwrap();
        assert!((cost - 3.0).abs() < 1e-10);

        let mini = table.compute_cost("gpt-4o-mini-2024-07-18", &usage(1_000_000, 0)).unwrap();
        assert!((mini - 0.15).abs() < 1e-10);
    }

    #[test]
    fn variants_do_not_borrow_the_base_price() {
        let table = PricingTable::with_defaults();
        let o3_mini = table.compute_cost("o3-mini", &usage(1_000_000, 0)).unwrap();
        assert!((o3_mini - 1.1).abs() < 1e-10);
        let mini = table
            .compute_cost("gpt-4.1-mini-2025-04-14", &usage(1_000_000, 0))
            .unwrap();
        assert!((mini - 0.4).abs() < 1e-10);

        table.set("openai/o1", ModelPricing::new(15.0, 60.0));
        assert!(table.lookup("o1-mini").is_none());
        assert!(table.lookup("o1-2024-12-17").is_some());
        assert!(table.lookup("claude-3-5-sonnet@20241022").is_some());
        assert!(table.lookup("claude-3-5-sonnet-latest").is_some());
    }

    #[test]
    fn vendor_prefix_is_flexible() {
        let table = PricingTable::with_defaults();
        assert!(table.lookup("gemini/gemini-2.0-flash").is_some());
        assert!(table.lookup("gpt-4o").is_some());
    }

    #[test]
    fn unknown_model_is_unpriced() {
        let table = PricingTable::with_defaults();
        assert!(table.compute_cost("unknown/model-xyz", &usage(1000, 500)).is_none());
        assert!(table.compute_cost("llama3.1", &usage(1000, 500)).is_none());
    }

    #[test]
    fn cache_tokens_are_priced() {
        let p = ModelPricing::new(3.0, 15.0).with_cache(3.75, 0.3);
        let u = Usage {
            input_tokens: 0,
            output_tokens: 0,
            cache_creation_tokens: 1_000_000,
            cache_read_tokens: 1_000_000,
        };
        assert!((p.cost(&u) - 4.05).abs() < 1e-10);
    }

    #[test]
    fn cache_prices_default_from_input_price() {
        let p = ModelPricing::new(2.0, 0.0);
        let u = Usage {
            cache_creation_tokens: 1_000_000,
            cache_read_tokens: 1_000_000,
            ..Usage::default()
        };
        // 2.0 * 1.25 + 2.0 * 0.1
        assert!((p.cost(&u) - 2.7).abs() < 1e-10);
    }

    #[test]
    fn custom_pricing() {
        let table = PricingTable::empty();
        assert!(table.is_empty());

        table.set("custom/model", ModelPricing::new(1.0, 2.0));
        assert_eq!(table.len(), 1);

        let cost = table
            .compute_cost("custom/model", &usage(1_000_000, 1_000_000))
            .unwrap();
        assert!((cost - 3.0).abs() < 1e-10);
    }

    #[test]
    fn list_models_sorted() {
        let table = PricingTable::with_defaults();
        let models = table.models();
        assert!(models.contains(&"openai/gpt-4o".to_string()));
        assert!(models.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn set_overrides_existing() {
        let table = PricingTable::with_defaults();
        table.set("openai/gpt-4o", ModelPricing::new(5.0, 20.0));
        let cost = table.compute_cost("openai/gpt-4o", &usage(1_000_000, 0)).unwrap();
        assert!((cost - 5.0).abs() < 1e-10);
    }
}
