//! Built-in pricing table for common LLM models.
//!
//! Prices are in USD per 1,000 tokens. Each model has an input and an
//! output price. Lookups never fail: names that resolve to nothing in the
//! table fall through family patterns and the local-model heuristic to a
//! conservative default tier. Custom pricing can be added at runtime via
//! TOML config.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{OnceLock, PoisonError, RwLock};

/// Per-thousand-token pricing for a model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Price per 1K input tokens in USD.
    pub input_per_1k: f64,
    /// Price per 1K output tokens in USD.
    pub output_per_1k: f64,
}

impl ModelPricing {
    /// Create a new pricing entry.
    pub const fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            input_per_1k,
            output_per_1k,
        }
    }

    /// Pricing for self-hosted models.
    pub const fn free() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Compute cost for the given token counts.
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        input_tokens as f64 * self.input_per_1k / 1000.0
            + output_tokens as f64 * self.output_per_1k / 1000.0
    }

    pub fn is_free(&self) -> bool {
        self.input_per_1k == 0.0 && self.output_per_1k == 0.0
    }
}

/// Tier applied to model names nothing else matches.
pub const DEFAULT_PRICING: ModelPricing = ModelPricing::new(0.003, 0.015);

/// Which resolution step produced a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Exact,
    CaseInsensitive,
    Prefix,
    Family,
    Local,
    Default,
}

impl std::fmt::Display for PriceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::CaseInsensitive => write!(f, "case_insensitive"),
            Self::Prefix => write!(f, "prefix"),
            Self::Family => write!(f, "family"),
            Self::Local => write!(f, "local"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// Substring patterns mapped to a canonical table key. Order matters: more
/// specific names of a family come before the generic ones.
const FAMILY_PATTERNS: &[(&str, &str)] = &[
    ("gpt-4o-mini", "gpt-4o-mini"),
    ("gpt-4o", "gpt-4o"),
    ("gpt-4-turbo", "gpt-4-turbo"),
    ("gpt-4", "gpt-4"),
    ("gpt-3.5", "gpt-3.5-turbo"),
    ("o1-mini", "o1-mini"),
    ("o3-mini", "o3-mini"),
    ("claude-3-5-haiku", "claude-3-5-haiku"),
    ("claude-3.5-haiku", "claude-3-5-haiku"),
    ("claude-3-5-sonnet", "claude-3-5-sonnet"),
    ("claude-3.5-sonnet", "claude-3-5-sonnet"),
    ("claude-3-haiku", "claude-3-haiku"),
    ("claude-3-opus", "claude-3-opus"),
    ("opus", "claude-opus-4"),
    ("sonnet", "claude-sonnet-4"),
    ("haiku", "claude-3-5-haiku"),
    ("gemini-2.0-flash", "gemini-2.0-flash"),
    ("gemini-1.5-flash", "gemini-1.5-flash"),
    ("gemini-1.5-pro", "gemini-1.5-pro"),
    ("gemini", "gemini-1.5-pro"),
    ("deepseek-reasoner", "deepseek-reasoner"),
    ("deepseek-r1", "deepseek-reasoner"),
    ("deepseek", "deepseek-chat"),
    ("mistral-small", "mistral-small"),
    ("mistral-large", "mistral-large"),
    ("mistral", "mistral-large"),
];

/// Indicators of a self-hosted model.
const LOCAL_MODEL_HINTS: &[&str] = &["ollama", "llama", "localhost", "local"];

fn builtin_prices() -> HashMap<String, ModelPricing> {
    let mut prices = HashMap::new();

    // ── OpenAI ─────────────────────────────────────────────────
    prices.insert("gpt-4o".into(), ModelPricing::new(0.0025, 0.01));
    prices.insert("gpt-4o-mini".into(), ModelPricing::new(0.00015, 0.0006));
    prices.insert("gpt-4-turbo".into(), ModelPricing::new(0.01, 0.03));
    prices.insert("gpt-4".into(), ModelPricing::new(0.03, 0.06));
    prices.insert("gpt-3.5-turbo".into(), ModelPricing::new(0.0005, 0.0015));
    prices.insert("o1".into(), ModelPricing::new(0.015, 0.06));
    prices.insert("o1-mini".into(), ModelPricing::new(0.003, 0.012));
    prices.insert("o3-mini".into(), ModelPricing::new(0.0011, 0.0044));

    // ── Anthropic ──────────────────────────────────────────────
    prices.insert("claude-opus-4".into(), ModelPricing::new(0.015, 0.075));
    prices.insert("claude-sonnet-4".into(), ModelPricing::new(0.003, 0.015));
    prices.insert("claude-3-5-sonnet".into(), ModelPricing::new(0.003, 0.015));
    prices.insert("claude-3-5-haiku".into(), ModelPricing::new(0.0008, 0.004));
    prices.insert("claude-3-opus".into(), ModelPricing::new(0.015, 0.075));
    prices.insert("claude-3-haiku".into(), ModelPricing::new(0.00025, 0.00125));

    // ── Google ─────────────────────────────────────────────────
    prices.insert("gemini-2.0-flash".into(), ModelPricing::new(0.0001, 0.0004));
    prices.insert("gemini-1.5-pro".into(), ModelPricing::new(0.00125, 0.005));
    prices.insert("gemini-1.5-flash".into(), ModelPricing::new(0.000075, 0.0003));

    // ── DeepSeek ───────────────────────────────────────────────
    prices.insert("deepseek-chat".into(), ModelPricing::new(0.00027, 0.0011));
    prices.insert("deepseek-reasoner".into(), ModelPricing::new(0.00055, 0.00219));

    // ── Mistral ────────────────────────────────────────────────
    prices.insert("mistral-large".into(), ModelPricing::new(0.002, 0.006));
    prices.insert("mistral-small".into(), ModelPricing::new(0.0002, 0.0006));

    prices
}

/// Thread-safe pricing table with built-in defaults and custom overrides.
pub struct PricingTable {
    prices: RwLock<HashMap<String, ModelPricing>>,
}

impl PricingTable {
    /// Create a pricing table with built-in model prices.
    pub fn with_defaults() -> Self {
        Self {
            prices: RwLock::new(builtin_prices()),
        }
    }

    /// Create an empty pricing table. Family patterns that point at
    /// missing entries fall through to the default tier.
    pub fn empty() -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
        }
    }

    /// Look up the exact entry for a model, without fallback resolution.
    pub fn get(&self, model: &str) -> Option<ModelPricing> {
        let prices = self.prices.read().unwrap_or_else(PoisonError::into_inner);
        prices.get(model).copied()
    }

    /// Add or update pricing for a model.
    pub fn set(&self, model: impl Into<String>, pricing: ModelPricing) {
        let mut prices = self.prices.write().unwrap_or_else(PoisonError::into_inner);
        prices.insert(model.into(), pricing);
    }

    /// Resolve pricing for an arbitrary model name.
    pub fn resolve(&self, model: &str) -> ModelPricing {
        self.resolve_with_source(model).0
    }

    /// Resolve pricing and report which step matched.
    ///
    /// Order: exact, case-insensitive exact, case-insensitive prefix
    /// (longest key wins, so `gpt-4o-2024-08-06` prices as `gpt-4o`),
    /// family substring, local-model heuristic, default tier.
    pub fn resolve_with_source(&self, model: &str) -> (ModelPricing, PriceSource) {
        let prices = self.prices.read().unwrap_or_else(PoisonError::into_inner);

        if let Some(p) = prices.get(model) {
            return (*p, PriceSource::Exact);
        }

        let model_lower = model.to_lowercase();
        if let Some((_, p)) = prices.iter().find(|(k, _)| k.to_lowercase() == model_lower) {
            return (*p, PriceSource::CaseInsensitive);
        }

        let mut best: Option<(&str, &ModelPricing)> = None;
        for (key, pricing) in prices.iter() {
            if !model_lower.starts_with(&key.to_lowercase()) {
                continue;
            }
            let better = match best {
                None => true,
                Some((k, _)) => key.len() > k.len() || (key.len() == k.len() && key.as_str() < k),
            };
            if better {
                best = Some((key.as_str(), pricing));
            }
        }
        if let Some((_, p)) = best {
            return (*p, PriceSource::Prefix);
        }

        for (pattern, key) in FAMILY_PATTERNS {
            if model_lower.contains(pattern) {
                if let Some(p) = prices.get(*key) {
                    return (*p, PriceSource::Family);
                }
            }
        }

        if LOCAL_MODEL_HINTS.iter().any(|hint| model_lower.contains(hint)) {
            return (ModelPricing::free(), PriceSource::Local);
        }

        tracing::debug!(model = %model, "No pricing entry matched, using default tier");
        (DEFAULT_PRICING, PriceSource::Default)
    }

    /// Compute cost for a model call.
    pub fn compute_cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        self.resolve(model).cost(input_tokens, output_tokens)
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

fn builtin_table() -> &'static PricingTable {
    static TABLE: OnceLock<PricingTable> = OnceLock::new();
    TABLE.get_or_init(PricingTable::with_defaults)
}

/// Resolve pricing against the built-in table.
pub fn get_model_pricing(model: &str) -> ModelPricing {
    builtin_table().resolve(model)
}

/// Estimated USD cost of a call against the built-in table.
pub fn calculate_cost(input_tokens: u64, output_tokens: u64, model: &str) -> f64 {
    get_model_pricing(model).cost(input_tokens, output_tokens)
}
