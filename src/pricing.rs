//! Per-model token prices and cost computation
//!
//! Entries are keyed by provider and a model pattern: an exact name, a
//! prefix ending in `*`, or `*` alone as the provider-wide default. Lookup
//! prefers the exact name, then the longest matching prefix, then the
//! default. Models with no match cost zero and are flagged as unknown.

use crate::llm::Provider;
use serde::Deserialize;

/// One row of the price table
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PriceEntry {
    pub provider: Provider,
    #[serde(alias = "model_pattern")]
    pub model: String,
    /// USD per 1000 input tokens
    pub input_per_1k: f64,
    /// USD per 1000 output tokens
    pub output_per_1k: f64,
}

/// How a price was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSource {
    Exact,
    Prefix,
    ProviderDefault,
    /// No entry matched; the amount is zero
    Unknown,
}

/// Cost of one completion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cost {
    /// USD
    pub amount: f64,
    pub source: PriceSource,
}

impl Cost {
    pub fn unknown() -> Self {
        Self {
            amount: 0.0,
            source: PriceSource::Unknown,
        }
    }

    pub fn unknown_pricing(&self) -> bool {
        self.source == PriceSource::Unknown
    }
}

// (provider, pattern, input per 1k, output per 1k)
const BUILTIN: &[(Provider, &str, f64, f64)] = &[
    (Provider::OpenAi, "gpt-4o", 0.0025, 0.01),
    (Provider::OpenAi, "gpt-4o-*", 0.0025, 0.01),
    (Provider::OpenAi, "gpt-4o-mini*", 0.000_15, 0.0006),
    (Provider::OpenAi, "gpt-4.1*", 0.002, 0.008),
    (Provider::OpenAi, "gpt-4.1-mini*", 0.0004, 0.0016),
    (Provider::OpenAi, "gpt-4.1-nano*", 0.0001, 0.0004),
    (Provider::OpenAi, "o1*", 0.015, 0.06),
    (Provider::OpenAi, "o3*", 0.002, 0.008),
    (Provider::OpenAi, "o3-mini*", 0.0011, 0.0044),
    (Provider::OpenAi, "o4-mini*", 0.0011, 0.0044),
    (Provider::OpenAi, "gpt-4-turbo*", 0.01, 0.03),
    (Provider::OpenAi, "gpt-4", 0.03, 0.06),
    (Provider::OpenAi, "gpt-3.5-turbo*", 0.0005, 0.0015),
    (Provider::OpenAi, "*", 0.0025, 0.01),
    (Provider::AzureOpenAi, "*", 0.0025, 0.01),
    (Provider::Anthropic, "claude-3-7-sonnet*", 0.003, 0.015),
    (Provider::Anthropic, "claude-sonnet-4*", 0.003, 0.015),
    (Provider::Anthropic, "claude-opus-4*", 0.015, 0.075),
    (Provider::Anthropic, "claude-3-5-sonnet*", 0.003, 0.015),
    (Provider::Anthropic, "claude-3-5-haiku*", 0.0008, 0.004),
    (Provider::Anthropic, "claude-3-haiku*", 0.000_25, 0.001_25),
    (Provider::Anthropic, "claude-3-opus*", 0.015, 0.075),
    (Provider::Anthropic, "*", 0.003, 0.015),
    (Provider::Google, "gemini-2.5-pro*", 0.001_25, 0.01),
    (Provider::Google, "gemini-2.5-flash*", 0.0003, 0.0025),
    (Provider::Google, "gemini-2.0-flash*", 0.0001, 0.0004),
    (Provider::Google, "gemini-1.5-pro*", 0.001_25, 0.005),
    (Provider::Google, "gemini-1.5-flash*", 0.000_075, 0.0003),
    (Provider::Google, "*", 0.0003, 0.0025),
    (Provider::Cohere, "command-r-plus*", 0.0025, 0.01),
    (Provider::Cohere, "command-r*", 0.000_15, 0.0006),
    (Provider::Cohere, "command-a*", 0.0025, 0.01),
    (Provider::Cohere, "*", 0.0025, 0.01),
    // Local inference is free
    (Provider::Llama, "*", 0.0, 0.0),
];

/// Price table
#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    entries: Vec<PriceEntry>,
}

impl PriceTable {
    /// Table with the built-in rates
    pub fn builtin() -> Self {
        Self {
            entries: BUILTIN
                .iter()
                .map(|&(provider, model, input_per_1k, output_per_1k)| PriceEntry {
                    provider,
                    model: model.to_string(),
                    input_per_1k,
                    output_per_1k,
                })
                .collect(),
        }
    }

    /// Put `overrides` ahead of the existing entries.
    ///
    /// Overrides win over built-ins with the same pattern; a more specific
    /// built-in pattern still wins over a broader override.
    #[must_use]
    pub fn with_overrides(mut self, overrides: Vec<PriceEntry>) -> Self {
        let mut entries = overrides;
        entries.append(&mut self.entries);
        self.entries = entries;
        self
    }

    /// Find the entry for a model, most specific match first
    pub fn lookup(&self, provider: Provider, model: &str) -> Option<(&PriceEntry, PriceSource)> {
        let mut best_prefix: Option<(&PriceEntry, usize)> = None;
        let mut default = None;

        for entry in self.entries.iter().filter(|e| e.provider == provider) {
            match entry.model.strip_suffix('*') {
                None if entry.model == model => return Some((entry, PriceSource::Exact)),
                None => {}
                Some("") => {
                    default.get_or_insert(entry);
                }
                Some(prefix) if model.starts_with(prefix) => {
                    if best_prefix.map_or(true, |(_, len)| prefix.len() > len) {
                        best_prefix = Some((entry, prefix.len()));
                    }
                }
                Some(_) => {}
            }
        }

        best_prefix
            .map(|(entry, _)| (entry, PriceSource::Prefix))
            .or_else(|| default.map(|entry| (entry, PriceSource::ProviderDefault)))
    }

    /// Cost of a completion in USD
    #[allow(clippy::cast_precision_loss)]
    pub fn cost(&self, provider: Provider, model: &str, input_tokens: u64, output_tokens: u64) -> Cost {
        match self.lookup(provider, model) {
            Some((entry, source)) => Cost {
                amount: input_tokens as f64 / 1000.0 * entry.input_per_1k
                    + output_tokens as f64 / 1000.0 * entry.output_per_1k,
                source,
            },
            None => {
                tracing::debug!(provider = %provider, model = %model, "No price for model");
                Cost::unknown()
            }
        }
    }
}
