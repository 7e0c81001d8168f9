//! Provider definitions and model-name dispatch
//!
//! The prefix table in this module decides which vendor a bare model name
//! belongs to. It is a plain ordered slice so that the dispatch is
//! deterministic and easy to test.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// LLM provider enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenAi,
    AzureOpenAi,
    Anthropic,
    Google,
    Cohere,
    /// llama.cpp or any other local server speaking the `OpenAI` protocol
    Llama,
}

impl Provider {
    pub const ALL: [Provider; 6] = [
        Provider::OpenAi,
        Provider::AzureOpenAi,
        Provider::Anthropic,
        Provider::Google,
        Provider::Cohere,
        Provider::Llama,
    ];

    /// Name used in configuration files and on the command line
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::AzureOpenAi => "azure-openai",
            Provider::Anthropic => "anthropic",
            Provider::Google => "google",
            Provider::Cohere => "cohere",
            Provider::Llama => "llama",
        }
    }

    /// Get the display name for this provider
    pub fn display_name(self) -> &'static str {
        match self {
            Provider::OpenAi => "OpenAI",
            Provider::AzureOpenAi => "Azure OpenAI",
            Provider::Anthropic => "Anthropic",
            Provider::Google => "Google",
            Provider::Cohere => "Cohere",
            Provider::Llama => "LLaMA",
        }
    }

    /// Prefix of the `<provider>_api_key` / `<provider>_base_url` config keys
    pub fn config_key(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::AzureOpenAi => "azure_openai",
            Provider::Anthropic => "anthropic",
            Provider::Google => "google",
            Provider::Cohere => "cohere",
            Provider::Llama => "llama",
        }
    }

    /// Environment variables consulted for the API key, in order
    pub fn api_key_env_vars(self) -> &'static [&'static str] {
        match self {
            Provider::OpenAi => &["OPENAI_API_KEY"],
            Provider::AzureOpenAi => &["AZURE_OPENAI_API_KEY"],
            Provider::Anthropic => &["ANTHROPIC_API_KEY"],
            Provider::Google => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
            Provider::Cohere => &["COHERE_API_KEY", "CO_API_KEY"],
            Provider::Llama => &["LLAMA_API_KEY"],
        }
    }

    /// Environment variables consulted for the base URL, in order
    pub fn base_url_env_vars(self) -> &'static [&'static str] {
        match self {
            Provider::OpenAi => &["OPENAI_BASE_URL"],
            Provider::AzureOpenAi => &["AZURE_OPENAI_ENDPOINT"],
            Provider::Anthropic => &["ANTHROPIC_BASE_URL"],
            Provider::Google => &["GEMINI_BASE_URL"],
            Provider::Cohere => &["COHERE_BASE_URL"],
            Provider::Llama => &["LLAMA_BASE_URL"],
        }
    }

    /// Local servers run without credentials
    pub fn requires_api_key(self) -> bool {
        !matches!(self, Provider::Llama)
    }

    /// Whether `model` accepts an extended-thinking budget on this provider
    pub fn supports_thinking(self, model: &str) -> bool {
        const ANTHROPIC: &[&str] = &[
            "claude-3-7",
            "claude-sonnet-4",
            "claude-opus-4",
            "claude-haiku-4",
        ];
        match self {
            Provider::Anthropic => ANTHROPIC.iter().any(|p| model.starts_with(p)),
            Provider::Google => model.starts_with("gemini-2.5"),
            Provider::Cohere => model.starts_with("command-a-reasoning"),
            Provider::OpenAi | Provider::AzureOpenAi | Provider::Llama => false,
        }
    }

    /// Smallest thinking budget the vendor accepts
    pub fn min_thinking_budget(self) -> u32 {
        match self {
            Provider::Anthropic => 1024,
            _ => 1,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("Unknown provider: {0}. Valid providers: anthropic, azure-openai, cohere, google, llama, openai")]
pub struct UnknownProvider(pub String);

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownProvider(s.to_string()))
    }
}

impl<'de> serde::Deserialize<'de> for Provider {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Entry of the model-name dispatch table
struct PrefixRule {
    prefix: &'static str,
    provider: Provider,
    /// Legacy routing prefixes are removed before the name reaches the vendor
    strip: bool,
}

const fn legacy(prefix: &'static str, provider: Provider) -> PrefixRule {
    PrefixRule {
        prefix,
        provider,
        strip: true,
    }
}

const fn family(prefix: &'static str, provider: Provider) -> PrefixRule {
    PrefixRule {
        prefix,
        provider,
        strip: false,
    }
}

/// Ordered dispatch table. Legacy `vendor:` prefixes come first so that
/// `oai-azure:` is never mistaken for an `o*` model family.
const PREFIX_RULES: &[PrefixRule] = &[
    legacy("oai-compat:", Provider::OpenAi),
    legacy("oai-azure:", Provider::AzureOpenAi),
    legacy("openai:", Provider::OpenAi),
    legacy("anthropic:", Provider::Anthropic),
    family("gpt", Provider::OpenAi),
    family("ft:gpt", Provider::OpenAi),
    family("chatgpt", Provider::OpenAi),
    family("o1", Provider::OpenAi),
    family("o3", Provider::OpenAi),
    family("o4", Provider::OpenAi),
    family("claude", Provider::Anthropic),
    family("llama", Provider::Llama),
    family("command", Provider::Cohere),
    family("c4ai", Provider::Cohere),
    family("gemini", Provider::Google),
    family("gemma", Provider::Google),
];

/// A model name after dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRoute {
    /// Provider inferred from the name, if any rule matched
    pub provider: Option<Provider>,
    /// Name to send to the vendor, legacy prefix removed
    pub model: String,
}

/// Infer the provider for a model name and strip legacy routing prefixes.
///
/// Pure: the same input always yields the same route.
pub fn route_model(model: &str) -> ModelRoute {
    ModelRoute {
        provider: infer_provider(model),
        model: strip_legacy_prefix(model).to_string(),
    }
}

/// Infer the provider from a model name alone
pub fn infer_provider(model: &str) -> Option<Provider> {
    PREFIX_RULES
        .iter()
        .find(|rule| model.starts_with(rule.prefix))
        .map(|rule| rule.provider)
}

/// Remove a legacy routing prefix, leaving other names untouched
pub fn strip_legacy_prefix(model: &str) -> &str {
    PREFIX_RULES
        .iter()
        .filter(|rule| rule.strip)
        .find_map(|rule| model.strip_prefix(rule.prefix))
        .unwrap_or(model)
}
