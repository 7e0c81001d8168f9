//! Assistant definitions and parameter resolution
//!
//! An assistant is a named bundle of seed messages, a model and sampling
//! parameters. Resolution merges, per field and in ascending priority: the
//! built-in fallbacks, the global config defaults, the built-in assistant of
//! the same name, the configured assistant and command-line overrides.

use crate::config::Settings;
use crate::llm::{route_model, Endpoint, Message, Provider, RequestSpec};
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_ASSISTANT: &str = "general";
const DEFAULT_PROVIDER: Provider = Provider::OpenAi;
const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_TOP_P: f32 = 1.0;

const BUILTIN_NAMES: [&str; 3] = ["dev", "general", "bash"];

/// Assistant as written in the config file; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AssistantConfig {
    pub messages: Option<Vec<Message>>,
    pub provider: Option<Provider>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub openai_base_url_override: Option<String>,
    pub openai_api_key_override: Option<String>,
    pub anthropic_base_url_override: Option<String>,
    pub anthropic_api_key_override: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub thinking_budget: Option<u32>,
}

impl AssistantConfig {
    /// Fill every unset field from `base`
    #[must_use]
    pub fn or(self, base: AssistantConfig) -> AssistantConfig {
        AssistantConfig {
            messages: self.messages.or(base.messages),
            provider: self.provider.or(base.provider),
            model: self.model.or(base.model),
            base_url: self.base_url.or(base.base_url),
            api_key: self.api_key.or(base.api_key),
            openai_base_url_override: self.openai_base_url_override.or(base.openai_base_url_override),
            openai_api_key_override: self.openai_api_key_override.or(base.openai_api_key_override),
            anthropic_base_url_override: self.anthropic_base_url_override.or(base.anthropic_base_url_override),
            anthropic_api_key_override: self.anthropic_api_key_override.or(base.anthropic_api_key_override),
            temperature: self.temperature.or(base.temperature),
            top_p: self.top_p.or(base.top_p),
            thinking_budget: self.thinking_budget.or(base.thinking_budget),
        }
    }

    /// Credential fields that only apply to one provider
    fn legacy_overrides(&self, provider: Provider) -> (Option<&String>, Option<&String>) {
        match provider {
            Provider::OpenAi => (
                self.openai_api_key_override.as_ref(),
                self.openai_base_url_override.as_ref(),
            ),
            Provider::Anthropic => (
                self.anthropic_api_key_override.as_ref(),
                self.anthropic_base_url_override.as_ref(),
            ),
            _ => (None, None),
        }
    }
}

/// Command-line overrides, highest priority
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub provider: Option<Provider>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub thinking_budget: Option<u32>,
}

/// Everything needed to start a conversation
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAssistant {
    pub name: String,
    pub spec: RequestSpec,
    pub seed: Vec<Message>,
    pub endpoint: Endpoint,
}

#[derive(Debug, Clone, Error)]
pub enum AssistantError {
    #[error("Unknown assistant: {name}. Available: {}", .available.join(", "))]
    Unknown { name: String, available: Vec<String> },
}

fn uname() -> String {
    format!("{} {}", std::env::consts::OS, std::env::consts::ARCH)
}

/// Built-in assistant definition, if `name` is one
pub fn builtin_assistant(name: &str) -> Option<AssistantConfig> {
    let messages = match name {
        "dev" => vec![
            Message::system(format!(
                "You are a helpful assistant who is an expert in software development. \
                 You are helping a user who is a software developer. Your responses are short and concise. \
                 You include code snippets when appropriate. Code snippets are formatted using Markdown \
                 with a correct language tag. User's `uname`: {}",
                uname()
            )),
            Message::user("Your responses must be short and concise. Do not include explanations unless asked."),
            Message::assistant("Understood."),
        ],
        "general" => Vec::new(),
        "bash" => vec![Message::system(format!(
            "You output only valid and correct shell commands according to the user's prompt. \
             You don't provide any explanations or any other text that is not valid shell commands. \
             User's `uname`: {}. User's `$SHELL`: {}.",
            uname(),
            std::env::var("SHELL").unwrap_or_else(|_| "unknown".to_string())
        ))],
        _ => return None,
    };
    Some(AssistantConfig {
        messages: Some(messages),
        ..AssistantConfig::default()
    })
}

/// Names of every assistant available with these settings, sorted
pub fn assistant_names(settings: &Settings) -> Vec<String> {
    let mut names: Vec<String> = BUILTIN_NAMES
        .iter()
        .map(|n| (*n).to_string())
        .chain(settings.assistants.keys().cloned())
        .collect();
    names.sort();
    names.dedup();
    names
}

/// Resolve an assistant name into request parameters, seed and endpoint
pub fn resolve_assistant(
    settings: &Settings,
    name: &str,
    overrides: &Overrides,
) -> Result<ResolvedAssistant, AssistantError> {
    let config = match (settings.assistants.get(name), builtin_assistant(name)) {
        (Some(custom), Some(builtin)) => custom.clone().or(builtin),
        (Some(custom), None) => custom.clone(),
        (None, Some(builtin)) => builtin,
        (None, None) => {
            return Err(AssistantError::Unknown {
                name: name.to_string(),
                available: assistant_names(settings),
            })
        }
    };

    let model = overrides
        .model
        .clone()
        .or_else(|| config.model.clone())
        .or_else(|| settings.default_model.clone())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let route = route_model(&model);

    // An explicit provider wins; otherwise the model name decides and the
    // configured default is only the fallback
    let provider = overrides
        .provider
        .or(config.provider)
        .or(route.provider)
        .or(settings.default_provider)
        .unwrap_or(DEFAULT_PROVIDER);

    let spec = RequestSpec {
        provider,
        model: route.model,
        temperature: Some(
            overrides
                .temperature
                .or(config.temperature)
                .unwrap_or(DEFAULT_TEMPERATURE),
        ),
        top_p: Some(overrides.top_p.or(config.top_p).unwrap_or(DEFAULT_TOP_P)),
        thinking_budget: overrides.thinking_budget.or(config.thinking_budget),
    };

    let (legacy_key, legacy_url) = config.legacy_overrides(provider);
    let (global_key, global_url) = settings.credentials(provider);
    let endpoint = Endpoint {
        api_key: config
            .api_key
            .clone()
            .or_else(|| legacy_key.cloned())
            .or_else(|| global_key.cloned()),
        base_url: config
            .base_url
            .clone()
            .or_else(|| legacy_url.cloned())
            .or_else(|| global_url.cloned()),
        api_version: match provider {
            Provider::AzureOpenAi => settings.azure_openai_api_version.clone(),
            _ => None,
        },
    };

    tracing::debug!(
        assistant = %name,
        provider = %spec.provider,
        model = %spec.model,
        "Resolved assistant"
    );

    Ok(ResolvedAssistant {
        name: name.to_string(),
        spec,
        seed: config.messages.unwrap_or_default(),
        endpoint,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MessageRole;

    fn settings(yaml: &str) -> Settings {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_builtin_defaults() {
        let resolved = resolve_assistant(&Settings::default(), "general", &Overrides::default()).unwrap();
        assert_eq!(resolved.spec.provider, Provider::OpenAi);
        assert_eq!(resolved.spec.model, "gpt-4o");
        assert_eq!(resolved.spec.temperature, Some(0.7));
        assert_eq!(resolved.spec.top_p, Some(1.0));
        assert_eq!(resolved.spec.thinking_budget, None);
        assert!(resolved.seed.is_empty());
    }

    #[test]
    fn test_dev_seed_shape() {
        let resolved = resolve_assistant(&Settings::default(), "dev", &Overrides::default()).unwrap();
        let roles: Vec<_> = resolved.seed.iter().map(|m| m.role).collect();
        assert_eq!(roles, [MessageRole::System, MessageRole::User, MessageRole::Assistant]);
        assert!(resolved.seed[0].content.contains(std::env::consts::OS));
    }

    #[test]
    fn test_unknown_assistant() {
        let err = resolve_assistant(&Settings::default(), "pirate", &Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("bash, dev, general"));
    }

    #[test]
    fn test_custom_assistant_merges_over_builtin() {
        let settings = settings(
            "assistants:\n  dev:\n    model: claude-3-7-sonnet-latest\n    temperature: 0.2\n",
        );
        let resolved = resolve_assistant(&settings, "dev", &Overrides::default()).unwrap();
        // Seed still comes from the built-in
        assert_eq!(resolved.seed.len(), 3);
        assert_eq!(resolved.spec.provider, Provider::Anthropic);
        assert_eq!(resolved.spec.temperature, Some(0.2));
        assert_eq!(resolved.spec.top_p, Some(1.0));
    }

    #[test]
    fn test_inference_beats_default_provider() {
        let settings = settings(
            "default_provider: google\nassistants:\n  pirate:\n    model: claude-sonnet-4-0\n    messages:\n      - role: system\n        content: You are a pirate\n",
        );
        let resolved = resolve_assistant(&settings, "pirate", &Overrides::default()).unwrap();
        assert_eq!(resolved.spec.provider, Provider::Anthropic);
        assert_eq!(resolved.seed[0].content, "You are a pirate");

        // Unrecognised model names fall back to the configured default
        let overrides = Overrides {
            model: Some("my-model".to_string()),
            ..Default::default()
        };
        let resolved = resolve_assistant(&settings, "pirate", &overrides).unwrap();
        assert_eq!(resolved.spec.provider, Provider::Google);
    }

    #[test]
    fn test_overrides_win() {
        let settings = settings(
            "default_model: gpt-4o-mini\nassistants:\n  pirate:\n    model: gpt-4.1\n    top_p: 0.5\n",
        );
        let overrides = Overrides {
            provider: Some(Provider::AzureOpenAi),
            model: Some("oai-azure:prod".to_string()),
            temperature: Some(0.1),
            top_p: Some(0.9),
            thinking_budget: None,
        };
        let resolved = resolve_assistant(&settings, "pirate", &overrides).unwrap();
        assert_eq!(resolved.spec.provider, Provider::AzureOpenAi);
        assert_eq!(resolved.spec.model, "prod");
        assert_eq!(resolved.spec.temperature, Some(0.1));
        assert_eq!(resolved.spec.top_p, Some(0.9));
    }

    #[test]
    fn test_global_default_model() {
        let settings = settings("default_model: gemini-2.5-flash\n");
        let resolved = resolve_assistant(&settings, "general", &Overrides::default()).unwrap();
        assert_eq!(resolved.spec.provider, Provider::Google);
        assert_eq!(resolved.spec.model, "gemini-2.5-flash");
    }

    #[test]
    fn test_credential_precedence() {
        let settings = settings(
            "openai_api_key: global-key\nopenai_base_url: https://global\nassistants:\n  a:\n    model: gpt-4o\n    openai_api_key_override: legacy-key\n  b:\n    model: gpt-4o\n    api_key: own-key\n    openai_api_key_override: legacy-key\n  c:\n    model: gpt-4o\n",
        );
        let key = |name: &str| {
            resolve_assistant(&settings, name, &Overrides::default())
                .unwrap()
                .endpoint
                .api_key
        };
        assert_eq!(key("a").as_deref(), Some("legacy-key"));
        assert_eq!(key("b").as_deref(), Some("own-key"));
        assert_eq!(key("c").as_deref(), Some("global-key"));

        let resolved = resolve_assistant(&settings, "c", &Overrides::default()).unwrap();
        assert_eq!(resolved.endpoint.base_url.as_deref(), Some("https://global"));
    }

    #[test]
    fn test_legacy_override_ignored_for_other_providers() {
        let settings = settings(
            "assistants:\n  a:\n    model: claude-3-5-haiku-latest\n    openai_api_key_override: legacy-key\n",
        );
        let resolved = resolve_assistant(&settings, "a", &Overrides::default()).unwrap();
        assert_eq!(resolved.endpoint.api_key, None);
    }
}
