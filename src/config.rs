//! YAML settings
//!
//! Loaded once at startup into an immutable [`Settings`]. `!include path`
//! tags anywhere in the document are replaced by the parsed content of the
//! referenced file before deserialization, and credentials missing from the
//! document fall back to the vendor environment variables.

use crate::assistant::AssistantConfig;
use crate::llm::Provider;
use crate::pricing::PriceEntry;
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

const MAX_INCLUDE_DEPTH: usize = 16;
const AZURE_API_VERSION_ENV: &str = "OPENAI_API_VERSION";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Invalid !include in {}: expected a file path", .0.display())]
    IncludeTarget(PathBuf),
    #[error("Includes nested deeper than {MAX_INCLUDE_DEPTH} levels at {}", .0.display())]
    IncludeDepth(PathBuf),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub default_assistant: Option<String>,
    pub default_provider: Option<Provider>,
    pub default_model: Option<String>,
    pub show_price: Option<bool>,
    pub log_file: Option<PathBuf>,
    pub log_level: Option<String>,

    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub azure_openai_api_key: Option<String>,
    pub azure_openai_base_url: Option<String>,
    pub azure_openai_api_version: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub anthropic_base_url: Option<String>,
    pub google_api_key: Option<String>,
    pub google_base_url: Option<String>,
    pub cohere_api_key: Option<String>,
    pub cohere_base_url: Option<String>,
    pub llama_api_key: Option<String>,
    pub llama_base_url: Option<String>,

    pub assistants: HashMap<String, AssistantConfig>,
    pub pricing: Vec<PriceEntry>,
}

impl Settings {
    pub fn show_price(&self) -> bool {
        self.show_price.unwrap_or(true)
    }

    /// Configured `(api_key, base_url)` for a provider
    pub fn credentials(&self, provider: Provider) -> (Option<&String>, Option<&String>) {
        match provider {
            Provider::OpenAi => (self.openai_api_key.as_ref(), self.openai_base_url.as_ref()),
            Provider::AzureOpenAi => (
                self.azure_openai_api_key.as_ref(),
                self.azure_openai_base_url.as_ref(),
            ),
            Provider::Anthropic => (self.anthropic_api_key.as_ref(), self.anthropic_base_url.as_ref()),
            Provider::Google => (self.google_api_key.as_ref(), self.google_base_url.as_ref()),
            Provider::Cohere => (self.cohere_api_key.as_ref(), self.cohere_base_url.as_ref()),
            Provider::Llama => (self.llama_api_key.as_ref(), self.llama_base_url.as_ref()),
        }
    }

    fn credentials_mut(&mut self, provider: Provider) -> (&mut Option<String>, &mut Option<String>) {
        match provider {
            Provider::OpenAi => (&mut self.openai_api_key, &mut self.openai_base_url),
            Provider::AzureOpenAi => (&mut self.azure_openai_api_key, &mut self.azure_openai_base_url),
            Provider::Anthropic => (&mut self.anthropic_api_key, &mut self.anthropic_base_url),
            Provider::Google => (&mut self.google_api_key, &mut self.google_base_url),
            Provider::Cohere => (&mut self.cohere_api_key, &mut self.cohere_base_url),
            Provider::Llama => (&mut self.llama_api_key, &mut self.llama_base_url),
        }
    }

    /// Fill credentials the document left unset from the environment
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let first = |names: &[&str]| {
            names
                .iter()
                .filter_map(|name| lookup(name))
                .find(|value| !value.trim().is_empty())
        };
        for provider in Provider::ALL {
            let key_env = first(provider.api_key_env_vars());
            let url_env = first(provider.base_url_env_vars());
            let (key, url) = self.credentials_mut(provider);
            if key.is_none() {
                *key = key_env;
            }
            if url.is_none() {
                *url = url_env;
            }
        }
        if self.azure_openai_api_version.is_none() {
            self.azure_openai_api_version = first(&[AZURE_API_VERSION_ENV]);
        }
    }
}

/// `<config dir>/gpt-cli/gpt.yml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("gpt-cli").join("gpt.yml"))
}

/// Load settings and apply environment fallbacks
///
/// An explicit path must exist; the default location is optional.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings, ConfigError> {
    let mut settings = match explicit {
        Some(path) if !path.exists() => return Err(ConfigError::NotFound(path.to_path_buf())),
        Some(path) => load(path)?,
        None => match default_config_path() {
            Some(path) if path.exists() => load(&path)?,
            _ => {
                tracing::debug!("No config file, using defaults");
                Settings::default()
            }
        },
    };
    settings.apply_env(|name| std::env::var(name).ok());
    Ok(settings)
}

/// Parse one settings file, resolving includes
pub fn load(path: &Path) -> Result<Settings, ConfigError> {
    let document = read_document(path, 0)?;
    if document.is_null() {
        return Ok(Settings::default());
    }
    let settings = serde_yaml::from_value(document).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), "Loaded config");
    Ok(settings)
}

fn read_document(path: &Path, depth: usize) -> Result<Value, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let document: Value = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    resolve_includes(document, path, base, depth)
}

fn resolve_includes(value: Value, file: &Path, base: &Path, depth: usize) -> Result<Value, ConfigError> {
    match value {
        Value::Tagged(tagged) if tagged.tag == "include" => {
            let Value::String(target) = tagged.value else {
                return Err(ConfigError::IncludeTarget(file.to_path_buf()));
            };
            let target = base.join(target);
            if depth >= MAX_INCLUDE_DEPTH {
                return Err(ConfigError::IncludeDepth(target));
            }
            read_document(&target, depth + 1)
        }
        Value::Mapping(mapping) => mapping
            .into_iter()
            .map(|(k, v)| Ok((k, resolve_includes(v, file, base, depth)?)))
            .collect::<Result<serde_yaml::Mapping, _>>()
            .map(Value::Mapping),
        Value::Sequence(items) => items
            .into_iter()
            .map(|v| resolve_includes(v, file, base, depth))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Sequence),
        other => Ok(other),
    }
}
