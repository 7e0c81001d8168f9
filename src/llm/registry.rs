//! Construction of provider adapters from resolved credentials

use super::anthropic::AnthropicService;
use super::cohere::CohereService;
use super::gemini::GeminiService;
use super::openai::{Flavor, OpenAIService};
use super::{CompletionProvider, LlmError, LoggingProvider, Provider};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// Where and how to reach one vendor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoint {
    pub api_key: Option<String>,
    /// Overrides the vendor's public URL (proxies, Azure resources, local servers)
    pub base_url: Option<String>,
    /// Azure `api-version` query parameter
    pub api_version: Option<String>,
}

impl Endpoint {
    fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

fn http_client() -> Result<Client, LlmError> {
    Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .timeout(Duration::from_secs(600))
        .build()
        .map_err(|e| LlmError::transport(format!("Failed to create HTTP client: {e}")))
}

/// Create the adapter for `provider`, wrapped with request logging.
///
/// Fails before any network traffic when a required credential is missing.
pub fn create_provider(
    provider: Provider,
    endpoint: &Endpoint,
) -> Result<Arc<dyn CompletionProvider>, LlmError> {
    if provider.requires_api_key() && !endpoint.has_api_key() {
        return Err(LlmError::auth(format!(
            "No API key for {}: set {}_api_key in the config file or {}",
            provider.display_name(),
            provider.config_key(),
            provider.api_key_env_vars().join(" / "),
        )));
    }

    let client = http_client()?;
    let service: Arc<dyn CompletionProvider> = match provider {
        Provider::OpenAi => Arc::new(OpenAIService::new(Flavor::OpenAi, endpoint, client)?),
        Provider::AzureOpenAi => Arc::new(OpenAIService::new(Flavor::Azure, endpoint, client)?),
        Provider::Llama => Arc::new(OpenAIService::new(Flavor::Llama, endpoint, client)?),
        Provider::Anthropic => Arc::new(AnthropicService::new(endpoint, client)),
        Provider::Google => Arc::new(GeminiService::new(endpoint, client)),
        Provider::Cohere => Arc::new(CohereService::new(endpoint, client)),
    };

    tracing::debug!(
        provider = %provider,
        base_url = ?endpoint.base_url,
        "Created completion provider"
    );
    Ok(Arc::new(LoggingProvider::new(service)))
}
