//! `OpenAI` and `OpenAI`-compatible provider implementation
//!
//! One chat-completions adapter serves three endpoints: `OpenAI` itself,
//! Azure `OpenAI` deployments and local llama.cpp-style servers.

use super::sse::{self, ChunkDecoder};
use super::types::{Message, RequestSpec, StreamEvent, Usage};
use super::{CompletionProvider, Endpoint, EventStream, LlmError, LlmErrorKind, Provider};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const LLAMA_BASE_URL: &str = "http://localhost:8080/v1";
const AZURE_API_VERSION: &str = "2024-10-21";

/// Which `OpenAI`-protocol endpoint the adapter talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    OpenAi,
    /// Deployment-scoped URLs, `api-key` header and an `api-version` query
    Azure,
    /// Local server; the credential is optional
    Llama,
}

impl Flavor {
    fn provider(self) -> Provider {
        match self {
            Flavor::OpenAi => Provider::OpenAi,
            Flavor::Azure => Provider::AzureOpenAi,
            Flavor::Llama => Provider::Llama,
        }
    }
}

/// Reasoning models reject sampling parameters
pub fn is_reasoning_model(model: &str) -> bool {
    ["o1", "o3", "o4", "gpt-5"]
        .iter()
        .any(|prefix| model.starts_with(prefix))
}

/// OpenAI-compatible service implementation
pub struct OpenAIService {
    client: Client,
    api_key: Option<String>,
    flavor: Flavor,
    base_url: String,
    api_version: String,
}

impl OpenAIService {
    pub fn new(flavor: Flavor, endpoint: &Endpoint, client: Client) -> Result<Self, LlmError> {
        let base_url = match (flavor, endpoint.base_url.as_deref()) {
            (_, Some(url)) => url.trim_end_matches('/').to_string(),
            (Flavor::OpenAi, None) => OPENAI_BASE_URL.to_string(),
            (Flavor::Llama, None) => LLAMA_BASE_URL.to_string(),
            (Flavor::Azure, None) => {
                return Err(LlmError::invalid_request(
                    "Azure OpenAI needs an endpoint: set azure_openai_base_url or AZURE_OPENAI_ENDPOINT",
                ))
            }
        };

        Ok(Self {
            client,
            api_key: endpoint.api_key.clone(),
            flavor,
            base_url,
            api_version: endpoint
                .api_version
                .clone()
                .unwrap_or_else(|| AZURE_API_VERSION.to_string()),
        })
    }

    fn url(&self, model: &str) -> String {
        match self.flavor {
            Flavor::Azure => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                self.base_url, model, self.api_version
            ),
            Flavor::OpenAi | Flavor::Llama => format!("{}/chat/completions", self.base_url),
        }
    }
}

fn translate_request<'a>(messages: &'a [Message], spec: &'a RequestSpec) -> OpenAIRequest<'a> {
    let sampling = !is_reasoning_model(&spec.model);
    OpenAIRequest {
        model: &spec.model,
        messages: messages
            .iter()
            .map(|m| OpenAIMessage {
                role: m.role.as_str(),
                content: &m.content,
            })
            .collect(),
        stream: true,
        stream_options: StreamOptions {
            include_usage: true,
        },
        temperature: spec.temperature.filter(|_| sampling),
        top_p: spec.top_p.filter(|_| sampling),
    }
}

#[async_trait]
impl CompletionProvider for OpenAIService {
    async fn complete(&self, messages: &[Message], spec: &RequestSpec) -> EventStream {
        let body = translate_request(messages, spec);
        let mut request = self.client.post(self.url(&spec.model)).json(&body);
        if let Some(key) = &self.api_key {
            request = match self.flavor {
                Flavor::Azure => request.header("api-key", key),
                Flavor::OpenAi | Flavor::Llama => request.bearer_auth(key),
            };
        }

        match sse::send(request).await {
            Ok(response) => sse::decode_sse(response.bytes_stream(), ChatDecoder::default()),
            Err(e) => sse::error_stream(e),
        }
    }

    fn provider(&self) -> Provider {
        self.flavor.provider()
    }
}

/// Decoder for chat-completion chunks
#[derive(Debug, Default)]
pub(crate) struct ChatDecoder {
    usage: Option<Usage>,
    finish_reason: Option<String>,
}

impl ChatDecoder {
    fn complete(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::with_capacity(2);
        if let Some(usage) = self.usage.take() {
            events.push(StreamEvent::usage(usage.input_tokens, usage.output_tokens));
        }
        events.push(StreamEvent::Done);
        events
    }
}

impl ChunkDecoder for ChatDecoder {
    fn decode(&mut self, _event: &str, data: &str) -> Vec<StreamEvent> {
        let data = data.trim();
        if data == "[DONE]" {
            return self.complete();
        }

        let chunk: ChatChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(error = %e, data = %data, "Skipping unparseable chunk");
                return Vec::new();
            }
        };

        if let Some(error) = chunk.error {
            return vec![StreamEvent::Error(error.into_llm_error())];
        }

        let mut events = Vec::new();
        for choice in chunk.choices.into_iter().filter(|c| c.index == 0) {
            if let Some(reasoning) = choice.delta.reasoning_content.filter(|r| !r.is_empty()) {
                events.push(StreamEvent::ThinkingDelta(reasoning));
            }
            if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                events.push(StreamEvent::TextDelta(content));
            }
            if choice.finish_reason.is_some() {
                self.finish_reason = choice.finish_reason;
            }
        }
        if let Some(usage) = chunk.usage {
            self.usage = Some(Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            });
        }
        events
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        // Some compatible servers close without the [DONE] sentinel
        if self.finish_reason.is_some() {
            self.complete()
        } else {
            Vec::new()
        }
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    stream: bool,
    stream_options: StreamOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<ChunkUsage>,
    #[serde(default)]
    error: Option<OpenAIError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default, alias = "reasoning")]
    reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
    #[serde(default, rename = "type")]
    error_type: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

impl OpenAIError {
    fn into_llm_error(self) -> LlmError {
        let code = self
            .code
            .as_ref()
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        let tag = self.error_type.as_deref().unwrap_or(code);
        let kind = if tag.contains("rate_limit") || code.contains("rate_limit") {
            LlmErrorKind::RateLimited
        } else if tag.contains("auth") || code == "invalid_api_key" {
            LlmErrorKind::Auth
        } else if tag == "invalid_request_error" {
            LlmErrorKind::InvalidRequest
        } else {
            LlmErrorKind::ServerError
        };
        LlmError::new(kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::sse::test_support::{run, text_of, thinking_of};

    fn spec(model: &str) -> RequestSpec {
        RequestSpec {
            temperature: Some(0.7),
            top_p: Some(0.9),
            ..RequestSpec::new(Provider::OpenAi, model)
        }
    }

    #[test]
    fn test_translate_request_keeps_system_inline() {
        let messages = vec![Message::system("be brief"), Message::user("hi")];
        let spec = spec("gpt-4o");
        let body = serde_json::to_value(translate_request(&messages, &spec)).unwrap();

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert!((body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_reasoning_models_drop_sampling() {
        let messages = vec![Message::user("hi")];
        for model in ["o1-mini", "o3", "o4-mini", "gpt-5-mini"] {
            let spec = spec(model);
            let body = serde_json::to_value(translate_request(&messages, &spec)).unwrap();
            assert!(body.get("temperature").is_none(), "{model}");
            assert!(body.get("top_p").is_none(), "{model}");
        }
    }

    #[test]
    fn test_azure_url_uses_deployment_and_version() {
        let endpoint = Endpoint {
            base_url: Some("https://acme.openai.azure.com/".to_string()),
            api_key: Some("k".to_string()),
            api_version: None,
        };
        let service = OpenAIService::new(Flavor::Azure, &endpoint, Client::new()).unwrap();
        assert_eq!(
            service.url("prod-gpt4o"),
            "https://acme.openai.azure.com/openai/deployments/prod-gpt4o/chat/completions?api-version=2024-10-21"
        );
    }

    #[test]
    fn test_azure_requires_endpoint() {
        let endpoint = Endpoint::default();
        let err = OpenAIService::new(Flavor::Azure, &endpoint, Client::new())
            .err()
            .unwrap();
        assert_eq!(err.kind, LlmErrorKind::InvalidRequest);
    }

    #[test]
    fn test_llama_default_base_url() {
        let service = OpenAIService::new(Flavor::Llama, &Endpoint::default(), Client::new()).unwrap();
        assert_eq!(service.url("llama-3"), "http://localhost:8080/v1/chat/completions");
        assert_eq!(service.provider(), Provider::Llama);
    }

    #[tokio::test]
    async fn test_stream_with_usage_then_done() {
        let events = run(
            &[
                "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
                "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Ahoy\"}}]}\n\n",
                "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\", matey\"},\"finish_reason\":\"stop\"}]}\n\n",
                "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":12,\"completion_tokens\":3,\"total_tokens\":15}}\n\n",
                "data: [DONE]\n\n",
            ],
            ChatDecoder::default(),
        )
        .await;

        assert_eq!(text_of(&events), "Ahoy, matey");
        let n = events.len();
        assert!(matches!(
            events[n - 2],
            StreamEvent::UsageFinal {
                input_tokens: 12,
                output_tokens: 3
            }
        ));
        assert!(matches!(events[n - 1], StreamEvent::Done));
    }

    #[tokio::test]
    async fn test_reasoning_content_becomes_thinking() {
        let events = run(
            &[
                "data: {\"choices\":[{\"index\":0,\"delta\":{\"reasoning_content\":\"hmm\"}}]}\n\n",
                "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"42\"}}]}\n\n",
                "data: [DONE]\n\n",
            ],
            ChatDecoder::default(),
        )
        .await;
        assert_eq!(thinking_of(&events), "hmm");
        assert_eq!(text_of(&events), "42");
    }

    #[tokio::test]
    async fn test_mid_stream_error() {
        let events = run(
            &[
                "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"par\"}}]}\n\n",
                "data: {\"error\":{\"message\":\"Rate limit reached\",\"type\":\"requests\",\"code\":\"rate_limit_exceeded\"}}\n\n",
            ],
            ChatDecoder::default(),
        )
        .await;
        match events.last().unwrap() {
            StreamEvent::Error(e) => assert_eq!(e.kind, LlmErrorKind::RateLimited),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_close_after_finish_reason_without_sentinel() {
        let events = run(
            &["data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"ok\"},\"finish_reason\":\"stop\"}]}\n\n"],
            ChatDecoder::default(),
        )
        .await;
        assert!(matches!(events.last(), Some(StreamEvent::Done)));
    }

    #[tokio::test]
    async fn test_close_without_finish_is_transport_error() {
        let events = run(
            &["data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"cut\"}}]}\n\n"],
            ChatDecoder::default(),
        )
        .await;
        assert!(matches!(
            events.last(),
            Some(StreamEvent::Error(e)) if e.kind == LlmErrorKind::Transport
        ));
    }
}
