//! Cohere chat (v2) provider implementation

use super::sse::{self, ChunkDecoder};
use super::types::{Message, RequestSpec, StreamEvent};
use super::{CompletionProvider, Endpoint, EventStream, LlmError, Provider};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const COHERE_BASE_URL: &str = "https://api.cohere.com";

/// Cohere service implementation
pub struct CohereService {
    client: Client,
    api_key: String,
    base_url: String,
}

impl CohereService {
    pub fn new(endpoint: &Endpoint, client: Client) -> Self {
        let base_url = endpoint
            .base_url
            .as_deref()
            .unwrap_or(COHERE_BASE_URL)
            .trim_end_matches('/');

        Self {
            client,
            api_key: endpoint.api_key.clone().unwrap_or_default(),
            base_url: format!("{base_url}/v2/chat"),
        }
    }
}

fn translate_request<'a>(messages: &'a [Message], spec: &'a RequestSpec) -> CohereRequest<'a> {
    CohereRequest {
        model: &spec.model,
        messages: messages
            .iter()
            .map(|m| CohereMessage {
                role: m.role.as_str(),
                content: &m.content,
            })
            .collect(),
        stream: true,
        temperature: spec.temperature,
        p: spec.top_p,
        thinking: spec.thinking_budget.map(|budget| ThinkingConfig {
            r#type: "enabled",
            token_budget: budget,
        }),
    }
}

#[async_trait]
impl CompletionProvider for CohereService {
    async fn complete(&self, messages: &[Message], spec: &RequestSpec) -> EventStream {
        let body = translate_request(messages, spec);
        let request = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&body);

        match sse::send(request).await {
            Ok(response) => sse::decode_sse(response.bytes_stream(), ChatStreamDecoder),
            Err(e) => sse::error_stream(e),
        }
    }

    fn provider(&self) -> Provider {
        Provider::Cohere
    }
}

/// Decoder for v2 chat stream events, dispatched on the payload's `type`
#[derive(Debug, Default)]
pub(crate) struct ChatStreamDecoder;

impl ChunkDecoder for ChatStreamDecoder {
    fn decode(&mut self, _event: &str, data: &str) -> Vec<StreamEvent> {
        let event: CohereStreamEvent = match serde_json::from_str(data) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, data = %data, "Skipping unparseable event");
                return Vec::new();
            }
        };

        match event {
            CohereStreamEvent::ContentDelta { delta } => {
                let content = delta.message.content;
                let mut events = Vec::new();
                if let Some(thinking) = content.thinking.filter(|t| !t.is_empty()) {
                    events.push(StreamEvent::ThinkingDelta(thinking));
                }
                if let Some(text) = content.text.filter(|t| !t.is_empty()) {
                    events.push(StreamEvent::TextDelta(text));
                }
                events
            }
            CohereStreamEvent::MessageEnd { delta } => {
                if delta.finish_reason.as_deref() == Some("ERROR") {
                    let detail = delta.error.unwrap_or_else(|| "generation failed".to_string());
                    return vec![StreamEvent::Error(LlmError::server_error(detail))];
                }
                let (input_tokens, output_tokens) = delta.usage.map_or((0, 0), CohereUsage::counts);
                vec![StreamEvent::usage(input_tokens, output_tokens), StreamEvent::Done]
            }
            CohereStreamEvent::Other => Vec::new(),
        }
    }
}

// Cohere API types

#[derive(Debug, Serialize)]
struct CohereRequest<'a> {
    model: &'a str,
    messages: Vec<CohereMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<ThinkingConfig>,
}

#[derive(Debug, Serialize)]
struct CohereMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ThinkingConfig {
    r#type: &'static str,
    token_budget: u32,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum CohereStreamEvent {
    ContentDelta {
        delta: ContentDelta,
    },
    MessageEnd {
        delta: MessageEndDelta,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ContentDelta {
    message: DeltaMessage,
}

#[derive(Debug, Deserialize)]
struct DeltaMessage {
    content: DeltaContent,
}

#[derive(Debug, Deserialize)]
struct DeltaContent {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thinking: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageEndDelta {
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    usage: Option<CohereUsage>,
}

#[derive(Debug, Deserialize)]
struct CohereUsage {
    #[serde(default)]
    billed_units: Option<TokenCounts>,
    #[serde(default)]
    tokens: Option<TokenCounts>,
}

impl CohereUsage {
    /// Billed units when present, raw token counts otherwise
    fn counts(self) -> (u64, u64) {
        self.billed_units
            .or(self.tokens)
            .map_or((0, 0), |t| (whole(t.input_tokens), whole(t.output_tokens)))
    }
}

/// Cohere reports token counts as JSON numbers that may carry a fraction
#[derive(Debug, Deserialize)]
struct TokenCounts {
    #[serde(default)]
    input_tokens: f64,
    #[serde(default)]
    output_tokens: f64,
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole(count: f64) -> u64 {
    count.max(0.0).round() as u64
}
