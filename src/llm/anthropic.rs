//! Anthropic Claude provider implementation

use super::sse::{self, ChunkDecoder};
use super::types::{split_system, Message, RequestSpec, StreamEvent};
use super::{CompletionProvider, Endpoint, EventStream, LlmError, LlmErrorKind, Provider};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic service implementation
pub struct AnthropicService {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicService {
    pub fn new(endpoint: &Endpoint, client: Client) -> Self {
        let base_url = endpoint
            .base_url
            .as_deref()
            .unwrap_or(ANTHROPIC_BASE_URL)
            .trim_end_matches('/');

        Self {
            client,
            api_key: endpoint.api_key.clone().unwrap_or_default(),
            base_url: format!("{base_url}/v1/messages"),
        }
    }
}

fn translate_request<'a>(messages: &'a [Message], spec: &'a RequestSpec) -> AnthropicRequest<'a> {
    let (system, rest) = split_system(messages);

    // max_tokens must leave room for the answer on top of the thinking budget
    let (max_tokens, thinking) = match spec.thinking_budget {
        Some(budget) => (
            budget.saturating_add(DEFAULT_MAX_TOKENS),
            Some(ThinkingConfig {
                r#type: "enabled",
                budget_tokens: budget,
            }),
        ),
        None => (DEFAULT_MAX_TOKENS, None),
    };

    AnthropicRequest {
        model: &spec.model,
        max_tokens,
        system,
        messages: rest
            .iter()
            .map(|m| AnthropicMessage {
                role: m.role.as_str(),
                content: &m.content,
            })
            .collect(),
        stream: true,
        temperature: spec.temperature,
        // Anthropic rejects temperature and top_p together; 1.0 is the default anyway
        top_p: spec.top_p.filter(|p| (p - 1.0).abs() > f32::EPSILON),
        thinking,
    }
}

#[async_trait]
impl CompletionProvider for AnthropicService {
    async fn complete(&self, messages: &[Message], spec: &RequestSpec) -> EventStream {
        let body = translate_request(messages, spec);
        let request = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);

        match sse::send(request).await {
            Ok(response) => sse::decode_sse(response.bytes_stream(), MessagesDecoder::default()),
            Err(e) => sse::error_stream(e),
        }
    }

    fn provider(&self) -> Provider {
        Provider::Anthropic
    }
}

/// Decoder for the Messages API event stream
#[derive(Debug, Default)]
pub(crate) struct MessagesDecoder {
    input_tokens: u64,
    output_tokens: u64,
}

impl ChunkDecoder for MessagesDecoder {
    fn decode(&mut self, _event: &str, data: &str) -> Vec<StreamEvent> {
        let event: AnthropicStreamEvent = match serde_json::from_str(data) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, data = %data, "Skipping unparseable event");
                return Vec::new();
            }
        };

        match event {
            AnthropicStreamEvent::MessageStart { message } => {
                let usage = message.usage;
                self.input_tokens = usage.input_tokens
                    + usage.cache_creation_input_tokens.unwrap_or(0)
                    + usage.cache_read_input_tokens.unwrap_or(0);
                self.output_tokens = usage.output_tokens;
                Vec::new()
            }
            AnthropicStreamEvent::ContentBlockDelta { delta } => match delta {
                BlockDelta::TextDelta { text } if !text.is_empty() => vec![StreamEvent::TextDelta(text)],
                BlockDelta::ThinkingDelta { thinking } if !thinking.is_empty() => {
                    vec![StreamEvent::ThinkingDelta(thinking)]
                }
                _ => Vec::new(),
            },
            AnthropicStreamEvent::MessageDelta { usage } => {
                // Counts here are cumulative
                if let Some(usage) = usage {
                    self.output_tokens = usage.output_tokens;
                    if let Some(input) = usage.input_tokens {
                        self.input_tokens = input;
                    }
                }
                Vec::new()
            }
            AnthropicStreamEvent::MessageStop => vec![
                StreamEvent::usage(self.input_tokens, self.output_tokens),
                StreamEvent::Done,
            ],
            AnthropicStreamEvent::Error { error } => vec![StreamEvent::Error(classify_stream_error(&error))],
            AnthropicStreamEvent::Other => Vec::new(),
        }
    }
}

fn classify_stream_error(error: &AnthropicError) -> LlmError {
    let kind = match error.error_type.as_str() {
        "authentication_error" | "permission_error" => LlmErrorKind::Auth,
        "rate_limit_error" => LlmErrorKind::RateLimited,
        "invalid_request_error" | "not_found_error" | "request_too_large" => LlmErrorKind::InvalidRequest,
        "overloaded_error" | "api_error" => LlmErrorKind::ServerError,
        _ => LlmErrorKind::Unknown,
    };
    LlmError::new(kind, format!("{}: {}", error.error_type, error.message))
}

// Anthropic API types

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<AnthropicMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<ThinkingConfig>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ThinkingConfig {
    r#type: &'static str,
    budget_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicStreamEvent {
    MessageStart {
        message: StartMessage,
    },
    ContentBlockDelta {
        delta: BlockDelta,
    },
    MessageDelta {
        #[serde(default)]
        usage: Option<DeltaUsage>,
    },
    MessageStop,
    Error {
        error: AnthropicError,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct StartMessage {
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    cache_creation_input_tokens: Option<u64>,
    cache_read_input_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct DeltaUsage {
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    input_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta {
        text: String,
    },
    ThinkingDelta {
        thinking: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::sse::test_support::{run, text_of, thinking_of};

    fn sonnet() -> RequestSpec {
        RequestSpec::new(Provider::Anthropic, "claude-sonnet-4-0")
    }

    #[test]
    fn test_system_prompt_is_top_level() {
        let messages = vec![
            Message::system("You are a pirate"),
            Message::user("Hello"),
            Message::assistant("Ahoy"),
            Message::user("Again"),
        ];
        let spec = sonnet();
        let body = serde_json::to_value(translate_request(&messages, &spec)).unwrap();

        assert_eq!(body["system"], "You are a pirate");
        assert_eq!(body["messages"].as_array().unwrap().len(), 3);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["max_tokens"], 4096);
        assert!(body.get("thinking").is_none());
    }

    #[test]
    fn test_thinking_budget_raises_max_tokens() {
        let messages = vec![Message::user("Prove it")];
        let spec = RequestSpec {
            thinking_budget: Some(2048),
            ..sonnet()
        }
        .enforce_thinking();
        let body = serde_json::to_value(translate_request(&messages, &spec)).unwrap();

        assert_eq!(body["thinking"]["type"], "enabled");
        assert_eq!(body["thinking"]["budget_tokens"], 2048);
        assert_eq!(body["max_tokens"], 2048 + 4096);
        assert_eq!(body["temperature"], 1.0);
        assert!(body.get("top_p").is_none());
    }

    #[test]
    fn test_default_top_p_is_omitted() {
        let messages = vec![Message::user("hi")];
        let spec = RequestSpec {
            temperature: Some(0.7),
            top_p: Some(1.0),
            ..sonnet()
        };
        let body = serde_json::to_value(translate_request(&messages, &spec)).unwrap();
        assert!(body.get("top_p").is_none());

        let narrowed = RequestSpec {
            top_p: Some(0.5),
            ..spec
        };
        let body = serde_json::to_value(translate_request(&messages, &narrowed)).unwrap();
        assert_eq!(body["top_p"], 0.5);
    }

    #[tokio::test]
    async fn test_stream_with_thinking_and_usage() {
        let events = run(
            &[
                "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"usage\":{\"input_tokens\":25,\"output_tokens\":1}}}\n\n",
                "event: content_block_start\ndata: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"thinking\",\"thinking\":\"\"}}\n\n",
                "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"thinking_delta\",\"thinking\":\"Let me see\"}}\n\n",
                "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"signature_delta\",\"signature\":\"abc\"}}\n\n",
                "event: ping\ndata: {\"type\":\"ping\"}\n\n",
                "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"text_delta\",\"text\":\"Ahoy\"}}\n\n",
                "event: message_delta\ndata: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":15}}\n\n",
                "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
            ],
            MessagesDecoder::default(),
        )
        .await;

        assert_eq!(thinking_of(&events), "Let me see");
        assert_eq!(text_of(&events), "Ahoy");
        let n = events.len();
        assert!(matches!(
            events[n - 2],
            StreamEvent::UsageFinal {
                input_tokens: 25,
                output_tokens: 15
            }
        ));
        assert!(matches!(events[n - 1], StreamEvent::Done));
    }

    #[tokio::test]
    async fn test_overloaded_error_is_server_error() {
        let events = run(
            &["event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n"],
            MessagesDecoder::default(),
        )
        .await;
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            StreamEvent::Error(e) if e.kind == LlmErrorKind::ServerError
        ));
    }

    #[test]
    fn test_error_type_classification() {
        let err = |t: &str| {
            classify_stream_error(&AnthropicError {
                error_type: t.to_string(),
                message: "m".to_string(),
            })
            .kind
        };
        assert_eq!(err("rate_limit_error"), LlmErrorKind::RateLimited);
        assert_eq!(err("authentication_error"), LlmErrorKind::Auth);
        assert_eq!(err("invalid_request_error"), LlmErrorKind::InvalidRequest);
        assert_eq!(err("api_error"), LlmErrorKind::ServerError);
        assert_eq!(err("mystery"), LlmErrorKind::Unknown);
    }
}
