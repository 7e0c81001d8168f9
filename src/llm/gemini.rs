//! Google Gemini provider implementation

use super::sse::{self, ChunkDecoder};
use super::types::{split_system, Message, MessageRole, RequestSpec, StreamEvent, Usage};
use super::{CompletionProvider, Endpoint, EventStream, LlmError, LlmErrorKind, Provider};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Finish reasons that mean the answer is complete
const NORMAL_FINISH: &[&str] = &["STOP", "MAX_TOKENS", "FINISH_REASON_UNSPECIFIED"];

/// Gemini service implementation
pub struct GeminiService {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiService {
    pub fn new(endpoint: &Endpoint, client: Client) -> Self {
        Self {
            client,
            api_key: endpoint.api_key.clone().unwrap_or_default(),
            base_url: endpoint
                .base_url
                .as_deref()
                .unwrap_or(GEMINI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
        }
    }

    fn url(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, model
        )
    }
}

fn translate_request<'a>(messages: &'a [Message], spec: &RequestSpec) -> GeminiRequest<'a> {
    let (system, rest) = split_system(messages);

    GeminiRequest {
        contents: rest
            .iter()
            .map(|m| GeminiContent {
                role: match m.role {
                    MessageRole::Assistant => "model",
                    MessageRole::User | MessageRole::System => "user",
                },
                parts: vec![TextPart { text: &m.content }],
            })
            .collect(),
        system_instruction: system.map(|text| GeminiSystem {
            parts: vec![TextPart { text }],
        }),
        generation_config: GenerationConfig {
            temperature: spec.temperature,
            top_p: spec.top_p,
            thinking_config: spec.thinking_budget.map(|budget| ThinkingConfig {
                thinking_budget: budget,
                include_thoughts: true,
            }),
        },
    }
}

#[async_trait]
impl CompletionProvider for GeminiService {
    async fn complete(&self, messages: &[Message], spec: &RequestSpec) -> EventStream {
        let body = translate_request(messages, spec);
        let request = self
            .client
            .post(self.url(&spec.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body);

        match sse::send(request).await {
            Ok(response) => sse::decode_sse(response.bytes_stream(), GenerateDecoder::default()),
            Err(e) => sse::error_stream(e),
        }
    }

    fn provider(&self) -> Provider {
        Provider::Google
    }
}

/// Decoder for `streamGenerateContent` chunks.
///
/// Gemini has no end-of-stream event: the response is complete when a
/// candidate carries a finish reason and the server closes the body.
#[derive(Debug, Default)]
pub(crate) struct GenerateDecoder {
    usage: Usage,
    finished: bool,
}

impl ChunkDecoder for GenerateDecoder {
    fn decode(&mut self, _event: &str, data: &str) -> Vec<StreamEvent> {
        let chunk: GenerateChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(error = %e, data = %data, "Skipping unparseable chunk");
                return Vec::new();
            }
        };

        if let Some(error) = chunk.error {
            return vec![StreamEvent::Error(LlmError::from_status(error.code, &error.message))];
        }
        if let Some(reason) = chunk.prompt_feedback.and_then(|f| f.block_reason) {
            return vec![StreamEvent::Error(LlmError::invalid_request(format!(
                "Prompt blocked: {reason}"
            )))];
        }

        if let Some(usage) = chunk.usage_metadata {
            // Thinking tokens are billed as output
            self.usage = Usage {
                input_tokens: usage.prompt_token_count,
                output_tokens: usage.candidates_token_count + usage.thoughts_token_count,
            };
        }

        let mut events = Vec::new();
        let Some(candidate) = chunk.candidates.into_iter().next() else {
            return events;
        };
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            match part.text {
                Some(text) if text.is_empty() => {}
                Some(text) if part.thought => events.push(StreamEvent::ThinkingDelta(text)),
                Some(text) => events.push(StreamEvent::TextDelta(text)),
                None => {}
            }
        }
        if let Some(reason) = candidate.finish_reason {
            if NORMAL_FINISH.contains(&reason.as_str()) {
                self.finished = true;
            } else {
                events.push(StreamEvent::Error(LlmError::new(
                    LlmErrorKind::InvalidRequest,
                    format!("Response stopped: {reason}"),
                )));
            }
        }
        events
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        if self.finished {
            vec![
                StreamEvent::usage(self.usage.input_tokens, self.usage.output_tokens),
                StreamEvent::Done,
            ]
        } else {
            Vec::new()
        }
    }
}

// Gemini API types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystem<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiSystem<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
    include_thoughts: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    thoughts_token_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    #[serde(default)]
    code: u16,
    message: String,
}
