//! Common types for LLM interactions

use super::{LlmError, Provider};
use serde::{Deserialize, Serialize};

/// Temperature every vendor requires while extended thinking is enabled
pub const THINKING_TEMPERATURE: f32 = 1.0;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// Message in conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    /// Reasoning text the model produced before its answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            thinking: None,
        }
    }

    #[must_use]
    pub fn with_thinking(mut self, thinking: Option<String>) -> Self {
        self.thinking = thinking;
        self
    }
}

/// Split a snapshot into the leading system prompt and the remaining turns.
///
/// Every vendor except the OpenAI family carries the system prompt outside
/// the message list.
pub fn split_system(messages: &[Message]) -> (Option<&str>, &[Message]) {
    match messages.split_first() {
        Some((first, rest)) if first.role == MessageRole::System => {
            (Some(first.content.as_str()), rest)
        }
        _ => (None, messages),
    }
}

/// Fully resolved parameters for one completion call
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub provider: Provider,
    pub model: String,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub thinking_budget: Option<u32>,
}

impl RequestSpec {
    #[cfg(test)]
    pub fn new(provider: Provider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: None,
            top_p: None,
            thinking_budget: None,
        }
    }

    /// Apply the extended-thinking sampling constraint.
    ///
    /// With a thinking budget the temperature is pinned and `top_p` dropped,
    /// whatever the caller asked for.
    #[must_use]
    pub fn enforce_thinking(mut self) -> Self {
        if self.thinking_budget.is_some() {
            self.temperature = Some(THINKING_TEMPERATURE);
            self.top_p = None;
        }
        self
    }

    /// Check the parameters before anything is sent over the network
    pub fn validate(&self) -> Result<(), LlmError> {
        if self.model.trim().is_empty() {
            return Err(LlmError::invalid_request("Model name is empty"));
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(LlmError::invalid_request(format!(
                    "Temperature {t} is outside the range 0.0..=2.0"
                )));
            }
        }
        if let Some(p) = self.top_p {
            if !(p > 0.0 && p <= 1.0) {
                return Err(LlmError::invalid_request(format!(
                    "top_p {p} is outside the range (0.0, 1.0]"
                )));
            }
        }
        if let Some(budget) = self.thinking_budget {
            if !self.provider.supports_thinking(&self.model) {
                return Err(LlmError::invalid_request(format!(
                    "Model {} ({}) does not support extended thinking",
                    self.model,
                    self.provider.as_str()
                )));
            }
            let minimum = self.provider.min_thinking_budget();
            if budget < minimum {
                return Err(LlmError::invalid_request(format!(
                    "Thinking budget {budget} is below the minimum of {minimum} tokens"
                )));
            }
        }
        Ok(())
    }
}

/// Canonical unit of streamed output
#[derive(Debug, Clone)]
pub enum StreamEvent {
    TextDelta(String),
    ThinkingDelta(String),
    UsageFinal { input_tokens: u64, output_tokens: u64 },
    Error(LlmError),
    Done,
}

impl StreamEvent {
    #[cfg(test)]
    pub fn text(s: impl Into<String>) -> Self {
        StreamEvent::TextDelta(s.into())
    }

    #[cfg(test)]
    pub fn thinking(s: impl Into<String>) -> Self {
        StreamEvent::ThinkingDelta(s.into())
    }

    pub fn usage(input_tokens: u64, output_tokens: u64) -> Self {
        StreamEvent::UsageFinal {
            input_tokens,
            output_tokens,
        }
    }

    /// `Done` and `Error` end a stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done | StreamEvent::Error(_))
    }
}

/// Token counts reported by a vendor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    #[cfg(test)]
    pub fn is_zero(&self) -> bool {
        self.input_tokens == 0 && self.output_tokens == 0
    }
}
