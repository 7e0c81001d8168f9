//! LLM provider abstraction
//!
//! Every vendor adapter turns the canonical conversation snapshot into its
//! own wire request and streams the reply back as canonical [`StreamEvent`]s.

mod anthropic;
mod cohere;
mod error;
mod gemini;
mod models;
mod openai;
mod registry;
mod sse;
mod types;

#[cfg(test)]
mod proptests;
#[cfg(test)]
pub mod testing;

pub use error::{LlmError, LlmErrorKind};
pub use models::{route_model, Provider};
pub use registry::{create_provider, Endpoint};
pub use types::*;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

/// Stream of canonical events for one completion call.
///
/// Ends right after the first `Done` or `Error`.
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Common interface for LLM providers
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Start a streamed completion over `messages`.
    ///
    /// Failures never escape as `Err`: they arrive as a terminal
    /// `StreamEvent::Error`. Dropping the stream releases the connection.
    async fn complete(&self, messages: &[Message], spec: &RequestSpec) -> EventStream;

    /// Vendor this adapter talks to
    fn provider(&self) -> Provider;
}

/// Logging wrapper for completion providers
pub struct LoggingProvider {
    inner: Arc<dyn CompletionProvider>,
}

impl LoggingProvider {
    pub fn new(inner: Arc<dyn CompletionProvider>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl CompletionProvider for LoggingProvider {
    async fn complete(&self, messages: &[Message], spec: &RequestSpec) -> EventStream {
        let start = Instant::now();
        let provider = self.inner.provider();
        let model = spec.model.clone();

        tracing::debug!(
            provider = %provider,
            model = %model,
            messages = messages.len(),
            thinking_budget = ?spec.thinking_budget,
            "Dispatching completion request"
        );

        let stream = self.inner.complete(messages, spec).await;
        let mut usage = Usage::default();

        Box::pin(stream.inspect(move |event| match event {
            StreamEvent::UsageFinal {
                input_tokens,
                output_tokens,
            } => {
                usage = Usage {
                    input_tokens: *input_tokens,
                    output_tokens: *output_tokens,
                };
            }
            StreamEvent::Done => {
                tracing::info!(
                    provider = %provider,
                    model = %model,
                    duration_ms = %start.elapsed().as_millis(),
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    "LLM request completed"
                );
            }
            StreamEvent::Error(e) => {
                tracing::error!(
                    provider = %provider,
                    model = %model,
                    duration_ms = %start.elapsed().as_millis(),
                    kind = %e.kind,
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "LLM request failed"
                );
            }
            StreamEvent::TextDelta(_) | StreamEvent::ThinkingDelta(_) => {}
        }))
    }

    fn provider(&self) -> Provider {
        self.inner.provider()
    }
}
