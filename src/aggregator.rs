//! Folds a canonical event stream into one finished assistant turn
//!
//! Deltas are forwarded to the caller as they arrive so they can be
//! rendered progressively; the accumulated text is only handed back once
//! the stream reaches `Done`.

use crate::llm::{EventStream, LlmError, StreamEvent, Usage};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

/// A fragment of streamed output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delta<'a> {
    Text(&'a str),
    Thinking(&'a str),
}

/// Everything a completed stream produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub thinking: Option<String>,
    /// Zero when the vendor reported no usage
    pub usage: Usage,
}

/// Outcome of folding one stream
#[derive(Debug, Clone)]
pub enum Aggregated {
    Completed(Completion),
    /// The stream failed; `partial` is what had arrived and is not committed
    Failed { error: LlmError, partial: Completion },
    Cancelled,
}

/// Pure accumulator, fed one event at a time
#[derive(Debug, Default)]
pub struct Aggregator {
    partial: Completion,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one event, forwarding deltas to `on_delta`.
    ///
    /// Returns the outcome on the terminal event.
    pub fn push<F>(&mut self, event: StreamEvent, on_delta: &mut F) -> Option<Aggregated>
    where
        F: FnMut(Delta<'_>),
    {
        match event {
            StreamEvent::TextDelta(text) => {
                on_delta(Delta::Text(&text));
                self.partial.text.push_str(&text);
                None
            }
            StreamEvent::ThinkingDelta(thinking) => {
                on_delta(Delta::Thinking(&thinking));
                self.partial
                    .thinking
                    .get_or_insert_with(String::new)
                    .push_str(&thinking);
                None
            }
            StreamEvent::UsageFinal {
                input_tokens,
                output_tokens,
            } => {
                self.partial.usage = Usage {
                    input_tokens,
                    output_tokens,
                };
                None
            }
            StreamEvent::Error(error) => Some(Aggregated::Failed {
                error,
                partial: std::mem::take(&mut self.partial),
            }),
            StreamEvent::Done => Some(Aggregated::Completed(std::mem::take(&mut self.partial))),
        }
    }

    /// What has arrived so far
    pub fn into_partial(self) -> Completion {
        self.partial
    }
}

/// Fold a recorded event sequence without cancellation
#[cfg(test)]
pub fn replay<I, F>(events: I, mut on_delta: F) -> Aggregated
where
    I: IntoIterator<Item = StreamEvent>,
    F: FnMut(Delta<'_>),
{
    let mut aggregator = Aggregator::new();
    for event in events {
        if let Some(outcome) = aggregator.push(event, &mut on_delta) {
            return outcome;
        }
    }
    truncated(aggregator)
}

/// Drive `events` to completion, stopping early when `cancel` fires.
///
/// Cancellation drops the stream, which closes the vendor connection.
pub async fn aggregate<F>(mut events: EventStream, cancel: &CancellationToken, mut on_delta: F) -> Aggregated
where
    F: FnMut(Delta<'_>),
{
    let mut aggregator = Aggregator::new();
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!(received = aggregator.partial.text.len(), "Stream cancelled");
                return Aggregated::Cancelled;
            }
            next = events.next() => next,
        };

        match next {
            Some(event) => {
                if let Some(outcome) = aggregator.push(event, &mut on_delta) {
                    return outcome;
                }
            }
            None => return truncated(aggregator),
        }
    }
}

fn truncated(aggregator: Aggregator) -> Aggregated {
    Aggregated::Failed {
        error: LlmError::transport("Stream ended without completing"),
        partial: aggregator.into_partial(),
    }
}
