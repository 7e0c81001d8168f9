//! Server-sent event plumbing shared by the vendor adapters
//!
//! Each adapter supplies a [`ChunkDecoder`] that turns one SSE payload into
//! canonical events; [`decode_sse`] drives it over the response body and
//! guarantees that the resulting stream ends with exactly one terminal event.

use super::{EventStream, LlmError, StreamEvent};
use eventsource_stream::{Event as SseEvent, EventStreamError, Eventsource};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// Per-vendor translation of SSE payloads into canonical events
pub(crate) trait ChunkDecoder: Send + 'static {
    /// Translate one server-sent event. `event` is the SSE event name,
    /// `"message"` when the server sent none.
    fn decode(&mut self, event: &str, data: &str) -> Vec<StreamEvent>;

    /// Called once the server closes the body.
    ///
    /// Vendors that signal completion only by closing the connection emit
    /// their `Done` here.
    fn finish(&mut self) -> Vec<StreamEvent> {
        Vec::new()
    }
}

/// Send a request and classify any non-success status
pub(crate) async fn send(request: reqwest::RequestBuilder) -> Result<reqwest::Response, LlmError> {
    let response = request
        .header("accept", "text/event-stream")
        .send()
        .await
        .map_err(|e| LlmError::from_reqwest(&e))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);

    let body = response
        .text()
        .await
        .map_err(|e| LlmError::transport(format!("Failed to read error response: {e}")))?;

    let mut err = LlmError::from_status(status.as_u16(), &error_detail(&body));
    if let Some(delay) = retry_after {
        err = err.with_retry_after(delay);
    }
    Err(err)
}

/// Seconds form of `Retry-After`; the HTTP-date form is ignored
fn parse_retry_after(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

/// Pull the human-readable message out of a vendor error body.
///
/// Handles `{"error": {"message"}}` (`OpenAI`, Anthropic, Gemini),
/// `[{"error": ...}]` (Gemini) and `{"message"}` (Cohere). Falls back to the
/// raw body.
pub(crate) fn error_detail(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.trim().to_string();
    };
    let value = match &value {
        serde_json::Value::Array(items) => items.first().unwrap_or(&value),
        _ => &value,
    };
    value
        .get("error")
        .and_then(|e| e.get("message").or(Some(e)))
        .or_else(|| value.get("message"))
        .and_then(serde_json::Value::as_str)
        .map_or_else(|| body.trim().to_string(), str::to_string)
}

/// Single-event stream for failures that happen before the body is read
pub(crate) fn error_stream(error: LlmError) -> EventStream {
    Box::pin(stream::iter([StreamEvent::Error(error)]))
}

struct Decoding<E, D> {
    source: BoxStream<'static, Result<SseEvent, EventStreamError<E>>>,
    decoder: D,
    pending: VecDeque<StreamEvent>,
    finished: bool,
}

/// Decode an SSE body into canonical events.
///
/// The stream stops after the first `Done` or `Error`. A body that closes
/// without either yields a transport error, so a truncated response is
/// never mistaken for a complete one.
pub(crate) fn decode_sse<S, B, E, D>(body: S, decoder: D) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
    D: ChunkDecoder,
{
    let state = Decoding {
        source: body.eventsource().boxed(),
        decoder,
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                if event.is_terminal() {
                    state.finished = true;
                    state.pending.clear();
                }
                return Some((event, state));
            }
            if state.finished {
                return None;
            }

            match state.source.next().await {
                Some(Ok(sse)) => {
                    tracing::trace!(event = %sse.event, data = %sse.data, "SSE event");
                    let events = state.decoder.decode(&sse.event, &sse.data);
                    state.pending.extend(events);
                }
                Some(Err(e)) => {
                    state
                        .pending
                        .push_back(StreamEvent::Error(LlmError::transport(format!("Stream error: {e}"))));
                }
                None => {
                    let mut tail = state.decoder.finish();
                    if !tail.iter().any(StreamEvent::is_terminal) {
                        tail.push(StreamEvent::Error(LlmError::transport(
                            "Stream closed before the response completed",
                        )));
                    }
                    state.pending.extend(tail);
                }
            }
        }
    }))
}
