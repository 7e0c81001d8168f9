//! Mock providers for testing
//!
//! Scripted event sequences stand in for vendor streams so the engine can
//! be exercised without network I/O.

use super::{CompletionProvider, EventStream, LlmError, Message, Provider, RequestSpec, StreamEvent};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::Mutex;

enum Script {
    /// Emitted in order, then the stream ends
    Events(Vec<StreamEvent>),
    /// Emitted in order, then the stream never yields again
    Stall(Vec<StreamEvent>),
}

/// Provider that replays queued event scripts, one per request
pub struct ScriptedProvider {
    provider: Provider,
    scripts: Mutex<VecDeque<Script>>,
    /// Record of every request made
    pub requests: Mutex<Vec<(Vec<Message>, RequestSpec)>>,
}

impl ScriptedProvider {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            scripts: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a raw event sequence
    pub fn queue_events(&self, events: Vec<StreamEvent>) {
        self.scripts.lock().unwrap().push_back(Script::Events(events));
    }

    /// Queue a well-formed reply streamed in the given pieces
    pub fn queue_reply(&self, pieces: &[&str], input_tokens: u64, output_tokens: u64) {
        let mut events: Vec<StreamEvent> = pieces.iter().map(|p| StreamEvent::text(*p)).collect();
        events.push(StreamEvent::usage(input_tokens, output_tokens));
        events.push(StreamEvent::Done);
        self.queue_events(events);
    }

    /// Queue a stream that fails with `error` after the given pieces
    pub fn queue_failure(&self, pieces: &[&str], error: LlmError) {
        let mut events: Vec<StreamEvent> = pieces.iter().map(|p| StreamEvent::text(*p)).collect();
        events.push(StreamEvent::Error(error));
        self.queue_events(events);
    }

    /// Queue a stream that emits `pieces` and then hangs
    pub fn queue_stall(&self, pieces: &[&str]) {
        let events = pieces.iter().map(|p| StreamEvent::text(*p)).collect();
        self.scripts.lock().unwrap().push_back(Script::Stall(events));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<(Vec<Message>, RequestSpec)> {
        self.requests.lock().unwrap().clone()
    }

    /// Messages sent with the most recent request
    pub fn last_messages(&self) -> Vec<Message> {
        self.requests
            .lock()
            .unwrap()
            .last()
            .map(|(messages, _)| messages.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, messages: &[Message], spec: &RequestSpec) -> EventStream {
        self.requests
            .lock()
            .unwrap()
            .push((messages.to_vec(), spec.clone()));

        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(Script::Events(events)) => Box::pin(stream::iter(events)),
            Some(Script::Stall(events)) => Box::pin(stream::iter(events).chain(stream::pending())),
            None => Box::pin(stream::iter([StreamEvent::Error(LlmError::transport(
                "No mock response queued",
            ))])),
        }
    }

    fn provider(&self) -> Provider {
        self.provider
    }
}
