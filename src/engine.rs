//! Conversation engine: one assistant, one provider, one history
//!
//! Ties the state machine to a provider and the price table. Each call runs
//! a single turn to completion, failure or cancellation; the history only
//! ever records completed turns.

use crate::aggregator::{aggregate, Aggregated, Delta};
use crate::assistant::{resolve_assistant, AssistantError, Overrides, ResolvedAssistant};
use crate::config::Settings;
use crate::llm::{create_provider, CompletionProvider, LlmError, LlmErrorKind, Message, RequestSpec};
use crate::pricing::PriceTable;
use crate::state_machine::{
    ConvState, Conversation, ConversationMachine, Effect, Event, InvalidSeed, TransitionError, UsageRecord,
    UsageTotals,
};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors raised before a request is sent
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("A response is still in progress")]
    Busy,
    #[error("{0}")]
    InvalidState(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("{0}")]
    Auth(String),
}

impl From<TransitionError> for EngineError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::Busy => EngineError::Busy,
            TransitionError::EmptyMessage => EngineError::InvalidRequest("Message is empty".to_string()),
            TransitionError::InvalidState(message) => EngineError::InvalidState(message),
        }
    }
}

impl From<LlmError> for EngineError {
    fn from(e: LlmError) -> Self {
        match e.kind {
            LlmErrorKind::Auth => EngineError::Auth(e.message),
            _ => EngineError::InvalidRequest(e.message),
        }
    }
}

impl From<InvalidSeed> for EngineError {
    fn from(e: InvalidSeed) -> Self {
        EngineError::InvalidRequest(e.to_string())
    }
}

impl From<AssistantError> for EngineError {
    fn from(e: AssistantError) -> Self {
        EngineError::InvalidRequest(e.to_string())
    }
}

/// A committed assistant turn
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedTurn {
    pub text: String,
    pub thinking: Option<String>,
    pub usage: UsageRecord,
}

/// How a turn ended
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    Completed(CompletedTurn),
    /// Nothing was committed; the engine is in the error state until the next command
    Failed(LlmError),
    /// Nothing was committed; the engine is idle
    Cancelled,
}

/// Conversation engine
pub struct Engine {
    assistant: String,
    machine: ConversationMachine,
    spec: RequestSpec,
    provider: Arc<dyn CompletionProvider>,
    prices: PriceTable,
}

impl Engine {
    /// Build an engine for a resolved assistant.
    ///
    /// The sampling parameters are checked here, so a bad configuration
    /// fails before any network traffic.
    pub fn new(
        assistant: ResolvedAssistant,
        provider: Arc<dyn CompletionProvider>,
        prices: PriceTable,
    ) -> Result<Self, EngineError> {
        let spec = assistant.spec.enforce_thinking();
        spec.validate()?;
        let conversation = Conversation::new(assistant.seed)?;

        tracing::info!(
            assistant = %assistant.name,
            provider = %spec.provider,
            model = %spec.model,
            temperature = ?spec.temperature,
            top_p = ?spec.top_p,
            thinking_budget = ?spec.thinking_budget,
            "Engine ready"
        );

        Ok(Self {
            assistant: assistant.name,
            machine: ConversationMachine::new(conversation),
            spec,
            provider,
            prices,
        })
    }

    /// Resolve an assistant from settings and connect to its provider
    pub fn from_settings(settings: &Settings, assistant: &str, overrides: &Overrides) -> Result<Self, EngineError> {
        let resolved = resolve_assistant(settings, assistant, overrides)?;
        resolved.spec.clone().enforce_thinking().validate()?;
        let provider = create_provider(resolved.spec.provider, &resolved.endpoint)?;
        let prices = PriceTable::builtin().with_overrides(settings.pricing.clone());
        Self::new(resolved, provider, prices)
    }

    pub fn assistant(&self) -> &str {
        &self.assistant
    }

    pub fn spec(&self) -> &RequestSpec {
        &self.spec
    }

    pub fn state(&self) -> &ConvState {
        self.machine.state()
    }

    /// Snapshot of the history
    pub fn messages(&self) -> Vec<Message> {
        self.machine.conversation().messages()
    }

    pub fn totals(&self) -> UsageTotals {
        self.machine.conversation().totals()
    }

    /// Send a user message and stream the reply.
    ///
    /// `on_delta` sees every fragment as it arrives. `cancel` aborts the
    /// request and rolls the user message back.
    pub async fn run_turn<F>(&mut self, text: &str, cancel: &CancellationToken, on_delta: F) -> Result<TurnOutcome, EngineError>
    where
        F: FnMut(Delta<'_>),
    {
        let effects = self.machine.handle(Event::UserSubmit {
            text: text.to_string(),
        })?;
        self.run_effects(effects, cancel, on_delta).await
    }

    /// Replace the last assistant reply with a fresh one.
    ///
    /// On failure or cancellation the previous reply is kept.
    pub async fn regenerate<F>(&mut self, cancel: &CancellationToken, on_delta: F) -> Result<TurnOutcome, EngineError>
    where
        F: FnMut(Delta<'_>),
    {
        let effects = self.machine.handle(Event::Regenerate)?;
        self.run_effects(effects, cancel, on_delta).await
    }

    /// Drop everything but the system prompt
    pub fn clear(&mut self) {
        // Clear is accepted in every state
        if let Err(e) = self.machine.handle(Event::Clear) {
            tracing::warn!(error = %e, "Clear rejected");
        }
    }

    /// Leave the error state without sending anything
    pub fn acknowledge(&mut self) -> Result<(), EngineError> {
        if let ConvState::Error { error } = self.state() {
            tracing::debug!(kind = %error.kind, error = %error.message, "Error acknowledged");
        }
        self.machine.handle(Event::Acknowledge)?;
        Ok(())
    }

    async fn run_effects<F>(&mut self, effects: Vec<Effect>, cancel: &CancellationToken, on_delta: F) -> Result<TurnOutcome, EngineError>
    where
        F: FnMut(Delta<'_>),
    {
        if effects.contains(&Effect::RequestCompletion) {
            self.request_completion(cancel, on_delta).await
        } else {
            Err(EngineError::InvalidState("No request to send".to_string()))
        }
    }

    async fn request_completion<F>(&mut self, cancel: &CancellationToken, on_delta: F) -> Result<TurnOutcome, EngineError>
    where
        F: FnMut(Delta<'_>),
    {
        let spec = self.spec.clone().enforce_thinking();
        let messages = self.messages();

        let stream = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            stream = self.provider.complete(&messages, &spec) => Some(stream),
        };
        let aggregated = match stream {
            Some(stream) => aggregate(stream, cancel, on_delta).await,
            None => Aggregated::Cancelled,
        };

        match aggregated {
            Aggregated::Completed(completion) => {
                let cost = self.prices.cost(
                    spec.provider,
                    &spec.model,
                    completion.usage.input_tokens,
                    completion.usage.output_tokens,
                );
                let usage = UsageRecord {
                    input_tokens: completion.usage.input_tokens,
                    output_tokens: completion.usage.output_tokens,
                    cost,
                };
                let message = Message::assistant(completion.text.clone()).with_thinking(completion.thinking.clone());
                self.machine.handle(Event::ResponseComplete {
                    message,
                    usage: usage.clone(),
                })?;

                Ok(TurnOutcome::Completed(CompletedTurn {
                    text: completion.text,
                    thinking: completion.thinking,
                    usage,
                }))
            }
            Aggregated::Failed { error, partial } => {
                tracing::warn!(
                    kind = %error.kind,
                    error = %error.message,
                    discarded_chars = partial.text.len(),
                    "Turn failed"
                );
                self.machine.handle(Event::ResponseFailed { error: error.clone() })?;
                Ok(TurnOutcome::Failed(error))
            }
            Aggregated::Cancelled => {
                tracing::info!("Turn cancelled");
                self.machine.handle(Event::Cancelled)?;
                Ok(TurnOutcome::Cancelled)
            }
        }
    }
}
