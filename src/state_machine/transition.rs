//! Pure state transition function

use super::conversation::{Conversation, Entry};
use super::{ConvState, Effect, Event, PendingTurn};
use crate::llm::MessageRole;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ConvState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ConvState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    #[must_use]
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("A response is still in progress (cancel it first)")]
    Busy,
    #[error("Message is empty")]
    EmptyMessage,
    #[error("{0}")]
    InvalidState(String),
}

/// Pure transition function
///
/// Given the same state, history and event it always produces the same
/// result; the history itself is only changed by applying the effects.
pub fn transition(
    state: &ConvState,
    conversation: &Conversation,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // Clear is always accepted and never touches the network
        (_, Event::Clear) => Ok(TransitionResult::new(ConvState::Idle).with_effect(Effect::TruncateToSystem)),

        // One request at a time
        (ConvState::AwaitingResponse { .. }, Event::UserSubmit { .. } | Event::Regenerate | Event::Acknowledge) => {
            Err(TransitionError::Busy)
        }

        // Idle/Error + UserSubmit -> AwaitingResponse. Submitting from Error
        // implicitly acknowledges it.
        (ConvState::Idle | ConvState::Error { .. }, Event::UserSubmit { text }) => {
            if text.trim().is_empty() {
                return Err(TransitionError::EmptyMessage);
            }
            if conversation.last_role() == Some(MessageRole::User) {
                return Err(TransitionError::InvalidState(
                    "The previous message has no reply yet".to_string(),
                ));
            }
            Ok(TransitionResult::new(ConvState::AwaitingResponse {
                turn: PendingTurn::Submit,
            })
            .with_effect(Effect::PushEntry(Entry::user(text)))
            .with_effect(Effect::RequestCompletion))
        }

        // Idle/Error + Regenerate -> AwaitingResponse, last reply set aside
        (ConvState::Idle | ConvState::Error { .. }, Event::Regenerate) => {
            let replaced = match conversation.last() {
                Some(entry) if conversation.can_regenerate() => entry.clone(),
                _ => {
                    return Err(TransitionError::InvalidState(
                        "Nothing to regenerate: the last message is not a reply from this session".to_string(),
                    ))
                }
            };
            Ok(TransitionResult::new(ConvState::AwaitingResponse {
                turn: PendingTurn::Regenerate {
                    replaced: Box::new(replaced),
                },
            })
            .with_effect(Effect::PopEntry)
            .with_effect(Effect::RequestCompletion))
        }

        (ConvState::Idle | ConvState::Error { .. }, Event::Acknowledge) => Ok(TransitionResult::new(ConvState::Idle)),

        // AwaitingResponse + ResponseComplete -> Idle, reply committed
        (ConvState::AwaitingResponse { .. }, Event::ResponseComplete { message, usage }) => {
            Ok(TransitionResult::new(ConvState::Idle).with_effect(Effect::PushEntry(Entry::assistant(message, usage))))
        }

        // AwaitingResponse + ResponseFailed -> Error, history rolled back
        (ConvState::AwaitingResponse { turn }, Event::ResponseFailed { error }) => {
            Ok(rollback(turn, ConvState::Error { error }))
        }

        // AwaitingResponse + Cancelled -> Idle, history rolled back
        (ConvState::AwaitingResponse { turn }, Event::Cancelled) => Ok(rollback(turn, ConvState::Idle)),

        (state, event) => Err(TransitionError::InvalidState(format!(
            "Unexpected {} while {}",
            event.name(),
            state
        ))),
    }
}

/// Undo whatever the pending turn did to the history
fn rollback(turn: &PendingTurn, new_state: ConvState) -> TransitionResult {
    let result = TransitionResult::new(new_state);
    match turn {
        PendingTurn::Submit => result.with_effect(Effect::PopEntry),
        PendingTurn::Regenerate { replaced } => result.with_effect(Effect::PushEntry((**replaced).clone())),
    }
}
