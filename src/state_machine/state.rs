//! Conversation state types

use super::conversation::Entry;
use crate::llm::LlmError;
use std::fmt;

/// What the outstanding request will do to the history once it resolves
#[derive(Debug, Clone, PartialEq)]
pub enum PendingTurn {
    /// A new user message was appended; it is removed again on failure
    Submit,
    /// The last assistant message was taken off; it is restored on failure
    Regenerate { replaced: Box<Entry> },
}

/// Conversation state
#[derive(Debug, Clone)]
pub enum ConvState {
    /// Ready for input
    Idle,
    /// A completion request is in flight
    AwaitingResponse { turn: PendingTurn },
    /// The last request failed; the history is as it was before it
    Error { error: LlmError },
}

impl ConvState {
    #[cfg(test)]
    pub fn is_busy(&self) -> bool {
        matches!(self, ConvState::AwaitingResponse { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConvState::Idle => "idle",
            ConvState::AwaitingResponse { .. } => "awaiting_response",
            ConvState::Error { .. } => "error",
        }
    }
}

impl fmt::Display for ConvState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
