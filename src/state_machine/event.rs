//! Events that can occur in a conversation

use super::conversation::UsageRecord;
use crate::llm::{LlmError, Message};

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // User events
    UserSubmit { text: String },
    Regenerate,
    Clear,
    /// Dismiss a reported error without sending anything
    Acknowledge,

    // Stream outcomes
    ResponseComplete { message: Message, usage: UsageRecord },
    ResponseFailed { error: LlmError },
    Cancelled,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::UserSubmit { .. } => "user_submit",
            Event::Regenerate => "regenerate",
            Event::Clear => "clear",
            Event::Acknowledge => "acknowledge",
            Event::ResponseComplete { .. } => "response_complete",
            Event::ResponseFailed { .. } => "response_failed",
            Event::Cancelled => "cancelled",
        }
    }
}
