//! Core conversation state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions.

mod conversation;
mod effect;
mod event;
mod machine;
mod state;
mod transition;

#[cfg(test)]
mod proptests;

pub use conversation::{Conversation, InvalidSeed, UsageRecord, UsageTotals};
pub use effect::Effect;
pub use event::Event;
pub use machine::ConversationMachine;
pub use state::{ConvState, PendingTurn};
pub use transition::TransitionError;
