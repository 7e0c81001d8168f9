//! Owner of the state and history, applying transitions

use super::conversation::Conversation;
use super::transition::{transition, TransitionError};
use super::{ConvState, Effect, Event};

/// Drives [`transition`] and applies its history effects.
///
/// Effects that need I/O are handed back to the caller.
#[derive(Debug)]
pub struct ConversationMachine {
    state: ConvState,
    conversation: Conversation,
}

impl ConversationMachine {
    pub fn new(conversation: Conversation) -> Self {
        Self {
            state: ConvState::Idle,
            conversation,
        }
    }

    pub fn state(&self) -> &ConvState {
        &self.state
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Run one event through the transition function.
    ///
    /// On error nothing changes.
    pub fn handle(&mut self, event: Event) -> Result<Vec<Effect>, TransitionError> {
        let event_name = event.name();
        let result = transition(&self.state, &self.conversation, event)?;

        tracing::debug!(
            from = %self.state,
            to = %result.new_state,
            event = event_name,
            "State transition"
        );
        self.state = result.new_state;

        let (history, outward): (Vec<_>, Vec<_>) = result.effects.into_iter().partition(Effect::is_history);
        for effect in history {
            match effect {
                Effect::PushEntry(entry) => self.conversation.push(entry),
                Effect::PopEntry => {
                    self.conversation.pop();
                }
                Effect::TruncateToSystem => self.conversation.truncate_to_system(),
                Effect::RequestCompletion => {}
            }
        }
        tracing::trace!(messages = self.conversation.entries().len(), "History updated");
        Ok(outward)
    }
}
