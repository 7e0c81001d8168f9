//! Effects produced by state transitions

use super::conversation::Entry;

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Append to the history
    PushEntry(Entry),

    /// Remove the last non-seed entry
    PopEntry,

    /// Drop everything but the system prompt
    TruncateToSystem,

    /// Send the current history to the provider
    RequestCompletion,
}

impl Effect {
    /// Applied to the history by the machine itself rather than the caller
    pub fn is_history(&self) -> bool {
        !matches!(self, Effect::RequestCompletion)
    }
}
