//! Conversation history with per-turn usage

use crate::llm::{Message, MessageRole};
use crate::pricing::Cost;
use thiserror::Error;

/// Token counts and cost of one assistant turn
#[derive(Debug, Clone, PartialEq)]
pub struct UsageRecord {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: Cost,
}

/// A message plus the usage that produced it (assistant turns only)
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub message: Message,
    pub usage: Option<UsageRecord>,
}

impl Entry {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            message: Message::user(text),
            usage: None,
        }
    }

    pub fn assistant(message: Message, usage: UsageRecord) -> Self {
        Self {
            message,
            usage: Some(usage),
        }
    }
}

/// Running totals over a conversation
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UsageTotals {
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// USD
    pub cost: f64,
    /// At least one turn had no matching price
    pub unknown_pricing: bool,
}

#[derive(Debug, Clone, Error)]
#[error("Invalid assistant messages: {0}")]
pub struct InvalidSeed(pub String);

/// Ordered message history.
///
/// The leading seed messages come from the assistant definition and survive
/// `clear`; only a system prompt at position zero is kept across a clear.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    entries: Vec<Entry>,
    seed_len: usize,
}

impl Conversation {
    /// Start a conversation from an assistant's seed messages.
    ///
    /// A system message may only appear first; after it, roles alternate
    /// starting with `user`, and the seed may not end on a user message.
    pub fn new(seed: Vec<Message>) -> Result<Self, InvalidSeed> {
        let body_start = usize::from(seed.first().is_some_and(|m| m.role == MessageRole::System));
        for (i, message) in seed.iter().enumerate().skip(body_start) {
            let expected = if (i - body_start) % 2 == 0 {
                MessageRole::User
            } else {
                MessageRole::Assistant
            };
            if message.role != expected {
                return Err(InvalidSeed(format!(
                    "message {} has role {}, expected {}",
                    i + 1,
                    message.role.as_str(),
                    expected.as_str()
                )));
            }
        }
        if seed.len() > body_start && seed.last().is_some_and(|m| m.role == MessageRole::User) {
            return Err(InvalidSeed("the last message must not be a user message".to_string()));
        }

        let seed_len = seed.len();
        Ok(Self {
            entries: seed
                .into_iter()
                .map(|message| Entry { message, usage: None })
                .collect(),
            seed_len,
        })
    }

    /// Snapshot of the messages to send to a provider
    pub fn messages(&self) -> Vec<Message> {
        self.entries.iter().map(|e| e.message.clone()).collect()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&Entry> {
        self.entries.last()
    }

    pub fn last_role(&self) -> Option<MessageRole> {
        self.last().map(|e| e.message.role)
    }

    /// The last message is an assistant turn produced in this session
    pub fn can_regenerate(&self) -> bool {
        self.entries.len() > self.seed_len && self.last_role() == Some(MessageRole::Assistant)
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.entries
            .first()
            .filter(|e| e.message.role == MessageRole::System)
            .map(|e| e.message.content.as_str())
    }

    /// Sum of usage over every recorded assistant turn
    pub fn totals(&self) -> UsageTotals {
        self.entries
            .iter()
            .filter_map(|e| e.usage.as_ref())
            .fold(UsageTotals::default(), |acc, u| UsageTotals {
                input_tokens: acc.input_tokens + u.input_tokens,
                output_tokens: acc.output_tokens + u.output_tokens,
                cost: acc.cost + u.cost.amount,
                unknown_pricing: acc.unknown_pricing || u.cost.unknown_pricing(),
            })
    }

    pub(super) fn push(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    pub(super) fn pop(&mut self) -> Option<Entry> {
        if self.entries.len() > self.seed_len {
            self.entries.pop()
        } else {
            None
        }
    }

    pub(super) fn truncate_to_system(&mut self) {
        let keep = usize::from(self.system_prompt().is_some());
        self.entries.truncate(keep);
        self.seed_len = keep;
    }
}
