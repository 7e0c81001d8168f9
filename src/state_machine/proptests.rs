//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across arbitrary command
//! sequences and stream outcomes.

use super::*;
use crate::llm::{LlmError, Message, MessageRole};
use crate::pricing::Cost;
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

#[derive(Debug, Clone)]
enum Command {
    Submit(String),
    Regenerate,
    Clear,
    Acknowledge,
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Complete,
    Fail,
    Cancel,
}

fn machine() -> ConversationMachine {
    ConversationMachine::new(Conversation::new(vec![Message::system("You are terse")]).unwrap())
}

fn event_for(command: &Command) -> Event {
    match command {
        Command::Submit(text) => Event::UserSubmit { text: text.clone() },
        Command::Regenerate => Event::Regenerate,
        Command::Clear => Event::Clear,
        Command::Acknowledge => Event::Acknowledge,
    }
}

fn outcome_event(outcome: Outcome, n: usize) -> Event {
    match outcome {
        Outcome::Complete => Event::ResponseComplete {
            message: Message::assistant(format!("reply {n}")),
            usage: UsageRecord {
                input_tokens: 10,
                output_tokens: 5,
                cost: Cost::unknown(),
            },
        },
        Outcome::Fail => Event::ResponseFailed {
            error: LlmError::server_error("overloaded"),
        },
        Outcome::Cancel => Event::Cancelled,
    }
}

/// System prompt first, then strictly alternating user/assistant
fn well_formed(conversation: &Conversation) -> bool {
    let entries = conversation.entries();
    if entries.first().map(|e| e.message.role) != Some(MessageRole::System) {
        return false;
    }
    entries.iter().skip(1).enumerate().all(|(i, e)| {
        let expected = if i % 2 == 0 {
            MessageRole::User
        } else {
            MessageRole::Assistant
        };
        e.message.role == expected
    })
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_command() -> impl Strategy<Value = Command> {
    prop_oneof![
        4 => "[a-zA-Z ]{0,12}".prop_map(Command::Submit),
        2 => Just(Command::Regenerate),
        1 => Just(Command::Clear),
        1 => Just(Command::Acknowledge),
    ]
}

fn arb_outcome() -> impl Strategy<Value = Outcome> {
    prop_oneof![
        3 => Just(Outcome::Complete),
        1 => Just(Outcome::Fail),
        1 => Just(Outcome::Cancel),
    ]
}

proptest! {
    // Invariant 1: whatever happens, the history stays well formed and the
    // machine never rests with a request in flight
    #[test]
    fn prop_sequences_preserve_invariants(
        steps in proptest::collection::vec((arb_command(), arb_outcome()), 0..30)
    ) {
        let mut m = machine();
        for (n, (command, outcome)) in steps.into_iter().enumerate() {
            let before = m.conversation().messages();
            let Ok(effects) = m.handle(event_for(&command)) else {
                prop_assert_eq!(m.conversation().messages(), before);
                continue;
            };

            if effects.contains(&Effect::RequestCompletion) {
                prop_assert!(m.state().is_busy());

                // Invariant 2: a second request is refused while busy
                prop_assert_eq!(
                    m.handle(Event::UserSubmit { text: "again".to_string() }).unwrap_err(),
                    TransitionError::Busy
                );

                m.handle(outcome_event(outcome, n)).unwrap();

                // Invariant 3: failure and cancellation leave no trace
                if !matches!(outcome, Outcome::Complete) {
                    prop_assert_eq!(m.conversation().messages(), before);
                }
            }

            prop_assert!(!m.state().is_busy());
            prop_assert!(well_formed(m.conversation()), "{:?}", m.conversation());
            prop_assert_ne!(m.conversation().last_role(), Some(MessageRole::User));
        }
    }

    // Invariant 4: regenerate replaces exactly the last reply
    #[test]
    fn prop_regenerate_replaces_last_reply(text in "[a-zA-Z]{1,12}", outcome in arb_outcome()) {
        let mut m = machine();
        m.handle(Event::UserSubmit { text }).unwrap();
        m.handle(outcome_event(Outcome::Complete, 0)).unwrap();
        let len = m.conversation().len();
        let prefix: Vec<_> = m.conversation().messages()[..len - 1].to_vec();

        m.handle(Event::Regenerate).unwrap();
        m.handle(outcome_event(outcome, 1)).unwrap();

        prop_assert_eq!(m.conversation().len(), len);
        prop_assert_eq!(&m.conversation().messages()[..len - 1], &prefix[..]);
    }

    // Invariant 5: clear always lands in Idle with only the system prompt
    #[test]
    fn prop_clear_resets(steps in proptest::collection::vec(arb_command(), 0..10)) {
        let mut m = machine();
        for (n, command) in steps.iter().enumerate() {
            if let Ok(effects) = m.handle(event_for(command)) {
                if effects.contains(&Effect::RequestCompletion) {
                    m.handle(outcome_event(Outcome::Complete, n)).unwrap();
                }
            }
        }
        m.handle(Event::Clear).unwrap();
        prop_assert!(matches!(m.state(), ConvState::Idle));
        prop_assert_eq!(m.conversation().len(), 1);
        prop_assert_eq!(m.conversation().system_prompt(), Some("You are terse"));
        prop_assert_eq!(m.conversation().totals(), UsageTotals::default());
    }
}
