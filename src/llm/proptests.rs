//! Property-based tests for model dispatch and stream decoding
//!
//! These tests verify invariants of the provider layer:
//! - Dispatch is pure and legacy prefixes are always stripped
//! - The thinking constraint holds for any sampling parameters
//! - SSE decoding does not depend on how the body is chunked
//! - Every decoded stream ends with exactly one terminal event

use super::openai::ChatDecoder;
use super::sse::decode_sse;
use super::{route_model, Provider, RequestSpec, StreamEvent, THINKING_TEMPERATURE};
use futures::executor::block_on;
use futures::stream::{self, StreamExt};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

fn arb_provider() -> impl Strategy<Value = Provider> {
    prop::sample::select(Provider::ALL.to_vec())
}

/// Text fragments that are safe inside a JSON string
fn arb_fragment() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 .,!?]{1,20}"
}

/// An OpenAI-style SSE body for the given fragments
fn chat_body(fragments: &[String], terminated: bool) -> String {
    let mut body = String::new();
    for fragment in fragments {
        body.push_str(&format!(
            "data: {{\"choices\":[{{\"index\":0,\"delta\":{{\"content\":\"{fragment}\"}}}}]}}\n\n"
        ));
    }
    if terminated {
        body.push_str("data: {\"choices\":[],\"usage\":{\"prompt_tokens\":3,\"completion_tokens\":4}}\n\n");
        body.push_str("data: [DONE]\n\n");
    }
    body
}

/// Split `body` into chunks at the given (sorted, deduplicated) byte offsets
fn split_at(body: &str, mut cuts: Vec<usize>) -> Vec<Vec<u8>> {
    let bytes = body.as_bytes();
    cuts.retain(|&c| c > 0 && c < bytes.len());
    cuts.sort_unstable();
    cuts.dedup();

    let mut chunks = Vec::new();
    let mut start = 0;
    for cut in cuts {
        chunks.push(bytes[start..cut].to_vec());
        start = cut;
    }
    chunks.push(bytes[start..].to_vec());
    chunks
}

fn decode(chunks: Vec<Vec<u8>>) -> Vec<StreamEvent> {
    let body = stream::iter(chunks.into_iter().map(Ok::<_, std::io::Error>));
    block_on(decode_sse(body, ChatDecoder::default()).collect())
}

fn text_of(events: &[StreamEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::TextDelta(t) => Some(t.as_str()),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Routing the same name twice gives the same answer
    #[test]
    fn prop_route_is_deterministic(model in "[a-z0-9:.-]{0,24}") {
        prop_assert_eq!(route_model(&model), route_model(&model));
    }

    /// Legacy prefixes never reach the vendor
    #[test]
    fn prop_legacy_prefix_stripped(
        prefix in prop::sample::select(vec!["oai-compat:", "oai-azure:", "openai:", "anthropic:"]),
        rest in "[a-z0-9.-]{1,20}",
    ) {
        let route = route_model(&format!("{prefix}{rest}"));
        prop_assert!(route.provider.is_some());
        prop_assert_eq!(route.model, rest);
    }

    /// With a thinking budget, sampling is pinned regardless of input
    #[test]
    fn prop_thinking_constraint(
        provider in arb_provider(),
        temperature in proptest::option::of(0.0f32..2.0),
        top_p in proptest::option::of(0.01f32..1.0),
        budget in 1024u32..32_000,
    ) {
        let spec = RequestSpec {
            temperature,
            top_p,
            thinking_budget: Some(budget),
            ..RequestSpec::new(provider, "model")
        }
        .enforce_thinking();

        prop_assert_eq!(spec.temperature, Some(THINKING_TEMPERATURE));
        prop_assert_eq!(spec.top_p, None);
        prop_assert_eq!(spec.clone().enforce_thinking(), spec);
    }

    /// Chunk boundaries do not change the decoded output
    #[test]
    fn prop_chunking_invariance(
        fragments in proptest::collection::vec(arb_fragment(), 1..8),
        cuts in proptest::collection::vec(0usize..2000, 0..12),
    ) {
        let body = chat_body(&fragments, true);
        let whole = decode(vec![body.as_bytes().to_vec()]);
        let split = decode(split_at(&body, cuts));

        prop_assert_eq!(text_of(&whole), fragments.concat());
        prop_assert_eq!(text_of(&split), fragments.concat());
        prop_assert_eq!(whole.len(), split.len());
    }

    /// Complete or truncated, a stream ends with exactly one terminal event
    #[test]
    fn prop_single_terminal_event(
        fragments in proptest::collection::vec(arb_fragment(), 0..8),
        terminated in any::<bool>(),
    ) {
        let events = decode(vec![chat_body(&fragments, terminated).into_bytes()]);
        let terminals = events.iter().filter(|e| e.is_terminal()).count();

        prop_assert_eq!(terminals, 1);
        prop_assert!(events.last().is_some_and(StreamEvent::is_terminal));
        prop_assert_eq!(matches!(events.last(), Some(StreamEvent::Done)), terminated);
    }
}
