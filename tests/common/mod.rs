//! Shared fixtures for decoder integration tests.

#![allow(dead_code)]

use serde_json::Value;

use sluice::config::DecoderConfig;
use sluice::provider::create_decoder;
use sluice::stream::DecodeIter;
use sluice::types::{Backend, StreamEvent};

/// `data:` lines for each payload, as chat-completions servers send them.
pub fn data_lines(payloads: &[Value], done: bool) -> String {
    let mut body: String = payloads
        .iter()
        .map(|p| format!("data: {p}\n\n"))
        .collect();
    if done {
        body.push_str("data: [DONE]\n\n");
    }
    body
}

/// Full SSE blocks with an `event:` line taken from the payload's `type`.
pub fn sse_blocks(payloads: &[Value]) -> String {
    payloads
        .iter()
        .map(|p| {
            let name = p["type"].as_str().unwrap_or("message");
            format!("event: {name}\ndata: {p}\n\n")
        })
        .collect()
}

/// Decode `chunks` with the default decoder for `backend`.
pub fn decode_chunks<B: AsRef<[u8]>>(backend: Backend, chunks: Vec<B>) -> Vec<StreamEvent> {
    let config = DecoderConfig::default();
    let decoder = create_decoder(backend, &config).unwrap();
    DecodeIter::new(chunks, decoder, &config).collect()
}

pub fn decode_body(backend: Backend, body: &str) -> Vec<StreamEvent> {
    decode_chunks(backend, vec![body.as_bytes()])
}

/// Decode `body` whole, one byte at a time and split at every offset, and
/// assert every variant yields the same events. Returns them.
pub fn decode_every_split(backend: Backend, body: &str) -> Vec<StreamEvent> {
    let bytes = body.as_bytes();
    let whole = decode_body(backend, body);

    let bytewise = decode_chunks(backend, bytes.chunks(1).collect());
    assert_eq!(bytewise, whole, "byte-at-a-time decoding diverged");

    for split in 1..bytes.len() {
        let (head, tail) = bytes.split_at(split);
        let events = decode_chunks(backend, vec![head, tail]);
        assert_eq!(events, whole, "decoding diverged when split at byte {split}");
    }
    whole
}

/// Event names, for asserting the shape of a sequence.
pub fn kinds(events: &[StreamEvent]) -> Vec<&'static str> {
    events
        .iter()
        .map(|event| match event {
            StreamEvent::Delta { .. } => "delta",
            StreamEvent::ToolCall(_) => "tool_call",
            StreamEvent::ReasoningDelta { .. } => "reasoning_delta",
            StreamEvent::ReasoningEnd { .. } => "reasoning_end",
            StreamEvent::Notification { .. } => "notification",
            StreamEvent::Error { .. } => "error",
            StreamEvent::End(_) => "end",
        })
        .collect()
}

/// Concatenated visible text.
pub fn visible_text(events: &[StreamEvent]) -> String {
    events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::Delta { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

/// Exactly one `End`, and it is the last event.
pub fn assert_single_terminal(events: &[StreamEvent]) {
    let ends = events.iter().filter(|e| e.is_end()).count();
    assert_eq!(ends, 1, "expected exactly one End in {events:?}");
    assert!(events.last().is_some_and(StreamEvent::is_end), "End must be last");
}
