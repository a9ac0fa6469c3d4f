//! Anthropic block-event streams decoded end to end.

#![cfg(feature = "anthropic")]

mod common;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use sluice::types::{Backend, StreamEvent};

use common::*;

fn tool_turn() -> Vec<Value> {
    vec![
        json!({"type": "message_start", "message": {"id": "msg_01", "type": "message", "role": "assistant", "usage": {"input_tokens": 25, "output_tokens": 1}}}),
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "thinking", "thinking": "", "signature": ""}}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "thinking_delta", "thinking": "List the "}}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "thinking_delta", "thinking": "directory."}}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "signature_delta", "signature": "ErUB"}}),
        json!({"type": "content_block_stop", "index": 0}),
        json!({"type": "content_block_start", "index": 1, "content_block": {"type": "text", "text": ""}}),
        json!({"type": "content_block_delta", "index": 1, "delta": {"type": "text_delta", "text": "Voilà 🌍 "}}),
        json!({"type": "content_block_stop", "index": 1}),
        json!({"type": "ping"}),
        json!({"type": "content_block_start", "index": 2, "content_block": {"type": "tool_use", "id": "toolu_01", "name": "shell", "input": {}}}),
        json!({"type": "content_block_delta", "index": 2, "delta": {"type": "input_json_delta", "partial_json": ""}}),
        json!({"type": "content_block_delta", "index": 2, "delta": {"type": "input_json_delta", "partial_json": "{\"command\":"}}),
        json!({"type": "content_block_delta", "index": 2, "delta": {"type": "input_json_delta", "partial_json": "\"ls\"}"}}),
        json!({"type": "content_block_stop", "index": 2}),
        json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}, "usage": {"output_tokens": 40}}),
        json!({"type": "message_stop"}),
    ]
}

#[test]
fn tool_turn_is_split_invariant() {
    let events = decode_every_split(Backend::Anthropic, &sse_blocks(&tool_turn()));

    assert_eq!(
        kinds(&events),
        vec![
            "reasoning_delta",
            "reasoning_delta",
            "reasoning_end",
            "delta",
            "tool_call",
            "end"
        ]
    );
    assert_eq!(visible_text(&events), "Voilà 🌍 ");

    let StreamEvent::ReasoningEnd { text, metadata } = &events[2] else {
        panic!("expected reasoning end");
    };
    assert_eq!(text, "List thedirectory.");
    assert_eq!(metadata["signature"], json!("ErUB"));

    let StreamEvent::ToolCall(call) = &events[4] else {
        panic!("expected tool call");
    };
    assert_eq!(call.id, "toolu_01");
    assert_eq!(call.name, "shell");
    assert_eq!(call.arguments, json!({"command": "ls"}));
    assert_eq!(call.raw_arguments, "{\"command\":\"ls\"}");
}

#[test]
fn last_tool_call_ends_with_tool_use_and_start_usage() {
    let events = decode_body(Backend::Anthropic, &sse_blocks(&tool_turn()));
    assert_single_terminal(&events);

    let StreamEvent::End(end) = events.last().unwrap() else {
        unreachable!();
    };
    assert_eq!(end.reason.as_deref(), Some("tool_use"));
    assert_eq!(end.response_id.as_deref(), Some("msg_01"));
    // The stream ends before message_delta, so only message_start usage is known.
    assert_eq!(end.token_usage().unwrap().input_tokens, 25);
    assert_eq!(end.token_usage().unwrap().output_tokens, 1);
}

#[test]
fn text_turn_overlays_delta_usage() {
    let body = sse_blocks(&[
        json!({"type": "message_start", "message": {"id": "msg_02", "usage": {"input_tokens": 9, "output_tokens": 1, "cache_read_input_tokens": 4}}}),
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hello"}}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": " world"}}),
        json!({"type": "content_block_stop", "index": 0}),
        json!({"type": "message_delta", "delta": {"stop_reason": "end_turn", "stop_sequence": null}, "usage": {"output_tokens": 12}}),
        json!({"type": "message_stop"}),
    ]);
    let events = decode_every_split(Backend::Anthropic, &body);

    assert_eq!(kinds(&events), vec!["delta", "delta", "end"]);
    let StreamEvent::End(end) = &events[2] else {
        unreachable!();
    };
    assert_eq!(end.reason.as_deref(), Some("end_turn"));
    let usage = end.token_usage().unwrap();
    assert_eq!(usage.input_tokens, 9);
    assert_eq!(usage.output_tokens, 12);
    assert_eq!(usage.cache_read_tokens, Some(4));
}

#[test]
fn unknown_events_and_malformed_frames_do_not_stop_decoding() {
    let mut body = sse_blocks(&[
        json!({"type": "message_start", "message": {"id": "msg_03"}}),
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
        json!({"type": "brand_new_event", "payload": [1, 2, 3]}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "citations_delta", "citation": {}}}),
    ]);
    body.push_str("event: content_block_delta\ndata: {\"type\": \"content_block_delta\", \"index\": 0,\n\n");
    body.push_str(&sse_blocks(&[
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "still going"}}),
        json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}}),
    ]));

    let events = decode_body(Backend::Anthropic, &body);
    assert_eq!(kinds(&events), vec!["error", "delta", "end"]);
    assert_eq!(visible_text(&events), "still going");
    let StreamEvent::Error { cause, .. } = &events[0] else {
        unreachable!();
    };
    assert_eq!(
        cause.as_ref().unwrap().error().category(),
        sluice::error::ErrorCategory::Serialization
    );
}

#[test]
fn overloaded_error_event_is_reported_inline() {
    let body = sse_blocks(&[
        json!({"type": "message_start", "message": {"id": "msg_04"}}),
        json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}),
    ]);
    let events = decode_body(Backend::Anthropic, &body);

    assert_eq!(kinds(&events), vec!["error", "end"]);
    let StreamEvent::Error { message, cause } = &events[0] else {
        unreachable!();
    };
    assert_eq!(message, "Overloaded");
    assert!(cause
        .as_ref()
        .unwrap()
        .error()
        .to_string()
        .contains("overloaded_error"));
    let StreamEvent::End(end) = &events[1] else {
        unreachable!();
    };
    assert_eq!(end.reason.as_deref(), Some("error"));
}

#[test]
fn body_ending_early_flushes_open_tool_call_once() {
    let body = sse_blocks(&[
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "tool_use", "id": "toolu_02", "name": "read_file"}}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "input_json_delta", "partial_json": "{\"path\": \"a.txt\"}"}}),
    ]);
    let events = decode_every_split(Backend::Anthropic, &body);

    assert_eq!(kinds(&events), vec!["tool_call", "end"]);
    let StreamEvent::ToolCall(call) = &events[0] else {
        unreachable!();
    };
    assert_eq!(call.arguments, json!({"path": "a.txt"}));
    let StreamEvent::End(end) = &events[1] else {
        unreachable!();
    };
    assert_eq!(end.reason, None);
}

#[test]
fn redacted_thinking_surfaces_as_notification() {
    let body = sse_blocks(&[
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "redacted_thinking", "data": "EmwKAhgB"}}),
        json!({"type": "content_block_stop", "index": 0}),
        json!({"type": "message_stop"}),
    ]);
    let events = decode_body(Backend::Anthropic, &body);

    assert_eq!(kinds(&events), vec!["notification", "end"]);
    let StreamEvent::Notification { kind, payload } = &events[0] else {
        unreachable!();
    };
    assert_eq!(kind, "redacted_thinking");
    assert_eq!(payload["data"], json!("EmwKAhgB"));
}
