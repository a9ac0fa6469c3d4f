//! OpenAI Responses output-item streams decoded end to end.

#![cfg(feature = "openai")]

mod common;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use sluice::types::{Backend, StreamEvent};

use common::*;

fn reasoning_item(summary: &str) -> Value {
    json!({
        "type": "reasoning",
        "id": "rs_1",
        "summary": [{"type": "summary_text", "text": summary}],
        "encrypted_content": "gAAAAB"
    })
}

fn call_item(arguments: &str) -> Value {
    json!({
        "type": "function_call",
        "id": "fc_1",
        "call_id": "call_1",
        "name": "shell",
        "arguments": arguments,
        "status": "completed"
    })
}

fn tool_turn() -> Vec<Value> {
    vec![
        json!({"type": "response.created", "sequence_number": 0, "response": {"id": "resp_1", "status": "in_progress", "output": []}}),
        json!({"type": "response.output_item.added", "output_index": 0, "item": {"type": "reasoning", "id": "rs_1", "summary": []}}),
        json!({"type": "response.reasoning_summary_part.added", "item_id": "rs_1", "output_index": 0, "summary_index": 0}),
        json!({"type": "response.reasoning_summary_text.delta", "item_id": "rs_1", "output_index": 0, "delta": "Check the "}),
        json!({"type": "response.reasoning_summary_text.delta", "item_id": "rs_1", "output_index": 0, "delta": "files."}),
        json!({"type": "response.output_item.done", "output_index": 0, "item": reasoning_item("Check the files.")}),
        json!({"type": "response.output_item.added", "output_index": 1, "item": {"type": "message", "id": "msg_1", "role": "assistant", "content": []}}),
        json!({"type": "response.output_text.delta", "item_id": "msg_1", "output_index": 1, "content_index": 0, "delta": "Looking… "}),
        json!({"type": "response.output_text.done", "item_id": "msg_1", "output_index": 1, "content_index": 0, "text": "Looking… "}),
        json!({"type": "response.output_item.added", "output_index": 2, "item": {"type": "function_call", "id": "fc_1", "call_id": "call_1", "name": "shell", "arguments": ""}}),
        json!({"type": "response.function_call_arguments.delta", "item_id": "fc_1", "output_index": 2, "delta": "{\"command\":"}),
        json!({"type": "response.function_call_arguments.delta", "item_id": "fc_1", "output_index": 2, "delta": "\"ls\"}"}),
        json!({"type": "response.function_call_arguments.done", "item_id": "fc_1", "output_index": 2, "arguments": "{\"command\":\"ls\"}"}),
        json!({"type": "response.output_item.done", "output_index": 2, "item": call_item("{\"command\":\"ls\"}")}),
        json!({"type": "response.completed", "response": {
            "id": "resp_1",
            "status": "completed",
            "output": [reasoning_item("Check the files."), call_item("{\"command\":\"ls\"}")],
            "usage": {"input_tokens": 30, "output_tokens": 12, "total_tokens": 42, "output_tokens_details": {"reasoning_tokens": 8}}
        }}),
    ]
}

#[test]
fn tool_turn_is_split_invariant_and_emits_each_item_once() {
    let events = decode_every_split(Backend::OpenAiResponses, &sse_blocks(&tool_turn()));

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
    assert_eq!(visible_text(&events), "Looking… ");

    let StreamEvent::ReasoningEnd { text, metadata } = &events[2] else {
        panic!("expected reasoning end");
    };
    assert_eq!(text, "Check thefiles.");
    assert_eq!(metadata["encrypted_content"], json!("gAAAAB"));
    assert_eq!(metadata["id"], json!("rs_1"));
    assert_eq!(metadata["text"], json!("Check thefiles."));

    let StreamEvent::ToolCall(call) = &events[4] else {
        panic!("expected tool call");
    };
    assert_eq!(call.id, "call_1");
    assert_eq!(call.arguments, json!({"command": "ls"}));

    let StreamEvent::End(end) = &events[5] else {
        unreachable!();
    };
    assert_eq!(end.reason.as_deref(), Some("completed"));
    assert_eq!(end.response_id.as_deref(), Some("resp_1"));
    assert_eq!(end.token_usage().unwrap().reasoning_tokens, Some(8));
}

#[test]
fn final_response_recovers_items_never_streamed() {
    let body = sse_blocks(&[
        json!({"type": "response.created", "response": {"id": "resp_2"}}),
        json!({"type": "response.completed", "response": {
            "id": "resp_2",
            "status": "completed",
            "output": [reasoning_item("Quietly decided."), call_item("{\"command\":\"pwd\"}")]
        }}),
    ]);
    let events = decode_body(Backend::OpenAiResponses, &body);

    assert_eq!(
        kinds(&events),
        vec!["reasoning_delta", "reasoning_end", "tool_call", "end"]
    );
    let StreamEvent::ToolCall(call) = &events[2] else {
        unreachable!();
    };
    assert_eq!(call.name, "shell");
    assert_eq!(call.arguments, json!({"command": "pwd"}));
}

#[test]
fn bare_json_lines_are_accepted() {
    let body: String = [
        json!({"type": "response.created", "response": {"id": "resp_3"}}),
        json!({"type": "response.output_text.delta", "delta": "plain"}),
        json!({"type": "response.completed", "response": {"id": "resp_3", "status": "completed"}}),
    ]
    .iter()
    .map(|p| format!("{p}\n"))
    .collect();
    let events = decode_every_split(Backend::OpenAiResponses, &body);

    assert_eq!(kinds(&events), vec!["delta", "end"]);
    assert_eq!(visible_text(&events), "plain");
}

#[test]
fn failed_response_reports_error_then_ends() {
    let body = sse_blocks(&[
        json!({"type": "response.output_text.delta", "delta": "partial"}),
        json!({"type": "response.failed", "response": {
            "id": "resp_4",
            "status": "failed",
            "error": {"code": "server_error", "message": "The model crashed"}
        }}),
        json!({"type": "response.output_text.delta", "delta": "never read"}),
    ]);
    let events = decode_body(Backend::OpenAiResponses, &body);

    assert_eq!(kinds(&events), vec!["delta", "error", "end"]);
    let StreamEvent::Error { message, .. } = &events[1] else {
        unreachable!();
    };
    assert_eq!(message, "The model crashed");
    let StreamEvent::End(end) = &events[2] else {
        unreachable!();
    };
    assert_eq!(end.reason.as_deref(), Some("failed"));
}

#[test]
fn incomplete_response_keeps_live_reason() {
    let body = sse_blocks(&[json!({"type": "response.incomplete", "response": {
        "id": "resp_5",
        "status": "incomplete",
        "incomplete_details": {"reason": "max_output_tokens"}
    }})]);
    let events = decode_body(Backend::OpenAiResponses, &body);

    let StreamEvent::End(end) = events.last().unwrap() else {
        panic!("expected end");
    };
    assert_eq!(end.reason.as_deref(), Some("incomplete"));
    assert_single_terminal(&events);
}

#[test]
fn error_event_and_garbage_continue_until_done() {
    let mut body = sse_blocks(&[
        json!({"type": "error", "code": "rate_limit_exceeded", "message": "Slow down"}),
        json!({"type": "response.web_search_call.searching", "output_index": 0}),
    ]);
    body.push_str("data: {\"type\": \"response.output_text.delta\", \"delta\": }\n\n");
    body.push_str(&sse_blocks(&[json!({"type": "response.output_text.delta", "delta": "ok"})]));
    body.push_str("data: [DONE]\n\n");

    let events = decode_body(Backend::OpenAiResponses, &body);
    assert_eq!(kinds(&events), vec!["error", "error", "delta", "end"]);
    let StreamEvent::End(end) = &events[3] else {
        unreachable!();
    };
    assert_eq!(end.reason.as_deref(), Some("error"));
}

#[test]
fn annotations_become_notifications() {
    let body = sse_blocks(&[
        json!({"type": "response.output_text.annotation.added", "annotation": {"type": "url_citation", "url": "https://example.com"}}),
        json!({"type": "response.completed", "response": {"status": "completed"}}),
    ]);
    let events = decode_body(Backend::OpenAiResponses, &body);

    assert_eq!(kinds(&events), vec!["notification", "end"]);
    let StreamEvent::Notification { kind, payload } = &events[0] else {
        unreachable!();
    };
    assert_eq!(kind, "annotation");
    assert_eq!(payload["annotation"]["url"], json!("https://example.com"));
}
