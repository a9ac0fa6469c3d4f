//! OpenAI Responses API: request body and output-item stream decoder.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, trace};

use super::format::{image_data_url, tool_result_to_string};
use crate::error::SluiceError;
use crate::stream::{
    malformed_frame, CallKey, Finalizer, Flow, Framing, ReasonSource, ReasoningAccumulator,
    StreamDecoder, ToolCallAccumulator,
};
use crate::types::*;

/// Build the `/responses` request body.
pub fn build_request_body(options: &StreamOptions) -> Value {
    let mut body = Map::new();
    body.insert("model".into(), options.model.clone().into());
    body.insert("input".into(), build_input_items(&options.messages).into());
    body.insert("stream".into(), true.into());

    if let Some(max) = options.max_tokens {
        body.insert("max_output_tokens".into(), max.into());
    }

    if let Some(ref tools) = options.tools {
        if !tools.is_empty() {
            let tool_defs: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                        "strict": false,
                    })
                })
                .collect();
            body.insert("tools".into(), tool_defs.into());
        }
    }

    if let Some(ref fmt) = options.response_format {
        let text_format = match fmt {
            ResponseFormat::JsonObject => Some(json!({"type": "json_object"})),
            ResponseFormat::JsonSchema { schema, name } => Some(json!({
                "type": "json_schema",
                "name": name,
                "schema": schema,
                "strict": true,
            })),
            ResponseFormat::Text => None,
        };
        if let Some(format) = text_format {
            body.insert("text".into(), json!({ "format": format }));
        }
    }

    if let Some(ref metadata) = options.metadata {
        body.insert("metadata".into(), json!(metadata));
    }
    if let Some(ref previous_response_id) = options.previous_response_id {
        body.insert(
            "previous_response_id".into(),
            previous_response_id.clone().into(),
        );
    }

    Value::Object(body)
}

fn build_input_items(messages: &[ModelMessage]) -> Vec<Value> {
    let mut input = Vec::new();
    for msg in messages {
        let mut content_parts = Vec::new();
        let mut tool_calls = Vec::new();
        for part in &msg.content {
            match part {
                ContentPart::Text { text } => {
                    content_parts.push(json!({"type": "input_text", "text": text}));
                }
                ContentPart::Image(img) => {
                    content_parts.push(json!({
                        "type": "input_image",
                        "image_url": image_data_url(img),
                    }));
                }
                ContentPart::ToolCall(tc) => tool_calls.push(tc),
                ContentPart::ToolResult(_) | ContentPart::Reasoning { .. } => {}
            }
        }
        match msg.role {
            Role::System | Role::User | Role::Assistant => {
                if !content_parts.is_empty() {
                    let content = match content_parts.as_slice() {
                        [only] if only.get("type") == Some(&json!("input_text")) => {
                            only["text"].clone()
                        }
                        _ => Value::Array(content_parts),
                    };
                    input.push(json!({"role": msg.role.as_str(), "content": content}));
                }
                for tc in tool_calls {
                    input.push(json!({
                        "type": "function_call",
                        "call_id": tc.id,
                        "name": tc.name,
                        "arguments": tc.arguments.to_string(),
                    }));
                }
            }
            Role::Tool => {
                for part in &msg.content {
                    if let ContentPart::ToolResult(tr) = part {
                        input.push(json!({
                            "type": "function_call_output",
                            "call_id": tr.tool_call_id,
                            "output": tool_result_to_string(&tr.result),
                        }));
                    }
                }
            }
        }
    }
    input
}

// Wire envelopes

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponsesEvent {
    #[serde(rename = "response.created", alias = "response.in_progress")]
    Started { response: ResponseObject },
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded { output_index: u64, item: Value },
    #[serde(rename = "response.output_item.done")]
    OutputItemDone { output_index: u64, item: Value },
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta { delta: String },
    #[serde(rename = "response.output_text.annotation.added")]
    AnnotationAdded,
    #[serde(rename = "response.function_call_arguments.delta")]
    ArgumentsDelta {
        #[serde(default)]
        output_index: Option<u64>,
        #[serde(default)]
        item_id: Option<String>,
        #[serde(default)]
        call_id: Option<String>,
        delta: String,
    },
    #[serde(rename = "response.function_call_arguments.done")]
    ArgumentsDone {
        #[serde(default)]
        output_index: Option<u64>,
        #[serde(default)]
        item_id: Option<String>,
        #[serde(default)]
        call_id: Option<String>,
        #[serde(default)]
        arguments: Option<String>,
        #[serde(default)]
        name: Option<String>,
    },
    #[serde(
        rename = "response.reasoning_summary_text.delta",
        alias = "response.reasoning_text.delta"
    )]
    ReasoningDelta {
        #[serde(default)]
        item_id: Option<String>,
        delta: String,
    },
    #[serde(rename = "response.completed")]
    Completed { response: ResponseObject },
    #[serde(rename = "response.failed")]
    Failed { response: ResponseObject },
    #[serde(rename = "response.incomplete")]
    Incomplete { response: ResponseObject },
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// The fields argument events use to point at their call.
#[derive(Debug, Default)]
struct CallTarget {
    output_index: Option<u64>,
    item_id: Option<String>,
    call_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseObject {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    output: Vec<Value>,
    #[serde(default)]
    usage: Option<Map<String, Value>>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputItem {
    FunctionCall {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        call_id: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        arguments: String,
    },
    Reasoning {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        summary: Vec<Value>,
    },
    #[serde(other)]
    Other,
}

/// Decoder for `response.*` event streams.
///
/// Tool calls are keyed by the output index announced in
/// `response.output_item.added`. When the live stream ends, the output list
/// of the terminal response is re-scanned for calls and reasoning the live
/// events never delivered.
#[derive(Debug, Default)]
pub struct ResponsesDecoder {
    tools: ToolCallAccumulator,
    reasoning: ReasoningAccumulator,
    finalizer: Finalizer,
    /// Item id to output index, for argument events without an index.
    item_indices: HashMap<String, u64>,
    final_response: Option<ResponseObject>,
}

impl ResponsesDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn call_key(&self, target: &CallTarget) -> CallKey {
        if let Some(index) = target.output_index {
            return CallKey::Index(index);
        }
        if let Some(index) = target
            .item_id
            .as_ref()
            .and_then(|id| self.item_indices.get(id))
        {
            return CallKey::Index(*index);
        }
        let id = target.call_id.as_ref().or(target.item_id.as_ref());
        if let Some(key) = id.and_then(|id| self.tools.find_by_id(id)) {
            return key;
        }
        CallKey::Id(id.cloned().unwrap_or_default())
    }

    fn item_added(&mut self, output_index: u64, item: Value) {
        let Ok(OutputItem::FunctionCall {
            id,
            call_id,
            name,
            arguments,
        }) = serde_json::from_value::<OutputItem>(item)
        else {
            return;
        };
        if self.already_emitted(id.as_deref(), call_id.as_deref()) {
            return;
        }
        if let Some(ref item_id) = id {
            self.item_indices.insert(item_id.clone(), output_index);
        }
        let state = self.tools.begin(CallKey::Index(output_index));
        state.id = call_id.or(id);
        state.name = name;
        state.arguments.push_str(&arguments);
    }

    fn item_done(&mut self, output_index: u64, item: Value, out: &mut Vec<StreamEvent>) {
        let parsed = match serde_json::from_value::<OutputItem>(item.clone()) {
            Ok(parsed) => parsed,
            Err(err) => {
                malformed_frame(Backend::OpenAiResponses, &item.to_string(), err, out);
                return;
            }
        };
        match parsed {
            OutputItem::FunctionCall {
                id,
                call_id,
                name,
                arguments,
            } => {
                let key = CallKey::Index(output_index);
                self.complete_call(key, id, call_id, name, arguments, out);
            }
            OutputItem::Reasoning { id, summary } => {
                let key = id.clone().or_else(|| Some(output_index.to_string()));
                self.finish_reasoning(key, &summary, item, out);
            }
            OutputItem::Other => {}
        }
    }

    /// Whether a call known by either identifier already went out.
    fn already_emitted(&self, item_id: Option<&str>, call_id: Option<&str>) -> bool {
        [item_id, call_id]
            .into_iter()
            .flatten()
            .any(|id| self.tools.was_emitted(id))
    }

    /// Complete a call from a finished item, filling in whatever the live
    /// deltas did not deliver. Both the item id and the call id are recorded
    /// as emitted.
    fn complete_call(
        &mut self,
        key: CallKey,
        item_id: Option<String>,
        call_id: Option<String>,
        name: Option<String>,
        arguments: String,
        out: &mut Vec<StreamEvent>,
    ) {
        if self.already_emitted(item_id.as_deref(), call_id.as_deref()) {
            self.tools.discard(&key);
            return;
        }
        let state = self.tools.begin(key.clone());
        if state.id.is_none() || (call_id.is_some() && state.id == item_id) {
            state.id = call_id.clone().or_else(|| item_id.clone());
        }
        if state.name.is_none() {
            state.name = name;
        }
        if !arguments.is_empty() {
            state.arguments = arguments;
        }
        if let Some(call) = self.tools.complete(&key) {
            for id in [item_id, call_id].into_iter().flatten() {
                self.tools.mark_emitted(id);
            }
            out.push(StreamEvent::ToolCall(call));
        }
    }

    fn finish_reasoning(
        &mut self,
        key: Option<String>,
        summary: &[Value],
        item: Value,
        out: &mut Vec<StreamEvent>,
    ) {
        if self.reasoning.is_finalized(&key) {
            return;
        }
        // A summary that never streamed as deltas.
        if !self.reasoning.is_open(&key) {
            for part in summary {
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    out.extend(self.reasoning.push(key.clone(), text));
                }
            }
        }
        let payload = match item {
            Value::Object(fields) => Some(fields),
            _ => None,
        };
        out.extend(self.reasoning.finish(&key, payload));
    }

    fn terminal(&mut self, reason: &str, response: ResponseObject, out: &mut Vec<StreamEvent>) {
        if let Some(ref id) = response.id {
            self.finalizer.set_response_id(id.clone());
        }
        if let Some(ref usage) = response.usage {
            self.finalizer.set_usage(usage.clone());
        }
        self.finalizer.offer_reason(ReasonSource::Live, reason);
        if reason == "failed" {
            let message = response
                .error
                .as_ref()
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("response failed")
                .to_string();
            let code = response
                .error
                .as_ref()
                .and_then(|e| e.get("code"))
                .and_then(Value::as_str)
                .unwrap_or("failed")
                .to_string();
            out.push(StreamEvent::error(
                message.clone(),
                Some(SluiceError::backend(code, message)),
            ));
        }
        self.final_response = Some(response);
    }

    /// Recover calls and reasoning from the complete response object.
    fn rescan(&mut self, out: &mut Vec<StreamEvent>) {
        let Some(response) = self.final_response.take() else {
            return;
        };
        if let Some(status) = response.status {
            self.finalizer.offer_reason(ReasonSource::Rescan, status);
        }
        for (position, item) in response.output.into_iter().enumerate() {
            match serde_json::from_value::<OutputItem>(item.clone()) {
                Ok(OutputItem::FunctionCall {
                    id,
                    call_id,
                    name,
                    arguments,
                }) => {
                    if self.already_emitted(id.as_deref(), call_id.as_deref()) {
                        continue;
                    }
                    let Some(primary) = call_id.clone().or_else(|| id.clone()) else {
                        continue;
                    };
                    debug!(call_id = %primary, "Recovered tool call from final response");
                    let key = [call_id.as_deref(), id.as_deref()]
                        .into_iter()
                        .flatten()
                        .find_map(|known| self.tools.find_by_id(known))
                        .unwrap_or(CallKey::Id(primary));
                    self.complete_call(key, id, call_id, name, arguments, out);
                }
                Ok(OutputItem::Reasoning { id, summary }) => {
                    let key = id.or_else(|| Some(position.to_string()));
                    self.finish_reasoning(key, &summary, item, out);
                }
                Ok(OutputItem::Other) | Err(_) => {}
            }
        }
    }
}

impl StreamDecoder for ResponsesDecoder {
    fn backend(&self) -> Backend {
        Backend::OpenAiResponses
    }

    fn framing(&self) -> Framing {
        Framing::JsonLines
    }

    fn decode(&mut self, payload: &str, out: &mut Vec<StreamEvent>) -> Flow {
        let raw = match serde_json::from_str::<Value>(payload) {
            Ok(raw) => raw,
            Err(err) => {
                malformed_frame(Backend::OpenAiResponses, payload, err, out);
                return Flow::Continue;
            }
        };
        let event = match serde_json::from_value::<ResponsesEvent>(raw.clone()) {
            Ok(event) => event,
            Err(err) => {
                malformed_frame(Backend::OpenAiResponses, payload, err, out);
                return Flow::Continue;
            }
        };

        match event {
            ResponsesEvent::Started { response } => {
                if let Some(id) = response.id {
                    self.finalizer.set_response_id(id);
                }
            }
            ResponsesEvent::OutputItemAdded { output_index, item } => {
                self.item_added(output_index, item);
            }
            ResponsesEvent::OutputItemDone { output_index, item } => {
                self.item_done(output_index, item, out);
            }
            ResponsesEvent::OutputTextDelta { delta } => {
                if !delta.is_empty() {
                    out.push(StreamEvent::delta(delta));
                }
            }
            ResponsesEvent::AnnotationAdded => {
                out.push(StreamEvent::Notification {
                    kind: "annotation".into(),
                    payload: raw,
                });
            }
            ResponsesEvent::ArgumentsDelta {
                output_index,
                item_id,
                call_id,
                delta,
            } => {
                let target = CallTarget {
                    output_index,
                    item_id,
                    call_id,
                };
                let key = self.call_key(&target);
                let state = self.tools.begin(key);
                if state.id.is_none() {
                    state.id = target.call_id;
                }
                state.arguments.push_str(&delta);
            }
            ResponsesEvent::ArgumentsDone {
                output_index,
                item_id,
                call_id,
                arguments,
                name,
            } => {
                let target = CallTarget {
                    output_index,
                    item_id,
                    call_id,
                };
                let key = self.call_key(&target);
                self.complete_call(
                    key,
                    target.item_id,
                    target.call_id,
                    name,
                    arguments.unwrap_or_default(),
                    out,
                );
            }
            ResponsesEvent::ReasoningDelta { item_id, delta } => {
                out.extend(self.reasoning.push(item_id, &delta));
            }
            ResponsesEvent::Completed { response } => {
                self.terminal("completed", response, out);
                return Flow::Finish;
            }
            ResponsesEvent::Failed { response } => {
                self.terminal("failed", response, out);
                return Flow::Finish;
            }
            ResponsesEvent::Incomplete { response } => {
                self.terminal("incomplete", response, out);
                return Flow::Finish;
            }
            ResponsesEvent::Error { code, message } => {
                let message = message.unwrap_or_else(|| "stream error".to_string());
                self.finalizer.offer_reason(ReasonSource::Live, "error");
                out.push(StreamEvent::error(
                    message.clone(),
                    Some(SluiceError::backend(
                        code.unwrap_or_else(|| "error".to_string()),
                        message,
                    )),
                ));
            }
            ResponsesEvent::Unknown => {
                trace!(payload_len = payload.len(), "Ignoring unknown Responses event");
            }
        }
        Flow::Continue
    }

    fn finish(&mut self, out: &mut Vec<StreamEvent>) {
        self.rescan(out);
        self.finalizer
            .finish(&mut self.tools, &mut self.reasoning, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run(payloads: &[Value]) -> Vec<StreamEvent> {
        let mut decoder = ResponsesDecoder::new();
        let mut out = Vec::new();
        for payload in payloads {
            if decoder.decode(&payload.to_string(), &mut out) == Flow::Finish {
                break;
            }
        }
        decoder.finish(&mut out);
        out
    }

    fn tool_calls(events: &[StreamEvent]) -> Vec<&ToolCallEvent> {
        events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::ToolCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn request_body_maps_history_and_options() {
        let options = StreamOptions::builder()
            .backend(Backend::OpenAiResponses)
            .model("gpt-5")
            .messages(vec![
                ModelMessage::user("list files"),
                ModelMessage::assistant_tool_calls(vec![AgentToolCall {
                    id: "call_1".into(),
                    name: "shell".into(),
                    arguments: json!({"command": "ls"}),
                }]),
                ModelMessage::tool_result("call_1", json!("a.txt"), false),
            ])
            .response_format(ResponseFormat::JsonObject)
            .previous_response_id("resp_0")
            .max_tokens(256)
            .build();

        let body = build_request_body(&options);
        assert_eq!(body["input"][0], json!({"role": "user", "content": "list files"}));
        assert_eq!(body["input"][1]["type"], json!("function_call"));
        assert_eq!(body["input"][1]["arguments"], json!("{\"command\":\"ls\"}"));
        assert_eq!(
            body["input"][2],
            json!({"type": "function_call_output", "call_id": "call_1", "output": "a.txt"})
        );
        assert_eq!(body["text"]["format"], json!({"type": "json_object"}));
        assert_eq!(body["previous_response_id"], json!("resp_0"));
        assert_eq!(body["max_output_tokens"], json!(256));
    }

    #[test]
    fn arguments_done_emits_call_once() {
        let events = run(&[
            json!({"type": "response.created", "response": {"id": "resp_1"}}),
            json!({"type": "response.output_item.added", "output_index": 1, "item": {"type": "function_call", "id": "fc_1", "call_id": "call_1", "name": "shell", "arguments": ""}}),
            json!({"type": "response.function_call_arguments.delta", "output_index": 1, "item_id": "fc_1", "delta": "{\"command\":"}),
            json!({"type": "response.function_call_arguments.delta", "item_id": "fc_1", "delta": "\"ls\"}"}),
            json!({"type": "response.function_call_arguments.done", "output_index": 1, "item_id": "fc_1", "arguments": "{\"command\":\"ls\"}"}),
            json!({"type": "response.output_item.done", "output_index": 1, "item": {"type": "function_call", "id": "fc_1", "call_id": "call_1", "name": "shell", "arguments": "{\"command\":\"ls\"}"}}),
            json!({"type": "response.completed", "response": {"id": "resp_1", "status": "completed", "output": [
                {"type": "function_call", "id": "fc_1", "call_id": "call_1", "name": "shell", "arguments": "{\"command\":\"ls\"}"}
            ], "usage": {"input_tokens": 5, "output_tokens": 9, "total_tokens": 14}}}),
        ]);

        let calls = tool_calls(&events);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].arguments, json!({"command": "ls"}));
        let StreamEvent::End(end) = events.last().unwrap() else {
            panic!("expected end");
        };
        assert_eq!(end.reason.as_deref(), Some("completed"));
        assert_eq!(end.response_id.as_deref(), Some("resp_1"));
        assert_eq!(end.token_usage().unwrap().total_tokens, 14);
    }

    #[test]
    fn call_finished_before_its_call_id_is_known_is_emitted_once() {
        let item = json!({
            "type": "function_call",
            "id": "fc_1",
            "call_id": "call_1",
            "name": "shell",
            "arguments": "{\"command\":\"ls\"}"
        });
        let events = run(&[
            json!({"type": "response.function_call_arguments.delta", "item_id": "fc_1", "delta": "{\"command\":"}),
            json!({"type": "response.function_call_arguments.done", "item_id": "fc_1", "name": "shell", "arguments": "{\"command\":\"ls\"}"}),
            json!({"type": "response.output_item.done", "output_index": 0, "item": item}),
            json!({"type": "response.completed", "response": {"status": "completed", "output": [item]}}),
        ]);

        let calls = tool_calls(&events);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "fc_1");
        assert_eq!(calls[0].arguments, json!({"command": "ls"}));
    }

    #[test]
    fn rescan_recovers_calls_missing_from_live_stream() {
        let events = run(&[
            json!({"type": "response.output_text.delta", "delta": "Running."}),
            json!({"type": "response.completed", "response": {"status": "completed", "output": [
                {"type": "message", "content": []},
                {"type": "function_call", "call_id": "call_9", "name": "shell", "arguments": "{\"command\":\"pwd\"}"}
            ]}}),
        ]);

        assert_eq!(events[0], StreamEvent::delta("Running."));
        let calls = tool_calls(&events);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_9");
        assert!(events.last().unwrap().is_end());
    }

    #[test]
    fn reasoning_summary_ends_with_item_metadata() {
        let events = run(&[
            json!({"type": "response.output_item.added", "output_index": 0, "item": {"type": "reasoning", "id": "rs_1"}}),
            json!({"type": "response.reasoning_summary_text.delta", "item_id": "rs_1", "delta": "Compare options"}),
            json!({"type": "response.reasoning_text.delta", "item_id": "rs_1", "delta": " then pick"}),
            json!({"type": "response.output_item.done", "output_index": 0, "item": {"type": "reasoning", "id": "rs_1", "encrypted_content": "gAAA", "summary": []}}),
            json!({"type": "response.completed", "response": {"status": "completed", "output": [
                {"type": "reasoning", "id": "rs_1", "summary": [{"type": "summary_text", "text": "Compare options"}]}
            ]}}),
        ]);

        let ends: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::ReasoningEnd { text, metadata } => Some((text, metadata)),
                _ => None,
            })
            .collect();
        assert_eq!(ends.len(), 1);
        assert_eq!(ends[0].0, "Compare optionsthen pick");
        assert_eq!(ends[0].1["encrypted_content"], json!("gAAA"));
        assert_eq!(ends[0].1["text"], json!("Compare optionsthen pick"));
        assert_eq!(
            events[0],
            StreamEvent::ReasoningDelta {
                text: "Compare options".into(),
                id: Some("rs_1".into())
            }
        );
    }

    #[test]
    fn failed_response_reports_error_and_ends() {
        let events = run(&[json!({"type": "response.failed", "response": {
            "id": "resp_2", "status": "failed",
            "error": {"code": "server_error", "message": "The model crashed"}
        }})]);

        assert_eq!(events.len(), 2);
        let StreamEvent::Error { message, .. } = &events[0] else {
            panic!("expected error, got {events:?}");
        };
        assert_eq!(message, "The model crashed");
        let StreamEvent::End(end) = &events[1] else {
            panic!("expected end");
        };
        assert_eq!(end.reason.as_deref(), Some("failed"));
    }

    #[test]
    fn incomplete_live_reason_beats_rescanned_status() {
        let events = run(&[json!({"type": "response.incomplete", "response": {
            "status": "in_progress", "output": []
        }})]);
        let StreamEvent::End(end) = &events[0] else {
            panic!("expected end");
        };
        assert_eq!(end.reason.as_deref(), Some("incomplete"));
    }

    #[test]
    fn annotations_and_unknown_events() {
        let events = run(&[
            json!({"type": "response.output_text.annotation.added", "annotation": {"type": "url_citation"}}),
            json!({"type": "response.web_search_call.searching", "item_id": "ws_1"}),
            json!({"type": "error", "code": "rate_limit_exceeded", "message": "slow down"}),
        ]);
        assert!(matches!(
            &events[0],
            StreamEvent::Notification { kind, payload } if kind == "annotation" && payload["annotation"]["type"] == "url_citation"
        ));
        assert!(matches!(&events[1], StreamEvent::Error { message, .. } if message == "slow down"));
        let StreamEvent::End(end) = &events[2] else {
            panic!("expected end");
        };
        assert_eq!(end.reason.as_deref(), Some("error"));
    }
}
