//! Chat completions (OpenAI and compatible servers): request body and
//! delta-array stream decoder.

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, trace};

use super::format::{image_data_url, tool_result_to_string};
use crate::config::DecoderConfig;
use crate::error::SluiceError;
use crate::stream::{
    malformed_frame, CallKey, Finalizer, Flow, Framing, InlineSegment, InlineTagExtractor,
    ReasonSource, ReasoningAccumulator, StreamDecoder, ToolCallAccumulator,
};
use crate::types::*;

/// Build the `/chat/completions` request body.
pub fn build_request_body(options: &StreamOptions) -> Value {
    let messages: Vec<Value> = options.messages.iter().flat_map(message_to_chat).collect();

    let mut body = Map::new();
    body.insert("model".into(), options.model.clone().into());
    body.insert("messages".into(), messages.into());
    body.insert("stream".into(), true.into());

    if let Some(max) = options.max_tokens {
        body.insert("max_tokens".into(), max.into());
    }

    if let Some(ref tools) = options.tools {
        if !tools.is_empty() {
            let tool_defs: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body.insert("tools".into(), tool_defs.into());
        }
    }

    match options.response_format {
        Some(ResponseFormat::JsonObject) => {
            body.insert("response_format".into(), json!({"type": "json_object"}));
        }
        Some(ResponseFormat::JsonSchema {
            ref schema,
            ref name,
        }) => {
            body.insert(
                "response_format".into(),
                json!({
                    "type": "json_schema",
                    "json_schema": {
                        "name": name,
                        "schema": schema,
                        "strict": true,
                    }
                }),
            );
        }
        Some(ResponseFormat::Text) | None => {}
    }

    if let Some(ref metadata) = options.metadata {
        body.insert("metadata".into(), json!(metadata));
    }
    if options.previous_response_id.is_some() {
        debug!("Chat completions has no previous_response_id; ignoring");
    }

    Value::Object(body)
}

fn message_to_chat(msg: &ModelMessage) -> Vec<Value> {
    let role = msg.role.as_str();

    if msg.role == Role::Tool {
        return msg
            .content
            .iter()
            .filter_map(|part| match part {
                ContentPart::ToolResult(tr) => Some(json!({
                    "role": "tool",
                    "tool_call_id": tr.tool_call_id,
                    "content": tool_result_to_string(&tr.result),
                })),
                _ => None,
            })
            .collect();
    }

    let tool_calls = msg.tool_calls();
    if !tool_calls.is_empty() {
        let tc_json: Vec<Value> = tool_calls
            .iter()
            .map(|tc| {
                json!({
                    "id": tc.id,
                    "type": "function",
                    "function": {
                        "name": tc.name,
                        "arguments": tc.arguments.to_string(),
                    }
                })
            })
            .collect();
        let text = msg.text();
        return vec![json!({
            "role": role,
            "content": if text.is_empty() { Value::Null } else { Value::String(text) },
            "tool_calls": tc_json,
        })];
    }

    // Simple single-text message
    if let [ContentPart::Text { text }] = msg.content.as_slice() {
        return vec![json!({"role": role, "content": text})];
    }

    let parts: Vec<Value> = msg
        .content
        .iter()
        .filter_map(|part| match part {
            ContentPart::Text { text } => Some(json!({"type": "text", "text": text})),
            ContentPart::Image(img) => Some(json!({
                "type": "image_url",
                "image_url": {"url": image_data_url(img)},
            })),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        return Vec::new();
    }
    vec![json!({"role": role, "content": parts})]
}

// Wire envelopes

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    choices: Option<Vec<ChatChoice>>,
    #[serde(default)]
    usage: Option<Map<String, Value>>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    delta: Option<ChatDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
    /// Pre-`tool_calls` single function call.
    #[serde(default)]
    function_call: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: Option<u64>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Decoder for chat-completion chunk streams.
///
/// Tool calls are keyed by their position in the `tool_calls` array.
/// Reasoning arrives in `reasoning_content`/`reasoning` or inline in
/// `content` between reasoning tags.
#[derive(Debug)]
pub struct ChatDecoder {
    tools: ToolCallAccumulator,
    reasoning: ReasoningAccumulator,
    finalizer: Finalizer,
    inline: InlineTagExtractor,
}

impl ChatDecoder {
    pub fn new(config: &DecoderConfig) -> Result<Self, SluiceError> {
        Ok(Self {
            tools: ToolCallAccumulator::new(),
            reasoning: ReasoningAccumulator::new(),
            finalizer: Finalizer::new(),
            inline: InlineTagExtractor::new(&config.reasoning_tags)?,
        })
    }

    fn emit_segments(&mut self, segments: Vec<InlineSegment>, out: &mut Vec<StreamEvent>) {
        for segment in segments {
            match segment {
                InlineSegment::Visible(text) => out.push(StreamEvent::delta(text)),
                InlineSegment::Reasoning(text) => out.extend(self.reasoning.push(None, &text)),
            }
        }
    }

    fn apply_function_delta(&mut self, key: CallKey, id: Option<String>, function: Option<FunctionDelta>) {
        let state = self.tools.begin(key);
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            state.id = Some(id);
        }
        if let Some(function) = function {
            if let Some(name) = function.name.filter(|name| !name.is_empty()) {
                if state.name.is_none() {
                    state.name = Some(name);
                }
            }
            if let Some(arguments) = function.arguments {
                state.arguments.push_str(&arguments);
            }
        }
    }

    fn apply_delta(&mut self, delta: ChatDelta, out: &mut Vec<StreamEvent>) {
        for text in [delta.reasoning_content, delta.reasoning].into_iter().flatten() {
            out.extend(self.reasoning.push(None, &text));
        }
        if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
            let segments = self.inline.push(&content);
            self.emit_segments(segments, out);
        }
        for (position, call) in delta.tool_calls.unwrap_or_default().into_iter().enumerate() {
            let key = CallKey::Index(call.index.unwrap_or(position as u64));
            self.apply_function_delta(key, call.id, call.function);
        }
        if let Some(function) = delta.function_call {
            self.apply_function_delta(CallKey::Index(0), None, Some(function));
        }
    }
}

impl StreamDecoder for ChatDecoder {
    fn backend(&self) -> Backend {
        Backend::OpenAiChat
    }

    fn framing(&self) -> Framing {
        Framing::Lines
    }

    fn decode(&mut self, payload: &str, out: &mut Vec<StreamEvent>) -> Flow {
        let chunk = match serde_json::from_str::<ChatChunk>(payload) {
            Ok(chunk) => chunk,
            Err(err) => {
                malformed_frame(Backend::OpenAiChat, payload, err, out);
                return Flow::Continue;
            }
        };

        if let Some(id) = chunk.id.filter(|id| !id.is_empty()) {
            self.finalizer.set_response_id(id);
        }
        if let Some(usage) = chunk.usage {
            self.finalizer.set_usage(usage);
        }
        if let Some(error) = chunk.error {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            let kind = error
                .get("type")
                .or_else(|| error.get("code"))
                .and_then(Value::as_str)
                .unwrap_or("error")
                .to_string();
            out.push(StreamEvent::error(
                message.clone(),
                Some(SluiceError::backend(kind, message)),
            ));
        }

        let mut flow = Flow::Continue;
        for choice in chunk.choices.unwrap_or_default() {
            if let Some(delta) = choice.delta {
                self.apply_delta(delta, out);
            }
            match choice.finish_reason.as_deref() {
                Some(reason @ ("tool_calls" | "function_call")) => {
                    self.finalizer.offer_reason(ReasonSource::Live, reason);
                    out.extend(self.tools.drain().into_iter().map(StreamEvent::ToolCall));
                }
                Some("stop") => {
                    self.finalizer.offer_reason(ReasonSource::Live, "stop");
                    flow = Flow::Finish;
                }
                Some(reason) => {
                    trace!(reason, "Recording finish reason");
                    self.finalizer.offer_reason(ReasonSource::Live, reason);
                }
                None => {}
            }
        }
        flow
    }

    fn finish(&mut self, out: &mut Vec<StreamEvent>) {
        let segments = self.inline.finish();
        self.emit_segments(segments, out);
        self.finalizer
            .finish(&mut self.tools, &mut self.reasoning, out);
    }
}
