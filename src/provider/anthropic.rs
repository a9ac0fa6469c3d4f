//! Anthropic Messages API: request body and block-event stream decoder.

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, trace};

use super::format::tool_result_to_string;
use crate::error::SluiceError;
use crate::stream::{
    malformed_frame, CallKey, Finalizer, Flow, Framing, ReasonSource, ReasoningAccumulator,
    StreamDecoder, ToolCallAccumulator,
};
use crate::types::*;

const DEFAULT_MAX_TOKENS: u32 = 4096;

/// End reason used when a finished tool call ends the stream.
const TOOL_USE_REASON: &str = "tool_use";

/// Build the `/messages` request body.
pub fn build_request_body(options: &StreamOptions) -> Value {
    let mut system_parts = Vec::new();
    let mut messages = Vec::new();

    for msg in &options.messages {
        match msg.role {
            Role::System => system_parts.push(msg.text()),
            Role::User => {
                messages.push(json!({
                    "role": "user",
                    "content": build_anthropic_content(&msg.content),
                }));
            }
            Role::Assistant => {
                let mut content: Vec<Value> = Vec::new();
                for part in &msg.content {
                    match part {
                        // Thinking can only be replayed with its signature.
                        ContentPart::Reasoning {
                            text,
                            signature: Some(signature),
                        } => {
                            content.push(json!({
                                "type": "thinking",
                                "thinking": text,
                                "signature": signature,
                            }));
                        }
                        ContentPart::Text { text } if !text.is_empty() => {
                            content.push(json!({"type": "text", "text": text}));
                        }
                        ContentPart::ToolCall(tc) => {
                            content.push(json!({
                                "type": "tool_use",
                                "id": tc.id,
                                "name": tc.name,
                                "input": tc.arguments,
                            }));
                        }
                        _ => {}
                    }
                }
                if !content.is_empty() {
                    messages.push(json!({"role": "assistant", "content": content}));
                }
            }
            Role::Tool => {
                for part in &msg.content {
                    if let ContentPart::ToolResult(tr) = part {
                        messages.push(json!({
                            "role": "user",
                            "content": [{
                                "type": "tool_result",
                                "tool_use_id": tr.tool_call_id,
                                "content": tool_result_to_string(&tr.result),
                                "is_error": tr.is_error,
                            }],
                        }));
                    }
                }
            }
        }
    }

    let mut body = Map::new();
    body.insert("model".into(), options.model.clone().into());
    body.insert("messages".into(), messages.into());
    body.insert(
        "max_tokens".into(),
        options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS).into(),
    );
    body.insert("stream".into(), true.into());

    if !system_parts.is_empty() {
        body.insert("system".into(), system_parts.join("\n").into());
    }
    if let Some(ref metadata) = options.metadata {
        body.insert("metadata".into(), json!(metadata));
    }
    if let Some(ref tools) = options.tools {
        if !tools.is_empty() {
            let tool_defs: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect();
            body.insert("tools".into(), tool_defs.into());
        }
    }
    if options.response_format.is_some() {
        debug!("Anthropic has no response_format; ignoring");
    }

    Value::Object(body)
}

fn build_anthropic_content(parts: &[ContentPart]) -> Value {
    if let [ContentPart::Text { text }] = parts {
        return Value::String(text.clone());
    }

    let content: Vec<Value> = parts
        .iter()
        .filter_map(|part| match part {
            ContentPart::Text { text } => Some(json!({"type": "text", "text": text})),
            ContentPart::Image(img) if img.data.starts_with("http") => Some(json!({
                "type": "image",
                "source": {"type": "url", "url": img.data},
            })),
            ContentPart::Image(img) => Some(json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": img.mime_type,
                    "data": img.data,
                },
            })),
            _ => None,
        })
        .collect();

    Value::Array(content)
}

// Wire envelopes

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicEvent {
    MessageStart {
        message: MessageStart,
    },
    ContentBlockStart {
        index: u64,
        content_block: Value,
    },
    ContentBlockDelta {
        index: u64,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: u64,
    },
    MessageDelta {
        #[serde(default)]
        delta: MessageDeltaBody,
        #[serde(default)]
        usage: Option<Map<String, Value>>,
    },
    MessageStop,
    Ping,
    Error {
        error: ErrorBody,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct MessageStart {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    usage: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
        #[serde(default)]
        signature: Option<String>,
    },
    RedactedThinking,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    ThinkingDelta { thinking: String },
    SignatureDelta { signature: String },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Default, Deserialize)]
struct MessageDeltaBody {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: String,
}

/// Decoder for `content_block_*` event streams.
///
/// Tool calls and thinking blocks are keyed by their content-block index.
#[derive(Debug, Default)]
pub struct AnthropicDecoder {
    tools: ToolCallAccumulator,
    reasoning: ReasoningAccumulator,
    finalizer: Finalizer,
    /// `message_start` usage overlaid with later `message_delta` counters.
    usage: Map<String, Value>,
}

impl AnthropicDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_usage(&mut self, usage: Option<Map<String, Value>>) {
        if let Some(usage) = usage {
            self.usage.extend(usage);
            self.finalizer.set_usage(self.usage.clone());
        }
    }

    fn block_start(&mut self, index: u64, block: Value, out: &mut Vec<StreamEvent>) {
        let parsed = match serde_json::from_value::<ContentBlock>(block.clone()) {
            Ok(parsed) => parsed,
            Err(err) => {
                malformed_frame(Backend::Anthropic, &block.to_string(), err, out);
                return;
            }
        };
        match parsed {
            ContentBlock::Text { text } => {
                if !text.is_empty() {
                    out.push(StreamEvent::delta(text));
                }
            }
            ContentBlock::ToolUse { id, name } => {
                let state = self.tools.begin(CallKey::Index(index));
                state.id = Some(id);
                state.name = Some(name);
            }
            ContentBlock::Thinking {
                thinking,
                signature,
            } => {
                let key = reasoning_key(index);
                let mut seed = Map::new();
                if let Some(id) = block.get("id").cloned() {
                    seed.insert("id".into(), id);
                }
                self.reasoning.begin(key.clone(), seed);
                if let Some(event) = self.reasoning.push(key.clone(), &thinking) {
                    out.push(event);
                }
                if let Some(signature) = signature.filter(|s| !s.is_empty()) {
                    self.reasoning.append_metadata(key, "signature", &signature);
                }
            }
            ContentBlock::RedactedThinking => {
                out.push(StreamEvent::Notification {
                    kind: "redacted_thinking".into(),
                    payload: block,
                });
            }
            ContentBlock::Unknown => {
                trace!(index, "Ignoring unknown content block");
            }
        }
    }

    fn block_delta(&mut self, index: u64, delta: BlockDelta, out: &mut Vec<StreamEvent>) {
        match delta {
            BlockDelta::TextDelta { text } => {
                if !text.is_empty() {
                    out.push(StreamEvent::delta(text));
                }
            }
            BlockDelta::InputJsonDelta { partial_json } => {
                self.tools.append(CallKey::Index(index), &partial_json);
            }
            BlockDelta::ThinkingDelta { thinking } => {
                if let Some(event) = self.reasoning.push(reasoning_key(index), &thinking) {
                    out.push(event);
                }
            }
            BlockDelta::SignatureDelta { signature } => {
                self.reasoning
                    .append_metadata(reasoning_key(index), "signature", &signature);
            }
            BlockDelta::Unknown => {}
        }
    }

    fn block_stop(&mut self, index: u64, out: &mut Vec<StreamEvent>) -> Flow {
        let key = CallKey::Index(index);
        if self.tools.get(&key).is_some() {
            if let Some(call) = self.tools.complete(&key) {
                out.push(StreamEvent::ToolCall(call));
            }
            if self.tools.is_empty() {
                debug!(index, "Last pending tool call complete; ending stream");
                self.finalizer
                    .offer_reason(ReasonSource::Live, TOOL_USE_REASON);
                return Flow::Finish;
            }
            return Flow::Continue;
        }
        if let Some(event) = self.reasoning.finish(&reasoning_key(index), None) {
            out.push(event);
        }
        Flow::Continue
    }
}

fn reasoning_key(index: u64) -> Option<String> {
    Some(index.to_string())
}

impl StreamDecoder for AnthropicDecoder {
    fn backend(&self) -> Backend {
        Backend::Anthropic
    }

    fn framing(&self) -> Framing {
        Framing::Blocks
    }

    fn decode(&mut self, payload: &str, out: &mut Vec<StreamEvent>) -> Flow {
        let event = match serde_json::from_str::<AnthropicEvent>(payload) {
            Ok(event) => event,
            Err(err) => {
                malformed_frame(Backend::Anthropic, payload, err, out);
                return Flow::Continue;
            }
        };

        match event {
            AnthropicEvent::MessageStart { message } => {
                if let Some(id) = message.id {
                    self.finalizer.set_response_id(id);
                }
                self.record_usage(message.usage);
                Flow::Continue
            }
            AnthropicEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                self.block_start(index, content_block, out);
                Flow::Continue
            }
            AnthropicEvent::ContentBlockDelta { index, delta } => {
                self.block_delta(index, delta, out);
                Flow::Continue
            }
            AnthropicEvent::ContentBlockStop { index } => self.block_stop(index, out),
            AnthropicEvent::MessageDelta { delta, usage } => {
                self.record_usage(usage);
                match delta.stop_reason {
                    Some(reason) => {
                        self.finalizer.offer_reason(ReasonSource::Live, reason);
                        Flow::Finish
                    }
                    None => Flow::Continue,
                }
            }
            AnthropicEvent::MessageStop => Flow::Finish,
            AnthropicEvent::Ping => Flow::Continue,
            AnthropicEvent::Error { error } => {
                self.finalizer.offer_reason(ReasonSource::Live, "error");
                out.push(StreamEvent::error(
                    error.message.clone(),
                    Some(SluiceError::backend(error.kind, error.message)),
                ));
                Flow::Continue
            }
            AnthropicEvent::Unknown => {
                trace!("Ignoring unknown Anthropic event");
                Flow::Continue
            }
        }
    }

    fn finish(&mut self, out: &mut Vec<StreamEvent>) {
        self.finalizer
            .finish(&mut self.tools, &mut self.reasoning, out);
    }
}
