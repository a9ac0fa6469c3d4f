//! Folding an event stream into a transcript entry.

use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::types::{StreamEvent, ToolCallEvent, Usage};

/// A finished reasoning block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReasoningBlock {
    pub text: String,
    pub metadata: Map<String, Value>,
}

/// Everything one stream produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamTextResult {
    pub text: String,
    pub reasoning: Vec<ReasoningBlock>,
    pub tool_calls: Vec<ToolCallEvent>,
    pub notifications: Vec<(String, Value)>,
    /// Messages of every `Error` event, in order.
    pub errors: Vec<String>,
    pub end_reason: Option<String>,
    pub usage: Option<Usage>,
    pub response_id: Option<String>,
    /// Whether the stream ended with an `End` rather than an error.
    pub completed: bool,
}

impl StreamTextResult {
    /// Drain `stream` to completion.
    pub async fn collect<S>(stream: S) -> Self
    where
        S: Stream<Item = StreamEvent>,
    {
        let mut result = Self::default();
        futures::pin_mut!(stream);
        while let Some(event) = stream.next().await {
            result.apply(event);
        }
        result
    }

    /// Fold one event into the result.
    pub fn apply(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Delta { text } => self.text.push_str(&text),
            StreamEvent::ToolCall(call) => self.tool_calls.push(call),
            StreamEvent::ReasoningDelta { .. } => {}
            StreamEvent::ReasoningEnd { text, metadata } => {
                self.reasoning.push(ReasoningBlock { text, metadata })
            }
            StreamEvent::Notification { kind, payload } => self.notifications.push((kind, payload)),
            StreamEvent::Error { message, .. } => self.errors.push(message),
            StreamEvent::End(end) => {
                self.usage = end.token_usage();
                self.end_reason = end.reason;
                self.response_id = end.response_id;
                self.completed = true;
            }
        }
    }

    /// Reasoning text of all blocks, in order, separated by blank lines.
    pub fn reasoning_text(&self) -> String {
        self.reasoning
            .iter()
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
