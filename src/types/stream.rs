//! Canonical stream events.

use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use super::message::AgentToolCall;
use super::usage::Usage;
use crate::error::SluiceError;

/// One event of the canonical sequence every backend is decoded into.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental visible text.
    Delta { text: String },
    /// A fully assembled tool call.
    ToolCall(ToolCallEvent),
    /// Incremental reasoning text.
    ReasoningDelta {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    /// A finished reasoning block. `metadata["text"]` always equals `text`.
    ReasoningEnd {
        text: String,
        metadata: Map<String, Value>,
    },
    /// Out-of-band backend signal, passed through untouched.
    Notification { kind: String, payload: Value },
    /// A failure. Terminal only when it ends the stream without an `End`.
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cause: Option<ErrorCause>,
    },
    /// Normal termination.
    End(EndEvent),
}

impl StreamEvent {
    pub fn delta(text: impl Into<String>) -> Self {
        Self::Delta { text: text.into() }
    }

    pub fn error(message: impl Into<String>, cause: Option<SluiceError>) -> Self {
        Self::Error {
            message: message.into(),
            cause: cause.map(ErrorCause::new),
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Self::End(_))
    }
}

/// A tool call reconstructed from streamed fragments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallEvent {
    pub id: String,
    pub name: String,
    /// Parsed arguments, or `{"raw": <text>}` when the text was not JSON.
    pub arguments: Value,
    /// Argument text exactly as the backend streamed it.
    pub raw_arguments: String,
}

impl ToolCallEvent {
    pub fn to_agent_call(&self) -> AgentToolCall {
        AgentToolCall {
            id: self.id.clone(),
            name: self.name.clone(),
            arguments: self.arguments.clone(),
        }
    }
}

/// Terminal event payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EndEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// The last usage object the backend reported, unmodified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
}

impl EndEvent {
    /// Typed view over the reported usage object.
    pub fn token_usage(&self) -> Option<Usage> {
        self.usage.as_ref().map(Usage::from_map)
    }
}

/// Shared handle to the error behind an `Error` event.
///
/// Events are cloned freely by consumers, so the error sits behind an `Arc`.
/// Two causes compare equal when they render the same message.
#[derive(Clone)]
pub struct ErrorCause(Arc<SluiceError>);

impl ErrorCause {
    pub fn new(error: SluiceError) -> Self {
        Self(Arc::new(error))
    }

    pub fn error(&self) -> &SluiceError {
        &self.0
    }
}

impl fmt::Debug for ErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for ErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl PartialEq for ErrorCause {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_string() == other.0.to_string()
    }
}

impl Serialize for ErrorCause {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}
