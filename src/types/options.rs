//! Per-stream request options.

use bon::Builder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum::{Display, EnumString};

use super::message::ModelMessage;

/// The wire protocol a stream speaks.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString,
)]
pub enum Backend {
    /// Anthropic Messages API: `content_block_*` events in SSE blocks.
    #[serde(rename = "anthropic")]
    #[strum(to_string = "anthropic")]
    Anthropic,
    /// OpenAI Responses API: `response.*` output-item events.
    #[serde(rename = "openai-responses")]
    #[strum(to_string = "openai-responses", serialize = "responses")]
    OpenAiResponses,
    /// Chat Completions API and its many compatible servers.
    #[serde(rename = "openai-chat")]
    #[strum(to_string = "openai-chat", serialize = "openai-compatible", serialize = "chat")]
    OpenAiChat,
}

impl Backend {
    pub const ALL: [Backend; 3] = [Backend::Anthropic, Backend::OpenAiResponses, Backend::OpenAiChat];

    /// Path appended to the base URL when opening a stream.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Backend::Anthropic => "/messages",
            Backend::OpenAiResponses => "/responses",
            Backend::OpenAiChat => "/chat/completions",
        }
    }
}

/// Options for one streaming request. Never mutated once the stream starts.
///
/// ```
/// use sluice::types::{Backend, ModelMessage, StreamOptions};
///
/// let options = StreamOptions::builder()
///     .backend(Backend::OpenAiChat)
///     .model("deepseek-reasoner")
///     .messages(vec![ModelMessage::user("hello")])
///     .build();
/// assert!(options.tools.is_none());
/// ```
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
pub struct StreamOptions {
    pub backend: Backend,
    #[builder(into)]
    pub model: String,
    #[builder(default)]
    pub messages: Vec<ModelMessage>,
    pub tools: Option<Vec<ToolDefinition>>,
    pub response_format: Option<ResponseFormat>,
    pub metadata: Option<HashMap<String, String>>,
    #[builder(into)]
    pub previous_response_id: Option<String>,
    pub max_tokens: Option<u32>,
}

/// Tool schema sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Requested response format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    Text,
    JsonObject,
    JsonSchema {
        schema: serde_json::Value,
        name: String,
    },
}
