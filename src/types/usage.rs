//! Token usage types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Token usage for a generation, normalized across backends.
///
/// Backends report usage as an opaque object that the stream passes through
/// untouched; this is the typed view over it.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_creation_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u32>,
}

impl Usage {
    /// Read a backend usage object. Understands the Anthropic/Responses names
    /// (`input_tokens`, `output_tokens`) and the chat-completions names
    /// (`prompt_tokens`, `completion_tokens`).
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let input_tokens = count(map, "input_tokens")
            .or_else(|| count(map, "prompt_tokens"))
            .unwrap_or(0);
        let output_tokens = count(map, "output_tokens")
            .or_else(|| count(map, "completion_tokens"))
            .unwrap_or(0);
        let total_tokens = count(map, "total_tokens").unwrap_or(input_tokens + output_tokens);

        let cache_read_tokens = count(map, "cache_read_input_tokens")
            .or_else(|| nested_count(map, "input_tokens_details", "cached_tokens"))
            .or_else(|| nested_count(map, "prompt_tokens_details", "cached_tokens"));
        let reasoning_tokens = nested_count(map, "output_tokens_details", "reasoning_tokens")
            .or_else(|| nested_count(map, "completion_tokens_details", "reasoning_tokens"));

        Self {
            input_tokens,
            output_tokens,
            total_tokens,
            cache_read_tokens,
            cache_creation_tokens: count(map, "cache_creation_input_tokens"),
            reasoning_tokens,
        }
    }

    /// Merge another usage into this one (accumulate).
    pub fn merge(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
        if let Some(v) = other.cache_read_tokens {
            *self.cache_read_tokens.get_or_insert(0) += v;
        }
        if let Some(v) = other.cache_creation_tokens {
            *self.cache_creation_tokens.get_or_insert(0) += v;
        }
        if let Some(v) = other.reasoning_tokens {
            *self.reasoning_tokens.get_or_insert(0) += v;
        }
    }
}

fn count(map: &Map<String, Value>, key: &str) -> Option<u32> {
    map.get(key)
        .and_then(Value::as_u64)
        .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
}

fn nested_count(map: &Map<String, Value>, outer: &str, key: &str) -> Option<u32> {
    map.get(outer).and_then(Value::as_object).and_then(|m| count(m, key))
}
