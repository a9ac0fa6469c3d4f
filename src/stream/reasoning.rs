//! Reasoning block accumulation.

use std::collections::{BTreeMap, HashSet};

use serde_json::{Map, Value};
use tracing::debug;

use crate::types::StreamEvent;

/// Key of a reasoning block. `None` is the single default block used when
/// the backend gives reasoning no identity.
pub type ReasoningKey = Option<String>;

#[derive(Debug, Clone, Default)]
pub struct ReasoningState {
    pub segments: Vec<String>,
    pub metadata: Map<String, Value>,
}

impl ReasoningState {
    pub fn text(&self) -> String {
        self.segments.concat()
    }
}

/// Collects reasoning segments per key and emits one `ReasoningEnd` per key.
#[derive(Debug, Default)]
pub struct ReasoningAccumulator {
    states: BTreeMap<ReasoningKey, ReasoningState>,
    finalized: HashSet<ReasoningKey>,
}

impl ReasoningAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a block and seed its metadata. Existing entries are kept.
    pub fn begin(&mut self, key: ReasoningKey, seed: Map<String, Value>) {
        let state = self.states.entry(key).or_default();
        for (field, value) in seed {
            state.metadata.entry(field).or_insert(value);
        }
    }

    /// Add one segment. Returns the matching `ReasoningDelta`, or `None` when
    /// the segment is blank or the block already ended.
    pub fn push(&mut self, key: ReasoningKey, segment: &str) -> Option<StreamEvent> {
        let text = segment.trim();
        if text.is_empty() {
            return None;
        }
        if self.finalized.contains(&key) {
            debug!(key = ?key, "Ignoring reasoning for a finished block");
            return None;
        }
        self.states
            .entry(key.clone())
            .or_default()
            .segments
            .push(text.to_string());
        Some(StreamEvent::ReasoningDelta {
            text: text.to_string(),
            id: key,
        })
    }

    /// Append to a string metadata field, such as a streamed signature.
    pub fn append_metadata(&mut self, key: ReasoningKey, field: &str, fragment: &str) {
        let state = self.states.entry(key).or_default();
        match state.metadata.get_mut(field) {
            Some(Value::String(existing)) => existing.push_str(fragment),
            _ => {
                state
                    .metadata
                    .insert(field.to_string(), Value::String(fragment.to_string()));
            }
        }
    }

    /// End the block under `key`. `payload` fields are merged into the
    /// metadata, except `text`, which is always the accumulated text.
    pub fn finish(&mut self, key: &ReasoningKey, payload: Option<Map<String, Value>>) -> Option<StreamEvent> {
        if self.finalized.contains(key) {
            return None;
        }
        let state = self.states.remove(key)?;
        let text = state.text();
        if text.is_empty() {
            return None;
        }
        self.finalized.insert(key.clone());

        let mut metadata = state.metadata;
        if let Some(payload) = payload {
            for (field, value) in payload {
                metadata.insert(field, value);
            }
        }
        metadata.insert("text".to_string(), Value::String(text.clone()));
        Some(StreamEvent::ReasoningEnd { text, metadata })
    }

    /// End every open block in key order.
    pub fn flush_all(&mut self) -> Vec<StreamEvent> {
        let keys: Vec<ReasoningKey> = self.states.keys().cloned().collect();
        keys.iter().filter_map(|key| self.finish(key, None)).collect()
    }

    pub fn is_finalized(&self, key: &ReasoningKey) -> bool {
        self.finalized.contains(key)
    }

    pub fn is_open(&self, key: &ReasoningKey) -> bool {
        self.states.contains_key(key)
    }
}
