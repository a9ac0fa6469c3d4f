//! Tool-call argument accumulation.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde_json::Value;
use tracing::{debug, warn};

use crate::types::ToolCallEvent;

/// Backend-specific correlation key for a call still being streamed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CallKey {
    /// Positional index (content-block index, output index, array index).
    Index(u64),
    /// Call or item identifier.
    Id(String),
}

impl fmt::Display for CallKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallKey::Index(index) => write!(f, "{index}"),
            CallKey::Id(id) => f.write_str(id),
        }
    }
}

/// A call whose arguments are still arriving.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallState {
    pub arguments: String,
    pub id: Option<String>,
    pub name: Option<String>,
}

/// Assembles fragmented tool calls. One per stream.
///
/// Completion parses the argument text once and records the call id, so a
/// call is emitted at most once however many paths try to complete it.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    states: BTreeMap<CallKey, ToolCallState>,
    emitted: HashSet<String>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the state for `key`.
    pub fn begin(&mut self, key: CallKey) -> &mut ToolCallState {
        self.states.entry(key).or_default()
    }

    pub fn get(&self, key: &CallKey) -> Option<&ToolCallState> {
        self.states.get(key)
    }

    pub fn append(&mut self, key: CallKey, fragment: &str) {
        self.begin(key).arguments.push_str(fragment);
    }

    /// Find the open call that carries `id`, either as its key or its call id.
    pub fn find_by_id(&self, id: &str) -> Option<CallKey> {
        let key = CallKey::Id(id.to_string());
        if self.states.contains_key(&key) {
            return Some(key);
        }
        self.states
            .iter()
            .find(|(_, state)| state.id.as_deref() == Some(id))
            .map(|(key, _)| key.clone())
    }

    /// Finish the call under `key`.
    ///
    /// Returns `None` when there is no such state, when its id was already
    /// emitted, or when no name was ever seen. The state is removed in every
    /// case.
    pub fn complete(&mut self, key: &CallKey) -> Option<ToolCallEvent> {
        let state = self.states.remove(key)?;
        let id = state
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| key.to_string());

        if self.emitted.contains(&id) {
            debug!(call_id = %id, "Suppressing duplicate tool call");
            return None;
        }
        let Some(name) = state.name.filter(|name| !name.is_empty()) else {
            warn!(call_id = %id, "Dropping tool call without a name");
            return None;
        };

        self.emitted.insert(id.clone());
        Some(ToolCallEvent {
            id,
            name,
            arguments: parse_arguments(&state.arguments),
            raw_arguments: state.arguments,
        })
    }

    pub fn discard(&mut self, key: &CallKey) -> Option<ToolCallState> {
        self.states.remove(key)
    }

    /// Complete every open call in key order.
    pub fn drain(&mut self) -> Vec<ToolCallEvent> {
        let keys: Vec<CallKey> = self.states.keys().cloned().collect();
        keys.iter().filter_map(|key| self.complete(key)).collect()
    }

    pub fn mark_emitted(&mut self, id: impl Into<String>) {
        self.emitted.insert(id.into());
    }

    pub fn was_emitted(&self, id: &str) -> bool {
        self.emitted.contains(id)
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.states.len()
    }
}

/// Parse accumulated argument text.
///
/// Blank text is an empty object; text that is not JSON is wrapped as
/// `{"raw": text}` rather than failing the call.
pub fn parse_arguments(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(text).unwrap_or_else(|_| serde_json::json!({ "raw": text }))
}
