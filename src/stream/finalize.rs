//! End-of-stream bookkeeping.

use serde_json::{Map, Value};
use tracing::debug;

use super::accumulator::ToolCallAccumulator;
use super::reasoning::ReasoningAccumulator;
use crate::types::{EndEvent, StreamEvent};

/// Where an end reason was learned. Higher variants win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReasonSource {
    /// Recovered from the complete response object after the live stream.
    Rescan,
    /// Carried by a live stream event.
    Live,
}

/// Collects the end reason, usage and response id while a stream runs, then
/// produces the single terminal `End`.
#[derive(Debug, Default)]
pub struct Finalizer {
    reason: Option<(ReasonSource, String)>,
    usage: Option<Map<String, Value>>,
    response_id: Option<String>,
    finished: bool,
}

impl Finalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer an end reason. A lower-priority source never replaces a higher
    /// one; the latest offer wins among equals.
    pub fn offer_reason(&mut self, source: ReasonSource, reason: impl Into<String>) {
        let reason = reason.into();
        match &self.reason {
            Some((current, _)) if *current > source => {}
            _ => self.reason = Some((source, reason)),
        }
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_ref().map(|(_, reason)| reason.as_str())
    }

    /// Record the latest usage object reported by the backend.
    pub fn set_usage(&mut self, usage: Map<String, Value>) {
        self.usage = Some(usage);
    }

    pub fn usage(&self) -> Option<&Map<String, Value>> {
        self.usage.as_ref()
    }

    /// Keep the first response id seen.
    pub fn set_response_id(&mut self, id: impl Into<String>) {
        if self.response_id.is_none() {
            self.response_id = Some(id.into());
        }
    }

    pub fn response_id(&self) -> Option<&str> {
        self.response_id.as_deref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Flush open tool calls, then open reasoning, then append the `End`.
    /// Only the first call emits anything.
    pub fn finish(
        &mut self,
        tools: &mut ToolCallAccumulator,
        reasoning: &mut ReasoningAccumulator,
        out: &mut Vec<StreamEvent>,
    ) {
        if self.finished {
            return;
        }
        self.finished = true;

        out.extend(tools.drain().into_iter().map(StreamEvent::ToolCall));
        out.extend(reasoning.flush_all());

        let end = EndEvent {
            reason: self.reason.take().map(|(_, reason)| reason),
            usage: self.usage.take(),
            response_id: self.response_id.take(),
        };
        debug!(reason = ?end.reason, response_id = ?end.response_id, "Stream finished");
        out.push(StreamEvent::End(end));
    }
}
