//! Fragment accumulation for a single turn.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use super::reconciler::{ToolCallPreview, ToolCallReconciler};
use crate::types::{Fragment, ToolCall, Usage};

/// Non-authoritative snapshot of a turn in progress, for UI consumers.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StreamingPreview {
    pub text: String,
    pub reasoning: String,
    pub tool_calls: Vec<ToolCallPreview>,
}

/// Everything a finished stream produced, ready to become a message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccumulatedDraft {
    pub text: String,
    pub reasoning: String,
    pub reasoning_duration: Option<Duration>,
    pub usage: Option<Usage>,
    pub tool_calls: Vec<ToolCall>,
}

/// Folds an ordered sequence of fragments into running totals.
#[derive(Debug, Default)]
pub struct FragmentAccumulator {
    text: String,
    reasoning: String,
    usage: Option<Usage>,
    reasoning_started_at: Option<Instant>,
    reasoning_duration: Option<Duration>,
    tool_calls: ToolCallReconciler,
    fragments: usize,
}

impl FragmentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingest(&mut self, fragment: &Fragment) {
        self.ingest_at(fragment, Instant::now());
    }

    /// Fold one fragment, using `now` as the arrival time.
    pub fn ingest_at(&mut self, fragment: &Fragment, now: Instant) {
        self.fragments += 1;

        if let Some(reasoning) = non_empty(&fragment.reasoning_text) {
            if self.reasoning_started_at.is_none() {
                self.reasoning_started_at = Some(now);
            }
            self.reasoning.push_str(reasoning);
        }

        if let Some(text) = non_empty(&fragment.text) {
            if let (Some(started), None) = (self.reasoning_started_at, self.reasoning_duration) {
                self.reasoning_duration = Some(now.saturating_duration_since(started));
            }
            self.text.push_str(text);
        }

        if let Some(usage) = &fragment.usage {
            self.usage = Some(usage.clone());
        }

        for delta in &fragment.tool_call_deltas {
            self.tool_calls.ingest(delta);
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    pub fn usage(&self) -> Option<&Usage> {
        self.usage.as_ref()
    }

    pub fn reasoning_duration(&self) -> Option<Duration> {
        self.reasoning_duration
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments
    }

    /// Whether any visible text or reasoning has arrived.
    pub fn has_content(&self) -> bool {
        !self.text.is_empty() || !self.reasoning.is_empty()
    }

    /// Whether finishing now would yield at least one invoked tool call.
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.invoked_count() > 0
    }

    pub fn preview(&self) -> StreamingPreview {
        StreamingPreview {
            text: self.text.clone(),
            reasoning: self.reasoning.clone(),
            tool_calls: self.tool_calls.preview(),
        }
    }

    pub fn finish(self) -> AccumulatedDraft {
        AccumulatedDraft {
            text: self.text,
            reasoning: self.reasoning,
            reasoning_duration: self.reasoning_duration,
            usage: self.usage,
            tool_calls: self.tool_calls.freeze(),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}
