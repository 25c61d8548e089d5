//! Tool-call reconciliation.
//!
//! Endpoints address tool-call continuations in two ways: by repeating the
//! call id, or by sending id-less deltas keyed only by position. Both are
//! folded into an append-only list of slots here.

use serde::Serialize;
use uuid::Uuid;

use crate::types::{ToolCall, ToolCallDelta};

/// Highest slot count an explicit delta index may address.
pub const MAX_TOOL_CALL_SLOTS: usize = 128;

/// A raw delta resolved against the current slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCallUpdate {
    /// Establishes a tool call at `slot`, replacing whatever placeholder was there.
    NewToolCall {
        slot: usize,
        id: String,
        name: String,
        arguments: String,
    },
    /// Appends argument text to the call at `slot`.
    ArgumentContinuation { slot: usize, text: String },
}

impl ToolCallUpdate {
    pub fn slot(&self) -> usize {
        match self {
            Self::NewToolCall { slot, .. } | Self::ArgumentContinuation { slot, .. } => *slot,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct ToolCallSlot {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// In-progress view of one slot, for UI previews.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolCallPreview {
    pub slot: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: String,
}

/// Working list of tool calls for one turn.
#[derive(Debug, Clone, Default)]
pub struct ToolCallReconciler {
    slots: Vec<ToolCallSlot>,
}

impl ToolCallReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve and apply one delta.
    pub fn ingest(&mut self, delta: &ToolCallDelta) -> ToolCallUpdate {
        let update = self.classify(delta);
        self.apply(&update);
        if let ToolCallUpdate::ArgumentContinuation { slot, .. } = update {
            // placeholders adopt whatever identity shows up later
            let entry = &mut self.slots[slot];
            if entry.id.is_none() {
                entry.id = delta.id().map(str::to_string);
            }
            if entry.name.is_none() {
                entry.name = delta.name().map(str::to_string);
            }
        }
        update
    }

    /// Classify a delta without mutating any slot.
    ///
    /// Slot precedence: explicit index, then id match, then a fresh slot at
    /// the end. A delta carrying both id and name opens a new call unless its
    /// slot already holds that same id, in which case it is a continuation.
    pub fn classify(&self, delta: &ToolCallDelta) -> ToolCallUpdate {
        let slot = self.resolve_slot(delta);
        let text = delta.argument_text().to_string();
        match (delta.id(), delta.name()) {
            (Some(id), Some(name)) if !self.slot_holds(slot, id) => ToolCallUpdate::NewToolCall {
                slot,
                id: id.to_string(),
                name: name.to_string(),
                arguments: text,
            },
            _ => ToolCallUpdate::ArgumentContinuation { slot, text },
        }
    }

    fn resolve_slot(&self, delta: &ToolCallDelta) -> usize {
        if let Some(index) = delta.index {
            if index < MAX_TOOL_CALL_SLOTS {
                return index;
            }
            tracing::warn!(index, "tool call index out of range, ignoring it");
        }
        if let Some(id) = delta.id() {
            if let Some(pos) = self
                .slots
                .iter()
                .position(|slot| slot.id.as_deref() == Some(id))
            {
                return pos;
            }
        }
        self.slots.len()
    }

    fn slot_holds(&self, slot: usize, id: &str) -> bool {
        self.slots
            .get(slot)
            .is_some_and(|entry| entry.id.as_deref() == Some(id))
    }

    fn ensure_slot(&mut self, slot: usize) -> &mut ToolCallSlot {
        if self.slots.len() <= slot {
            self.slots.resize_with(slot + 1, ToolCallSlot::default);
        }
        &mut self.slots[slot]
    }

    fn apply(&mut self, update: &ToolCallUpdate) {
        match update {
            ToolCallUpdate::NewToolCall {
                slot,
                id,
                name,
                arguments,
            } => {
                *self.ensure_slot(*slot) = ToolCallSlot {
                    id: Some(id.clone()),
                    name: Some(name.clone()),
                    arguments: arguments.clone(),
                };
            }
            ToolCallUpdate::ArgumentContinuation { slot, text } => {
                self.ensure_slot(*slot).arguments.push_str(text);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn preview(&self) -> Vec<ToolCallPreview> {
        self.slots
            .iter()
            .enumerate()
            .map(|(slot, entry)| ToolCallPreview {
                slot,
                id: entry.id.clone(),
                name: entry.name.clone(),
                arguments: entry.arguments.clone(),
            })
            .collect()
    }

    /// Number of slots that would survive [`freeze`](Self::freeze).
    pub fn invoked_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.name.is_some() && !slot.arguments.trim().is_empty())
            .count()
    }

    /// Freeze the slots into tool calls, in slot order.
    ///
    /// Slots with blank arguments were never actually invoked and are
    /// dropped, as are slots that never received a function name.
    pub fn freeze(self) -> Vec<ToolCall> {
        self.slots
            .into_iter()
            .enumerate()
            .filter_map(|(slot, entry)| {
                if entry.arguments.trim().is_empty() {
                    tracing::debug!(slot, id = ?entry.id, "dropping tool call with empty arguments");
                    return None;
                }
                let Some(name) = entry.name else {
                    tracing::warn!(slot, id = ?entry.id, "dropping tool call without a function name");
                    return None;
                };
                let id = entry
                    .id
                    .unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple()));
                Some(ToolCall {
                    id,
                    name,
                    arguments: entry.arguments,
                })
            })
            .collect()
    }
}
