//! Streaming fragment types.
//!
//! These mirror what an endpoint delivers incrementally. Every field is
//! optional because endpoints routinely omit whatever they have nothing to
//! say about in a given chunk.

use serde::{Deserialize, Serialize};

use super::usage::Usage;

/// One incrementally delivered piece of a streamed model response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Fragment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_call_deltas: Vec<ToolCallDelta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl Fragment {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            reasoning_text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn tool_calls(deltas: Vec<ToolCallDelta>) -> Self {
        Self {
            tool_call_deltas: deltas,
            ..Default::default()
        }
    }

    pub fn usage(usage: Usage) -> Self {
        Self {
            usage: Some(usage),
            ..Default::default()
        }
    }
}

/// Raw tool-call delta as emitted by an endpoint.
///
/// OpenAI-style endpoints repeat `id` on continuations or omit it and rely on
/// `index` alone; both shapes land here unchanged and are sorted out by the
/// reconciler.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolCallDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionDelta>,
}

impl ToolCallDelta {
    /// Delta opening a tool call.
    pub fn start(index: usize, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            index: Some(index),
            id: Some(id.into()),
            function: Some(FunctionDelta {
                name: Some(name.into()),
                arguments: Some(String::new()),
            }),
        }
    }

    /// Index-keyed argument continuation.
    pub fn arguments(index: usize, text: impl Into<String>) -> Self {
        Self {
            index: Some(index),
            id: None,
            function: Some(FunctionDelta {
                name: None,
                arguments: Some(text.into()),
            }),
        }
    }

    /// Identifier-keyed argument continuation.
    pub fn arguments_for_id(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            index: None,
            id: Some(id.into()),
            function: Some(FunctionDelta {
                name: None,
                arguments: Some(text.into()),
            }),
        }
    }

    pub(crate) fn id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.trim().is_empty())
    }

    pub(crate) fn name(&self) -> Option<&str> {
        self.function
            .as_ref()
            .and_then(|f| f.name.as_deref())
            .filter(|name| !name.trim().is_empty())
    }

    pub(crate) fn argument_text(&self) -> &str {
        self.function
            .as_ref()
            .and_then(|f| f.arguments.as_deref())
            .unwrap_or("")
    }
}

/// Function portion of a tool-call delta.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FunctionDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}
