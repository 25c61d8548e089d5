//! Conversation message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use super::usage::Usage;

/// A message in a session's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: MessageKind,
}

/// Message body, tagged by role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum MessageKind {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant(AssistantMessage),
    ToolResult {
        content: String,
        tool_call_id: String,
        tool_name: String,
    },
}

/// Conversation role, used for filtering and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    ToolResult,
}

impl Message {
    fn with_kind(kind: MessageKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind,
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_kind(MessageKind::System {
            content: content.into(),
        })
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_kind(MessageKind::User {
            content: content.into(),
        })
    }

    /// Create an assistant message.
    pub fn assistant(message: AssistantMessage) -> Self {
        Self::with_kind(MessageKind::Assistant(message))
    }

    /// Create a tool result message.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::with_kind(MessageKind::ToolResult {
            content: content.into(),
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
        })
    }

    pub fn role(&self) -> Role {
        match self.kind {
            MessageKind::System { .. } => Role::System,
            MessageKind::User { .. } => Role::User,
            MessageKind::Assistant(_) => Role::Assistant,
            MessageKind::ToolResult { .. } => Role::ToolResult,
        }
    }

    /// Text content regardless of role.
    pub fn content(&self) -> &str {
        match &self.kind {
            MessageKind::System { content }
            | MessageKind::User { content }
            | MessageKind::ToolResult { content, .. } => content,
            MessageKind::Assistant(msg) => &msg.content,
        }
    }

    pub fn as_assistant(&self) -> Option<&AssistantMessage> {
        match &self.kind {
            MessageKind::Assistant(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn as_assistant_mut(&mut self) -> Option<&mut AssistantMessage> {
        match &mut self.kind {
            MessageKind::Assistant(msg) => Some(msg),
            _ => None,
        }
    }

    /// Tool call id referenced by a tool-result message.
    pub fn tool_result_call_id(&self) -> Option<&str> {
        match &self.kind {
            MessageKind::ToolResult { tool_call_id, .. } => Some(tool_call_id),
            _ => None,
        }
    }
}

/// An assistant reply as committed at the end of a turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub executions: Vec<ToolCallExecution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when the turn was cancelled mid-stream.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub incomplete: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl AssistantMessage {
    /// Executions still waiting on an outcome.
    pub fn pending_executions(&self) -> impl Iterator<Item = &ToolCallExecution> {
        self.executions
            .iter()
            .filter(|e| e.status == ExecutionStatus::Pending)
    }

    pub fn has_pending_executions(&self) -> bool {
        self.pending_executions().next().is_some()
    }

    pub fn execution_for(&self, tool_call_id: &str) -> Option<&ToolCallExecution> {
        self.executions
            .iter()
            .find(|e| e.tool_call_id == tool_call_id)
    }

    pub fn tool_call(&self, tool_call_id: &str) -> Option<&ToolCall> {
        self.tool_calls.iter().find(|c| c.id == tool_call_id)
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// JSON-encoded arguments, exactly as streamed.
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Parse the argument string as JSON.
    pub fn parsed_arguments(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.arguments)
    }
}

/// Lifecycle of one tool call's execution.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Execution record attached to an assistant message, one per tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallExecution {
    pub id: String,
    pub tool_call_id: String,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ToolCallExecution {
    pub fn pending(tool_call_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tool_call_id: tool_call_id.into(),
            status: ExecutionStatus::Pending,
            result: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Content fed back to the model for this execution.
    pub fn result_content(&self) -> String {
        match self.status {
            ExecutionStatus::Failed => {
                format!("Error: {}", self.error.as_deref().unwrap_or("unknown error"))
            }
            _ => self.result.clone().unwrap_or_default(),
        }
    }
}

/// Outcome supplied by whoever executed a tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Completed { result: String },
    Failed { error: String },
}

impl ToolOutcome {
    pub fn completed(result: impl Into<String>) -> Self {
        Self::Completed {
            result: result.into(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }
}
