//! Session type: the unit the store loads and saves.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::{AssistantMessage, Message, MessageKind};
use super::usage::Usage;

/// A persisted conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_ids: Option<BTreeSet<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: None,
            messages: Vec::new(),
            system_prompt: None,
            agent_id: None,
            tool_ids: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// New session with a random id.
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_tools<I, S>(mut self, tool_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tool_ids = Some(tool_ids.into_iter().map(Into::into).collect());
        self
    }

    /// Bump the last-modified timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn position(&self, message_id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id == message_id)
    }

    pub fn message(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    /// Index of the most recent assistant message.
    pub fn last_assistant_index(&self) -> Option<usize> {
        self.messages
            .iter()
            .rposition(|m| matches!(m.kind, MessageKind::Assistant(_)))
    }

    pub fn last_assistant(&self) -> Option<&AssistantMessage> {
        self.last_assistant_index()
            .and_then(|idx| self.messages[idx].as_assistant())
    }

    /// Number of executions the conversation is currently held on.
    pub fn pending_tool_calls(&self) -> usize {
        self.last_assistant()
            .map(|msg| msg.pending_executions().count())
            .unwrap_or(0)
    }

    /// Text of the first user message, used for title generation.
    pub fn first_user_text(&self) -> Option<&str> {
        self.messages.iter().find_map(|m| match &m.kind {
            MessageKind::User { content } => Some(content.as_str()),
            _ => None,
        })
    }

    /// Sum of the usage reported on every assistant message.
    pub fn total_usage(&self) -> Usage {
        let mut total = Usage::default();
        for usage in self
            .messages
            .iter()
            .filter_map(|m| m.as_assistant().and_then(|a| a.usage.as_ref()))
        {
            total.merge(usage);
        }
        total
    }
}
