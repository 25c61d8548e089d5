//! Core turn types.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::types::Message;

/// Unique turn identifier.
pub type TurnId = Uuid;

/// Lifecycle of one turn.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TurnState {
    Idle,
    Streaming,
    /// Stream ended normally; the accumulated message (if any) was committed.
    Completed,
    /// Cancelled; an `incomplete` message is committed only if content arrived.
    Aborted,
    /// The endpoint faulted; an error message was committed.
    Errored,
}

impl TurnState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Errored)
    }
}

/// Presentation-level streaming status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    AwaitingFirstFragment,
    Receiving,
}

/// What a finished turn produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub session_id: String,
    pub turn_id: TurnId,
    pub state: TurnState,
    /// The assistant message committed to history, if any.
    pub message: Option<Message>,
}

impl TurnOutcome {
    /// Tool calls the committed message is waiting on.
    pub fn pending_tool_calls(&self) -> usize {
        self.message
            .as_ref()
            .and_then(Message::as_assistant)
            .map(|a| a.pending_executions().count())
            .unwrap_or(0)
    }

    /// The error recorded on the committed message, for errored turns.
    pub fn error(&self) -> Option<&str> {
        self.message
            .as_ref()
            .and_then(Message::as_assistant)
            .and_then(|a| a.error.as_deref())
    }
}
