//! History mutation: delete, retry and edit over a loaded session.
//!
//! These functions only rewrite the message list. Persisting, cancelling an
//! in-flight turn and opening the follow-up turn belong to the caller.

use std::collections::HashSet;

use chrono::Utc;

use crate::error::ColloquyError;
use crate::types::{ExecutionStatus, Message, MessageKind, Role, Session};

/// What the caller should do after a retry truncated the history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryPlan {
    /// An assistant reply was dropped; open a fresh turn.
    Regenerate,
    /// Tool results were dropped and their executions reopened. No turn:
    /// new results must be supplied through the gate.
    AwaitToolResults { reopened: Vec<String> },
}

/// Result of preparing an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditPlan {
    /// History length right after truncation.
    pub truncated_len: usize,
    /// Whether the edited message was the session's first user message.
    pub was_first_user_message: bool,
}

/// Remove exactly one message. No cascade.
pub fn delete_message(session: &mut Session, message_id: &str) -> Result<Message, ColloquyError> {
    let idx = locate(session, message_id)?;
    let removed = session.messages.remove(idx);
    session.touch();
    Ok(removed)
}

/// Truncate before `message_id` so the conversation can be replayed from there.
pub fn retry(session: &mut Session, message_id: &str) -> Result<RetryPlan, ColloquyError> {
    let idx = locate(session, message_id)?;
    match session.messages[idx].role() {
        Role::Assistant => {
            session.messages.truncate(idx);
            session.touch();
            Ok(RetryPlan::Regenerate)
        }
        Role::ToolResult => {
            let discarded: HashSet<String> = session.messages[idx..]
                .iter()
                .filter_map(Message::tool_result_call_id)
                .map(str::to_string)
                .collect();
            session.messages.truncate(idx);
            let reopened = reopen_executions(session, &discarded);
            session.touch();
            Ok(RetryPlan::AwaitToolResults { reopened })
        }
        role => Err(ColloquyError::InvalidOperation(format!(
            "cannot retry a {role} message"
        ))),
    }
}

/// Truncate before a user message that is about to be replaced.
///
/// The replacement itself is appended by the caller after the truncated
/// history has been persisted.
pub fn prepare_edit(session: &mut Session, message_id: &str) -> Result<EditPlan, ColloquyError> {
    let idx = locate(session, message_id)?;
    if !matches!(session.messages[idx].kind, MessageKind::User { .. }) {
        return Err(ColloquyError::InvalidOperation(format!(
            "only user messages can be edited, not {}",
            session.messages[idx].role()
        )));
    }
    let was_first_user_message = !session.messages[..idx]
        .iter()
        .any(|m| m.role() == Role::User);

    session.messages.truncate(idx);
    session.touch();
    Ok(EditPlan {
        truncated_len: idx,
        was_first_user_message,
    })
}

fn locate(session: &Session, message_id: &str) -> Result<usize, ColloquyError> {
    session
        .position(message_id)
        .ok_or_else(|| ColloquyError::MessageNotFound(message_id.to_string()))
}

/// Set executions whose results were just discarded back to pending.
fn reopen_executions(session: &mut Session, discarded: &HashSet<String>) -> Vec<String> {
    let Some(idx) = session.last_assistant_index() else {
        return Vec::new();
    };
    let Some(assistant) = session.messages[idx].as_assistant_mut() else {
        return Vec::new();
    };
    let mut reopened = Vec::new();
    for execution in assistant
        .executions
        .iter_mut()
        .filter(|e| discarded.contains(&e.tool_call_id))
    {
        execution.status = ExecutionStatus::Pending;
        execution.result = None;
        execution.error = None;
        execution.timestamp = Utc::now();
        reopened.push(execution.tool_call_id.clone());
    }
    reopened
}
