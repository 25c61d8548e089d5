//! Tool execution gate.
//!
//! After a turn commits tool calls, the conversation is held until every
//! execution on the latest assistant message is terminal. Resolutions arrive
//! one at a time from outside; the gate records each one and decides whether
//! the conversation may continue.

use std::collections::HashSet;

use chrono::Utc;
use tracing::debug;

use crate::error::ColloquyError;
use crate::types::{ExecutionStatus, Message, Session, ToolOutcome};

/// What recording one resolution did to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// The execution was already terminal; nothing changed.
    AlreadyResolved,
    /// Recorded; the conversation is still held on `remaining` executions.
    ///
    /// `remaining` is zero when every execution is terminal but all their
    /// results are already in history, so there is nothing to continue with.
    Pending { remaining: usize },
    /// Recorded, and these tool-result messages were appended in tool-call
    /// order. The caller must persist and open a continuation turn.
    Complete { tool_results: Vec<Message> },
}

/// Record `outcome` for `tool_call_id` on the session's latest assistant message.
pub fn resolve(
    session: &mut Session,
    tool_call_id: &str,
    outcome: ToolOutcome,
) -> Result<GateDecision, ColloquyError> {
    let not_found = || ColloquyError::ToolCallNotFound(tool_call_id.to_string());
    let idx = session.last_assistant_index().ok_or_else(not_found)?;
    let on_latest = session.messages[idx]
        .as_assistant()
        .is_some_and(|a| a.execution_for(tool_call_id).is_some());
    if !on_latest {
        // a repeat of a resolution whose continuation already committed
        if resolved_earlier(&session.messages[..idx], tool_call_id) {
            debug!(session_id = %session.id, tool_call_id, "tool call already resolved");
            return Ok(GateDecision::AlreadyResolved);
        }
        return Err(not_found());
    }
    let assistant = session.messages[idx]
        .as_assistant_mut()
        .ok_or_else(not_found)?;
    let execution = assistant
        .executions
        .iter_mut()
        .find(|e| e.tool_call_id == tool_call_id)
        .ok_or_else(not_found)?;

    if execution.status.is_terminal() {
        debug!(session_id = %session.id, tool_call_id, "tool call already resolved");
        return Ok(GateDecision::AlreadyResolved);
    }

    match outcome {
        ToolOutcome::Completed { result } => {
            execution.status = ExecutionStatus::Completed;
            execution.result = Some(result);
            execution.error = None;
        }
        ToolOutcome::Failed { error } => {
            execution.status = ExecutionStatus::Failed;
            execution.result = None;
            execution.error = Some(error);
        }
    }
    execution.timestamp = Utc::now();

    let remaining = assistant.pending_executions().count();
    if remaining > 0 {
        session.touch();
        return Ok(GateDecision::Pending { remaining });
    }

    let answered: HashSet<&str> = session.messages[idx + 1..]
        .iter()
        .filter_map(Message::tool_result_call_id)
        .collect();

    let assistant = session.messages[idx]
        .as_assistant()
        .ok_or_else(not_found)?;
    let tool_results: Vec<Message> = assistant
        .tool_calls
        .iter()
        .filter(|call| !answered.contains(call.id.as_str()))
        .filter_map(|call| {
            assistant
                .execution_for(&call.id)
                .map(|exec| Message::tool_result(call.id.clone(), call.name.clone(), exec.result_content()))
        })
        .collect();

    session.touch();
    if tool_results.is_empty() {
        return Ok(GateDecision::Pending { remaining: 0 });
    }
    session.messages.extend(tool_results.iter().cloned());
    Ok(GateDecision::Complete { tool_results })
}

fn resolved_earlier(messages: &[Message], tool_call_id: &str) -> bool {
    messages
        .iter()
        .rev()
        .filter_map(Message::as_assistant)
        .find_map(|a| a.execution_for(tool_call_id))
        .is_some_and(|e| e.status.is_terminal())
}
