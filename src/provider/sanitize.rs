//! Outbound transcript sanitization.
//!
//! The persisted history holds things the model must not see verbatim:
//! stale system messages, failure records, and tool results whose calls were
//! deleted (or calls whose results were). This pass produces a transcript that
//! chat-completions style endpoints accept.

use std::collections::{HashMap, HashSet};

use crate::types::{Message, MessageKind, Role};

/// Placeholder content for a tool call whose result is no longer in history.
pub const MISSING_TOOL_RESULT: &str = "Error: missing tool result in transcript";

pub fn sanitize_messages_for_endpoint(messages: &[Message]) -> Vec<Message> {
    let filtered: Vec<Message> = messages.iter().filter(|m| keep(m)).cloned().collect();
    sanitize_tool_result_pairing(&filtered)
}

fn keep(message: &Message) -> bool {
    match &message.kind {
        MessageKind::System { .. } => false,
        MessageKind::Assistant(msg) => msg.error.is_none(),
        _ => true,
    }
}

fn sanitize_tool_result_pairing(messages: &[Message]) -> Vec<Message> {
    let mut out: Vec<Message> = Vec::with_capacity(messages.len());
    let mut seen_tool_results: HashSet<String> = HashSet::new();

    let mut i = 0usize;
    while i < messages.len() {
        let msg = &messages[i];
        let tool_calls = match msg.as_assistant() {
            Some(assistant) if !assistant.tool_calls.is_empty() => &assistant.tool_calls,
            _ => {
                // tool results outside an assistant span are orphans
                if msg.role() != Role::ToolResult {
                    out.push(msg.clone());
                }
                i += 1;
                continue;
            }
        };

        let tool_call_ids: HashSet<&str> = tool_calls.iter().map(|tc| tc.id.as_str()).collect();
        let mut span_results: HashMap<String, Message> = HashMap::new();

        let mut j = i + 1;
        while j < messages.len() {
            let Some(id) = messages[j].tool_result_call_id() else {
                break;
            };
            if tool_call_ids.contains(id) && seen_tool_results.insert(id.to_string()) {
                span_results.insert(id.to_string(), messages[j].clone());
            }
            j += 1;
        }

        // every call leaves this span answered
        out.push(msg.clone());
        for call in tool_calls {
            match span_results.remove(&call.id) {
                Some(existing) => out.push(existing),
                None => out.push(Message::tool_result(
                    call.id.clone(),
                    call.name.clone(),
                    MISSING_TOOL_RESULT,
                )),
            }
        }
        i = j;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AssistantMessage, ToolCall};

    fn assistant_with_calls(ids: &[&str]) -> Message {
        Message::assistant(AssistantMessage {
            tool_calls: ids
                .iter()
                .map(|id| ToolCall::new(*id, "lookup", "{}"))
                .collect(),
            ..Default::default()
        })
    }

    #[test]
    fn system_and_error_messages_are_stripped() {
        let messages = vec![
            Message::system("old prompt"),
            Message::user("hi"),
            Message::assistant(AssistantMessage {
                content: "Error: boom".into(),
                error: Some("boom".into()),
                retryable: true,
                ..Default::default()
            }),
        ];
        let out = sanitize_messages_for_endpoint(&messages);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].role(), Role::User);
    }

    #[test]
    fn results_are_reordered_to_call_order() {
        let messages = vec![
            Message::user("go"),
            assistant_with_calls(&["a", "b"]),
            Message::tool_result("b", "lookup", "B"),
            Message::tool_result("a", "lookup", "A"),
        ];
        let out = sanitize_messages_for_endpoint(&messages);
        let contents: Vec<&str> = out.iter().map(|m| m.content()).collect();
        assert_eq!(contents, vec!["go", "", "A", "B"]);
    }

    #[test]
    fn missing_results_are_synthesized_and_orphans_dropped() {
        let messages = vec![
            Message::tool_result("ghost", "lookup", "orphan"),
            assistant_with_calls(&["a"]),
            Message::user("next"),
        ];
        let out = sanitize_messages_for_endpoint(&messages);
        assert_eq!(out.len(), 3);
        assert_eq!(out[1].tool_result_call_id(), Some("a"));
        assert_eq!(out[1].content(), MISSING_TOOL_RESULT);
        assert_eq!(out[2].content(), "next");
    }
}
