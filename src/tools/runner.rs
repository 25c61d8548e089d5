//! Local execution of pending tool calls.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::tool::{Tool, ToolExecutionContext};
use crate::chat::{Chat, ResolveOutcome};
use crate::error::ColloquyError;
use crate::provider::ToolDefinition;
use crate::types::{ToolCall, ToolOutcome};

/// Executes a session's pending tool calls with registered tools and feeds
/// each outcome back through [`Chat::resolve_tool_call`].
#[derive(Default, Clone)]
pub struct ToolRunner {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A later tool with the same name replaces the earlier one.
    pub fn register(mut self, tool: Arc<dyn Tool>) -> Self {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
        self
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.definition())
            .collect()
    }

    /// Run one tool call. Unknown tools and unparseable arguments fail the
    /// execution rather than the caller.
    pub async fn execute(&self, session_id: &str, call: &ToolCall) -> ToolOutcome {
        let Some(tool) = self.tools.get(&call.name) else {
            warn!(tool = %call.name, tool_call_id = %call.id, "unknown tool requested");
            return ToolOutcome::failed(format!("Tool '{}' not found", call.name));
        };
        let args = match call.parsed_arguments() {
            Ok(args) => args,
            Err(err) => return ToolOutcome::failed(format!("Invalid arguments: {err}")),
        };
        let ctx = ToolExecutionContext {
            session_id: session_id.to_string(),
            tool_call_id: call.id.clone(),
        };
        match tool.execute(args, &ctx).await {
            Ok(result) => ToolOutcome::completed(result),
            Err(error) => ToolOutcome::failed(error),
        }
    }

    /// Execute every pending call on the session's latest assistant message,
    /// in call order. The last resolution triggers the continuation turn.
    pub async fn run_pending(
        &self,
        chat: &Chat,
        session_id: &str,
    ) -> Result<Vec<ResolveOutcome>, ColloquyError> {
        let session = chat.session(session_id).await?;
        let calls: Vec<ToolCall> = match session.last_assistant() {
            Some(assistant) => assistant
                .pending_executions()
                .filter_map(|exec| assistant.tool_call(&exec.tool_call_id).cloned())
                .collect(),
            None => Vec::new(),
        };

        let mut outcomes = Vec::with_capacity(calls.len());
        for call in &calls {
            debug!(session_id, tool = %call.name, tool_call_id = %call.id, "executing tool");
            let outcome = self.execute(session_id, call).await;
            outcomes.push(chat.resolve_tool_call(session_id, &call.id, outcome).await?);
        }
        Ok(outcomes)
    }

    /// Keep executing until the session is no longer held, or `max_rounds`
    /// rounds have run. Returns the number of rounds executed.
    pub async fn drive(
        &self,
        chat: &Chat,
        session_id: &str,
        max_rounds: usize,
    ) -> Result<usize, ColloquyError> {
        let mut rounds = 0;
        while rounds < max_rounds {
            let outcomes = self.run_pending(chat, session_id).await?;
            if outcomes.is_empty() {
                break;
            }
            rounds += 1;
        }
        Ok(rounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{FnTool, ToolParameters};

    fn runner() -> ToolRunner {
        ToolRunner::new().register(Arc::new(FnTool::new(
            "get_weather",
            "Current weather for a city",
            ToolParameters::object().string("city", "City name", true).build(),
            |args, _ctx| async move {
                match args["city"].as_str() {
                    Some(city) => Ok(format!("sunny in {city}")),
                    None => Err("city is required".to_string()),
                }
            },
        )))
    }

    #[tokio::test]
    async fn executes_registered_tool() {
        let outcome = runner()
            .execute("s1", &ToolCall::new("c1", "get_weather", "{\"city\":\"NY\"}"))
            .await;
        assert_eq!(outcome, ToolOutcome::completed("sunny in NY"));
    }

    #[tokio::test]
    async fn tool_errors_become_failed_outcomes() {
        let outcome = runner()
            .execute("s1", &ToolCall::new("c1", "get_weather", "{}"))
            .await;
        assert_eq!(outcome, ToolOutcome::failed("city is required"));
    }

    #[tokio::test]
    async fn unknown_tool_and_bad_json_fail() {
        let runner = runner();
        let unknown = runner.execute("s1", &ToolCall::new("c1", "launch", "{}")).await;
        assert_eq!(unknown, ToolOutcome::failed("Tool 'launch' not found"));

        let bad = runner
            .execute("s1", &ToolCall::new("c2", "get_weather", "{\"city\":"))
            .await;
        assert!(matches!(bad, ToolOutcome::Failed { error } if error.starts_with("Invalid arguments")));
    }

    #[test]
    fn definitions_keep_registration_order() {
        let names: Vec<String> = runner()
            .register(Arc::new(FnTool::new("clock", "Current time", ToolParameters::empty(), |_, _| async {
                Ok("noon".to_string())
            })))
            .definitions()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["get_weather", "clock"]);
    }
}
