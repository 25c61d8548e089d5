//! The single streaming loop behind send, retry, edit and tool continuation.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::events::{TurnEventEmitter, TurnEventPayload, TurnEventSink};
use super::types::{StreamStatus, TurnId, TurnOutcome, TurnState};
use crate::error::ColloquyError;
use crate::provider::{sanitize_messages_for_endpoint, ModelEndpoint, ToolDefinition, TurnRequest};
use crate::stream::FragmentAccumulator;
use crate::types::{AssistantMessage, Message, Session, ToolCallExecution};

/// Build the transcript a turn sends: the system prompt first, then the
/// sanitized history.
///
/// The session's own prompt wins over `default_system_prompt`.
pub fn outbound_messages(session: &Session, default_system_prompt: Option<&str>) -> Vec<Message> {
    let prompt = session
        .system_prompt
        .as_deref()
        .or(default_system_prompt)
        .filter(|p| !p.trim().is_empty());

    let history = sanitize_messages_for_endpoint(&session.messages);
    let mut out = Vec::with_capacity(history.len() + 1);
    if let Some(prompt) = prompt {
        out.push(Message::system(prompt));
    }
    out.extend(history);
    out
}

/// State owned by exactly one active turn.
pub struct TurnContext {
    session_id: String,
    turn_id: TurnId,
    request: TurnRequest,
    state: TurnState,
    status: StreamStatus,
    accumulator: FragmentAccumulator,
    emitter: TurnEventEmitter,
}

impl TurnContext {
    pub fn new(
        session: &Session,
        default_system_prompt: Option<&str>,
        tools: Vec<ToolDefinition>,
        sink: Option<TurnEventSink>,
    ) -> Self {
        let turn_id = Uuid::new_v4();
        Self {
            session_id: session.id.clone(),
            turn_id,
            request: TurnRequest {
                messages: outbound_messages(session, default_system_prompt),
                tools,
            },
            state: TurnState::Idle,
            status: StreamStatus::AwaitingFirstFragment,
            accumulator: FragmentAccumulator::new(),
            emitter: TurnEventEmitter::new(session.id.clone(), turn_id, sink),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn turn_id(&self) -> TurnId {
        self.turn_id
    }

    pub fn request(&self) -> &TurnRequest {
        &self.request
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn status(&self) -> StreamStatus {
        self.status
    }

    pub(crate) fn emit(&self, payload: TurnEventPayload) {
        self.emitter.emit(payload);
    }
}

/// Drives one turn from open to a terminal state.
///
/// The runner never touches the store; the caller commits
/// [`TurnOutcome::message`].
#[derive(Clone)]
pub struct TurnRunner {
    endpoint: Arc<dyn ModelEndpoint>,
    indicator_delay: Duration,
}

impl TurnRunner {
    pub fn new(endpoint: Arc<dyn ModelEndpoint>, indicator_delay: Duration) -> Self {
        Self {
            endpoint,
            indicator_delay,
        }
    }

    pub fn endpoint(&self) -> &Arc<dyn ModelEndpoint> {
        &self.endpoint
    }

    pub async fn run(&self, mut ctx: TurnContext, cancel: CancellationToken) -> TurnOutcome {
        ctx.state = TurnState::Streaming;
        ctx.emit(TurnEventPayload::Started);
        debug!(
            session_id = %ctx.session_id,
            turn_id = %ctx.turn_id,
            messages = ctx.request.messages.len(),
            tools = ctx.request.tools.len(),
            "turn start"
        );

        let indicator = tokio::time::sleep(self.indicator_delay);
        tokio::pin!(indicator);
        let mut indicator_armed = true;

        let opened = {
            let open = self.endpoint.stream_turn(&ctx.request, cancel.clone());
            tokio::pin!(open);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break None,
                    _ = &mut indicator, if indicator_armed => {
                        indicator_armed = false;
                        ctx.emit(TurnEventPayload::Responding);
                    }
                    result = &mut open => break Some(result),
                }
            }
        };

        let mut stream = match opened {
            None => return self.abort(ctx),
            Some(Err(err)) => return self.fail(ctx, err),
            Some(Ok(stream)) => stream,
        };

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.abort(ctx),
                _ = &mut indicator, if indicator_armed && ctx.status == StreamStatus::AwaitingFirstFragment => {
                    indicator_armed = false;
                    ctx.emit(TurnEventPayload::Responding);
                }
                item = stream.next() => match item {
                    None => break,
                    Some(Ok(fragment)) => {
                        ctx.status = StreamStatus::Receiving;
                        ctx.accumulator.ingest(&fragment);
                        ctx.emit(TurnEventPayload::Preview {
                            preview: ctx.accumulator.preview(),
                        });
                    }
                    Some(Err(err)) => return self.fail(ctx, err),
                },
            }
        }

        self.complete(ctx)
    }

    fn complete(&self, mut ctx: TurnContext) -> TurnOutcome {
        let accumulator = std::mem::take(&mut ctx.accumulator);
        let draft = accumulator.finish();

        let message = if draft.text.is_empty() && draft.tool_calls.is_empty() {
            None
        } else {
            let executions = draft
                .tool_calls
                .iter()
                .map(|call| ToolCallExecution::pending(call.id.clone()))
                .collect();
            Some(Message::assistant(AssistantMessage {
                content: draft.text,
                reasoning: non_empty(draft.reasoning),
                reasoning_duration_ms: draft
                    .reasoning_duration
                    .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
                tool_calls: draft.tool_calls,
                executions,
                usage: draft.usage,
                ..self.labelled()
            }))
        };

        self.finish(ctx, TurnState::Completed, message)
    }

    fn abort(&self, mut ctx: TurnContext) -> TurnOutcome {
        let accumulator = std::mem::take(&mut ctx.accumulator);
        let message = accumulator.has_content().then(|| {
            let draft = accumulator.finish();
            // half-streamed tool calls are not kept; nothing could resolve them
            Message::assistant(AssistantMessage {
                content: draft.text,
                reasoning: non_empty(draft.reasoning),
                reasoning_duration_ms: draft
                    .reasoning_duration
                    .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
                usage: draft.usage,
                incomplete: true,
                ..self.labelled()
            })
        });

        self.finish(ctx, TurnState::Aborted, message)
    }

    fn fail(&self, ctx: TurnContext, err: ColloquyError) -> TurnOutcome {
        let description = err.to_string();
        if err.is_endpoint_fault() {
            debug!(
                session_id = %ctx.session_id,
                turn_id = %ctx.turn_id,
                category = ?err.category(),
                retryable = err.is_retryable(),
                error = %description,
                "turn errored"
            );
        } else {
            warn!(
                session_id = %ctx.session_id,
                turn_id = %ctx.turn_id,
                category = ?err.category(),
                error = %description,
                "turn errored on a local failure"
            );
        }
        let message = Message::assistant(AssistantMessage {
            content: format!("Error: {description}"),
            error: Some(description),
            retryable: true,
            usage: ctx.accumulator.usage().cloned(),
            ..self.labelled()
        });

        self.finish(ctx, TurnState::Errored, Some(message))
    }

    fn finish(&self, mut ctx: TurnContext, state: TurnState, message: Option<Message>) -> TurnOutcome {
        ctx.state = state;
        ctx.emit(TurnEventPayload::PreviewCleared);
        ctx.emit(TurnEventPayload::Finished { state });

        let outcome = TurnOutcome {
            session_id: ctx.session_id,
            turn_id: ctx.turn_id,
            state,
            message,
        };
        debug!(
            session_id = %outcome.session_id,
            turn_id = %outcome.turn_id,
            state = %state,
            committed = outcome.message.is_some(),
            pending_tool_calls = outcome.pending_tool_calls(),
            "turn finished"
        );
        outcome
    }

    fn labelled(&self) -> AssistantMessage {
        AssistantMessage {
            provider: Some(self.endpoint.provider_name().to_string()),
            model: Some(self.endpoint.model_id().to_string()),
            ..Default::default()
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::FragmentStream;
    use crate::types::{Fragment, MessageKind, ToolCallDelta};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedEndpoint {
        script: Mutex<Option<Vec<Result<Fragment, ColloquyError>>>>,
        pending_forever: bool,
    }

    impl ScriptedEndpoint {
        fn new(script: Vec<Result<Fragment, ColloquyError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(Some(script)),
                pending_forever: false,
            })
        }

        fn then_hang(script: Vec<Result<Fragment, ColloquyError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(Some(script)),
                pending_forever: true,
            })
        }
    }

    #[async_trait]
    impl ModelEndpoint for ScriptedEndpoint {
        fn provider_name(&self) -> &str {
            "scripted"
        }

        fn model_id(&self) -> &str {
            "scripted-1"
        }

        async fn stream_turn(
            &self,
            _request: &TurnRequest,
            _cancel: CancellationToken,
        ) -> Result<FragmentStream, ColloquyError> {
            let script = self.script.lock().unwrap().take().unwrap_or_default();
            let head = futures::stream::iter(script);
            if self.pending_forever {
                Ok(Box::pin(head.chain(futures::stream::pending())))
            } else {
                Ok(Box::pin(head))
            }
        }
    }

    fn runner(endpoint: Arc<dyn ModelEndpoint>) -> TurnRunner {
        TurnRunner::new(endpoint, Duration::from_millis(500))
    }

    fn context(sink: Option<TurnEventSink>) -> TurnContext {
        let mut session = Session::new("s1");
        session.messages.push(Message::user("hi"));
        TurnContext::new(&session, None, Vec::new(), sink)
    }

    fn recording_sink() -> (TurnEventSink, Arc<Mutex<Vec<TurnEventPayload>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let captured = events.clone();
        let sink: TurnEventSink = Arc::new(move |event: crate::turn::TurnEvent| {
            captured.lock().unwrap().push(event.payload);
        });
        (sink, events)
    }

    #[test]
    fn outbound_prepends_prompt_and_strips_stale_system_messages() {
        let mut session = Session::new("s1").with_system_prompt("be brief");
        session.messages.push(Message::system("stale"));
        session.messages.push(Message::user("hi"));

        let out = outbound_messages(&session, Some("fallback"));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].content(), "be brief");
        assert_eq!(out[1].content(), "hi");
    }

    #[tokio::test]
    async fn completed_turn_commits_text_with_labels() {
        let endpoint = ScriptedEndpoint::new(vec![
            Ok(Fragment::text("Hel")),
            Ok(Fragment::text("lo")),
        ]);
        let outcome = runner(endpoint).run(context(None), CancellationToken::new()).await;

        assert_eq!(outcome.state, TurnState::Completed);
        let message = outcome.message.unwrap();
        let assistant = message.as_assistant().unwrap();
        assert_eq!(assistant.content, "Hello");
        assert_eq!(assistant.provider.as_deref(), Some("scripted"));
        assert!(!assistant.incomplete);
    }

    #[tokio::test]
    async fn empty_stream_commits_nothing() {
        let endpoint = ScriptedEndpoint::new(vec![Ok(Fragment::reasoning("hmm"))]);
        let outcome = runner(endpoint).run(context(None), CancellationToken::new()).await;
        assert_eq!(outcome.state, TurnState::Completed);
        assert!(outcome.message.is_none());
    }

    #[tokio::test]
    async fn tool_calls_get_pending_executions() {
        let endpoint = ScriptedEndpoint::new(vec![
            Ok(Fragment::tool_calls(vec![ToolCallDelta::start(0, "c1", "get_weather")])),
            Ok(Fragment::tool_calls(vec![ToolCallDelta::arguments(0, "{\"city\":")])),
            Ok(Fragment::tool_calls(vec![ToolCallDelta::arguments(0, "\"NY\"}")])),
        ]);
        let outcome = runner(endpoint).run(context(None), CancellationToken::new()).await;

        assert_eq!(outcome.pending_tool_calls(), 1);
        let message = outcome.message.unwrap();
        let assistant = message.as_assistant().unwrap();
        assert_eq!(assistant.tool_calls[0].arguments, "{\"city\":\"NY\"}");
        assert_eq!(assistant.executions[0].tool_call_id, "c1");
    }

    #[tokio::test]
    async fn fault_discards_partial_text_and_records_error() {
        let endpoint = ScriptedEndpoint::new(vec![
            Ok(Fragment::text("partial")),
            Err(ColloquyError::Stream("connection reset".into())),
        ]);
        let outcome = runner(endpoint).run(context(None), CancellationToken::new()).await;

        assert_eq!(outcome.state, TurnState::Errored);
        let message = outcome.message.unwrap();
        let assistant = message.as_assistant().unwrap();
        assert_eq!(assistant.content, "Error: Stream error: connection reset");
        assert_eq!(assistant.error.as_deref(), Some("Stream error: connection reset"));
        assert!(assistant.retryable);
    }

    #[tokio::test]
    async fn cancelled_before_open_commits_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let endpoint = ScriptedEndpoint::new(vec![Ok(Fragment::text("never"))]);
        let outcome = runner(endpoint).run(context(None), cancel).await;
        assert_eq!(outcome.state, TurnState::Aborted);
        assert!(outcome.message.is_none());
    }

    #[tokio::test]
    async fn cancel_mid_stream_keeps_partial_text_as_incomplete() {
        let (sink, events) = recording_sink();
        let endpoint = ScriptedEndpoint::then_hang(vec![Ok(Fragment::text("Hel"))]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let watcher = events.clone();
        tokio::spawn(async move {
            loop {
                let seen = watcher
                    .lock()
                    .unwrap()
                    .iter()
                    .any(|p| matches!(p, TurnEventPayload::Preview { .. }));
                if seen {
                    trigger.cancel();
                    return;
                }
                tokio::task::yield_now().await;
            }
        });

        let outcome = runner(endpoint).run(context(Some(sink)), cancel).await;

        assert_eq!(outcome.state, TurnState::Aborted);
        let message = outcome.message.unwrap();
        let MessageKind::Assistant(assistant) = &message.kind else {
            panic!("expected assistant message");
        };
        assert_eq!(assistant.content, "Hel");
        assert!(assistant.incomplete);
        assert!(assistant.error.is_none());

        let events = events.lock().unwrap();
        let tail: Vec<&TurnEventPayload> = events.iter().rev().take(2).collect();
        assert_eq!(
            tail,
            vec![
                &TurnEventPayload::Finished {
                    state: TurnState::Aborted
                },
                &TurnEventPayload::PreviewCleared,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn responding_indicator_fires_once_while_waiting() {
        let (sink, events) = recording_sink();
        let endpoint = ScriptedEndpoint::then_hang(Vec::new());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            trigger.cancel();
        });

        let outcome = runner(endpoint).run(context(Some(sink)), cancel).await;
        assert_eq!(outcome.state, TurnState::Aborted);
        let responding = events
            .lock()
            .unwrap()
            .iter()
            .filter(|p| matches!(p, TurnEventPayload::Responding))
            .count();
        assert_eq!(responding, 1);
    }
}
