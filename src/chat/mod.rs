//! Conversation orchestrator.
//!
//! [`Chat`] is the entry point for everything a UI does to a session:
//! - [`Chat::send`] appends a user message and runs a turn
//! - [`Chat::cancel`] stops the session's in-flight turn
//! - [`Chat::resolve_tool_call`] feeds a tool outcome to the gate
//! - [`Chat::delete_message`], [`Chat::retry`], [`Chat::edit`] rewrite history
//!
//! Every load-modify-save goes through one async write lock. The lock is
//! never held while a turn streams.

mod registry;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use registry::{TurnGuard, TurnRegistry};

use crate::config::ColloquyConfig;
use crate::error::ColloquyError;
use crate::gate::{self, GateDecision};
use crate::history::{self, RetryPlan};
use crate::provider::{self, EndpointTitleGenerator, ModelEndpoint, TitleGenerator, ToolDefinition};
use crate::store::{FileSessionStore, SessionStore};
use crate::turn::{TurnContext, TurnEventPayload, TurnEventSink, TurnOutcome, TurnRunner};
use crate::types::{Message, Session, ToolOutcome};

/// Result of feeding one tool outcome to the gate.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveOutcome {
    /// The execution was already terminal; nothing changed.
    AlreadyResolved,
    /// Recorded; still waiting on `remaining` executions.
    Pending { remaining: usize },
    /// Every execution was terminal; results were appended and this
    /// continuation turn ran.
    Continued(TurnOutcome),
}

/// Result of a retry.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome {
    Regenerated(TurnOutcome),
    /// Tool results were discarded; these executions are pending again.
    AwaitingToolResults { reopened: Vec<String> },
}

/// High-level conversation orchestrator.
///
/// All methods take `&self`; share it behind an `Arc` to cancel from another
/// task.
pub struct Chat {
    store: Arc<dyn SessionStore>,
    runner: TurnRunner,
    title_generator: Option<Arc<dyn TitleGenerator>>,
    tools: Vec<ToolDefinition>,
    config: ColloquyConfig,
    event_sink: Option<TurnEventSink>,
    turns: Arc<TurnRegistry>,
    write_lock: Arc<Mutex<()>>,
}

impl Chat {
    pub fn new(
        store: Arc<dyn SessionStore>,
        endpoint: Arc<dyn ModelEndpoint>,
        config: ColloquyConfig,
    ) -> Self {
        Self {
            store,
            runner: TurnRunner::new(endpoint, config.indicator_delay()),
            title_generator: None,
            tools: Vec::new(),
            config,
            event_sink: None,
            turns: Arc::new(TurnRegistry::default()),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// File-backed store under the configured data dir, the configured
    /// endpoint, and endpoint-based titles when enabled.
    pub fn from_config(config: ColloquyConfig) -> Result<Self, ColloquyError> {
        let endpoint = provider::create_endpoint(&config)?;
        let store: Arc<dyn SessionStore> = Arc::new(FileSessionStore::new(config.sessions_dir()));
        let titles = config.title_generation().then(|| {
            Arc::new(EndpointTitleGenerator::new(endpoint.clone())) as Arc<dyn TitleGenerator>
        });
        let mut chat = Self::new(store, endpoint, config);
        chat.title_generator = titles;
        Ok(chat)
    }

    pub fn with_title_generator(mut self, generator: Arc<dyn TitleGenerator>) -> Self {
        self.title_generator = Some(generator);
        self
    }

    /// Tools offered to the model. A session's `tool_ids` narrows this set.
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_event_sink(mut self, sink: TurnEventSink) -> Self {
        self.event_sink = Some(sink);
        self
    }

    pub fn config(&self) -> &ColloquyConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Persist a new session. Fails if the id is taken.
    pub async fn create_session(&self, session: Session) -> Result<Session, ColloquyError> {
        let _write = self.write_lock.lock().await;
        if self.store.load_session(&session.id).await?.is_some() {
            return Err(ColloquyError::InvalidOperation(format!(
                "session {} already exists",
                session.id
            )));
        }
        self.store.save_session(&session).await?;
        debug!(session_id = %session.id, "session created");
        Ok(session)
    }

    pub async fn session(&self, session_id: &str) -> Result<Session, ColloquyError> {
        self.load(session_id).await
    }

    pub async fn list_sessions(&self) -> Result<Vec<Session>, ColloquyError> {
        self.store.list_sessions().await
    }

    /// Cancel any in-flight turn, then remove the session.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), ColloquyError> {
        self.turns.supersede(session_id).await;
        let _write = self.write_lock.lock().await;
        self.store.delete_session(session_id).await
    }

    pub fn is_turn_active(&self, session_id: &str) -> bool {
        self.turns.is_active(session_id)
    }

    /// Request cancellation of the session's in-flight turn.
    ///
    /// Returns `false` if no turn was running. The turn commits its partial
    /// message (if any) before the call that started it returns.
    pub fn cancel(&self, session_id: &str) -> bool {
        let cancelled = self.turns.cancel(session_id);
        if cancelled {
            debug!(session_id, "turn cancellation requested");
        }
        cancelled
    }

    /// Append a user message and run a turn to completion.
    ///
    /// # Errors
    ///
    /// [`ColloquyError::ToolCallsPending`] while the session waits on tool
    /// results, [`ColloquyError::TurnInFlight`] if a turn is already running.
    /// Endpoint failures are not errors here; they are committed as an
    /// errored assistant message.
    pub async fn send(
        &self,
        session_id: &str,
        content: impl Into<String>,
    ) -> Result<TurnOutcome, ColloquyError> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(ColloquyError::InvalidOperation("message is empty".into()));
        }
        let guard = self.turns.begin(session_id)?;

        let (session, title_seed) = {
            let _write = self.write_lock.lock().await;
            let mut session = self.load(session_id).await?;
            let pending = session.pending_tool_calls();
            if pending > 0 {
                return Err(ColloquyError::ToolCallsPending {
                    session_id: session_id.to_string(),
                    pending,
                });
            }
            let needs_title = session.title.is_none() && session.first_user_text().is_none();
            session.messages.push(Message::user(content.clone()));
            session.touch();
            self.store.save_session(&session).await?;
            (session, needs_title.then_some(content))
        };

        if let Some(seed) = title_seed {
            self.spawn_title(session_id, seed, None);
        }
        self.run_turn(&session, guard).await
    }

    /// Record a tool outcome. When it completes the set, the tool results
    /// are appended and a continuation turn runs before this returns.
    pub async fn resolve_tool_call(
        &self,
        session_id: &str,
        tool_call_id: &str,
        outcome: ToolOutcome,
    ) -> Result<ResolveOutcome, ColloquyError> {
        let (session, guard, appended) = {
            let _write = self.write_lock.lock().await;
            let mut session = self.load(session_id).await?;
            match gate::resolve(&mut session, tool_call_id, outcome)? {
                GateDecision::AlreadyResolved => return Ok(ResolveOutcome::AlreadyResolved),
                GateDecision::Pending { remaining } => {
                    self.store.save_session(&session).await?;
                    debug!(session_id, tool_call_id, remaining, "tool call resolved");
                    return Ok(ResolveOutcome::Pending { remaining });
                }
                GateDecision::Complete { tool_results } => {
                    // nothing is saved if the session is already busy
                    let guard = self.turns.begin(session_id)?;
                    self.store.save_session(&session).await?;
                    (session, guard, tool_results.len())
                }
            }
        };

        debug!(session_id, tool_call_id, appended, "all tool calls resolved, continuing");
        let ctx = self.context_for(&session);
        ctx.emit(TurnEventPayload::ToolResultsAppended { count: appended });
        let outcome = self.drive(ctx, guard).await?;
        Ok(ResolveOutcome::Continued(outcome))
    }

    /// Remove exactly one message. Never touches an in-flight turn.
    pub async fn delete_message(
        &self,
        session_id: &str,
        message_id: &str,
    ) -> Result<Message, ColloquyError> {
        let _write = self.write_lock.lock().await;
        let mut session = self.load(session_id).await?;
        let removed = history::delete_message(&mut session, message_id)?;
        self.store.save_session(&session).await?;
        debug!(session_id, message_id, role = %removed.role(), "message deleted");
        Ok(removed)
    }

    /// Replay the conversation from `message_id`, superseding any in-flight
    /// turn.
    pub async fn retry(
        &self,
        session_id: &str,
        message_id: &str,
    ) -> Result<RetryOutcome, ColloquyError> {
        self.turns.supersede(session_id).await;
        let guard = self.turns.begin(session_id)?;

        let (session, plan) = {
            let _write = self.write_lock.lock().await;
            let mut session = self.load(session_id).await?;
            let plan = history::retry(&mut session, message_id)?;
            self.store.save_session(&session).await?;
            (session, plan)
        };

        match plan {
            RetryPlan::Regenerate => Ok(RetryOutcome::Regenerated(
                self.run_turn(&session, guard).await?,
            )),
            RetryPlan::AwaitToolResults { reopened } => {
                debug!(session_id, reopened = reopened.len(), "tool results discarded");
                Ok(RetryOutcome::AwaitingToolResults { reopened })
            }
        }
    }

    /// Replace a user message and everything after it, then run a turn.
    pub async fn edit(
        &self,
        session_id: &str,
        message_id: &str,
        new_content: impl Into<String>,
    ) -> Result<TurnOutcome, ColloquyError> {
        let new_content = new_content.into();
        if new_content.trim().is_empty() {
            return Err(ColloquyError::InvalidOperation("message is empty".into()));
        }
        self.turns.supersede(session_id).await;
        let guard = self.turns.begin(session_id)?;

        let (session, plan, observed_title) = {
            let _write = self.write_lock.lock().await;
            let mut session = self.load(session_id).await?;
            let plan = history::prepare_edit(&mut session, message_id)?;
            self.store.save_session(&session).await?;
            session.messages.push(Message::user(new_content.clone()));
            session.touch();
            self.store.save_session(&session).await?;
            let observed = session.title.clone();
            (session, plan, observed)
        };

        debug!(session_id, message_id, truncated_len = plan.truncated_len, "message edited");
        if plan.was_first_user_message {
            self.spawn_title(session_id, new_content, observed_title);
        }
        self.run_turn(&session, guard).await
    }

    async fn load(&self, session_id: &str) -> Result<Session, ColloquyError> {
        self.store
            .load_session(session_id)
            .await?
            .ok_or_else(|| ColloquyError::SessionNotFound(session_id.to_string()))
    }

    fn tools_for(&self, session: &Session) -> Vec<ToolDefinition> {
        match &session.tool_ids {
            None => self.tools.clone(),
            Some(ids) => self
                .tools
                .iter()
                .filter(|t| ids.contains(&t.name))
                .cloned()
                .collect(),
        }
    }

    fn context_for(&self, session: &Session) -> TurnContext {
        TurnContext::new(
            session,
            self.config.system_prompt(),
            self.tools_for(session),
            self.event_sink.clone(),
        )
    }

    async fn run_turn(&self, session: &Session, guard: TurnGuard) -> Result<TurnOutcome, ColloquyError> {
        let ctx = self.context_for(session);
        self.drive(ctx, guard).await
    }

    /// Run the turn, commit its message, then release the session.
    async fn drive(&self, ctx: TurnContext, guard: TurnGuard) -> Result<TurnOutcome, ColloquyError> {
        let outcome = self.runner.run(ctx, guard.cancel_token()).await;
        if let Some(message) = &outcome.message {
            self.commit(&outcome.session_id, message.clone()).await?;
        }
        drop(guard);
        Ok(outcome)
    }

    async fn commit(&self, session_id: &str, message: Message) -> Result<(), ColloquyError> {
        let _write = self.write_lock.lock().await;
        let Some(mut session) = self.store.load_session(session_id).await? else {
            warn!(session_id, "session vanished during turn; dropping message");
            return Ok(());
        };
        session.messages.push(message);
        session.touch();
        self.store.save_session(&session).await
    }

    /// Generate a title in the background. The result is written only if
    /// the stored title still equals `observed`.
    fn spawn_title(&self, session_id: &str, seed: String, observed: Option<String>) {
        if !self.config.title_generation() {
            return;
        }
        let Some(generator) = self.title_generator.clone() else {
            return;
        };
        let store = self.store.clone();
        let write_lock = self.write_lock.clone();
        let session_id = session_id.to_string();

        tokio::spawn(async move {
            let title = match generator.generate_title(&seed).await {
                Ok(title) => title,
                Err(err) => {
                    warn!(session_id = %session_id, error = %err, "title generation failed");
                    return;
                }
            };

            let _write = write_lock.lock().await;
            let mut session = match store.load_session(&session_id).await {
                Ok(Some(session)) => session,
                Ok(None) => return,
                Err(err) => {
                    warn!(session_id = %session_id, error = %err, "title generation could not load session");
                    return;
                }
            };
            if session.title != observed {
                debug!(session_id = %session_id, "title changed meanwhile; discarding generated title");
                return;
            }
            session.title = Some(title);
            session.touch();
            if let Err(err) = store.save_session(&session).await {
                warn!(session_id = %session_id, error = %err, "title generation could not save session");
            }
        });
    }
}
