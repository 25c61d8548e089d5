//! Shared test helpers and mock endpoint.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use colloquy::chat::Chat;
use colloquy::config::ColloquyConfig;
use colloquy::error::ColloquyError;
use colloquy::provider::{FragmentStream, ModelEndpoint, TitleGenerator, TurnRequest};
use colloquy::store::{MemorySessionStore, SessionStore};
use colloquy::turn::{TurnEvent, TurnEventSink};
use colloquy::types::*;

/// One scripted response.
struct Script {
    items: Vec<Result<Fragment, ColloquyError>>,
    hang: bool,
}

/// A mock endpoint that replays queued fragment scripts in order.
pub struct MockEndpoint {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<TurnRequest>>,
}

impl MockEndpoint {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a response that streams `fragments` and then ends.
    pub fn queue(&self, fragments: Vec<Fragment>) {
        self.push(fragments.into_iter().map(Ok).collect(), false);
    }

    /// Queue a plain text response split into the given pieces.
    pub fn queue_text(&self, pieces: &[&str]) {
        self.queue(pieces.iter().map(|p| Fragment::text(*p)).collect());
    }

    /// Queue a response that streams `fragments` and then never ends.
    pub fn queue_hanging(&self, fragments: Vec<Fragment>) {
        self.push(fragments.into_iter().map(Ok).collect(), true);
    }

    /// Queue a response that streams `fragments` and then fails.
    pub fn queue_failure(&self, fragments: Vec<Fragment>, error: ColloquyError) {
        let mut items: Vec<_> = fragments.into_iter().map(Ok).collect();
        items.push(Err(error));
        self.push(items, false);
    }

    fn push(&self, items: Vec<Result<Fragment, ColloquyError>>, hang: bool) {
        self.scripts.lock().unwrap().push_back(Script { items, hang });
    }

    /// Requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<TurnRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> TurnRequest {
        self.requests().pop().expect("no request was made")
    }
}

#[async_trait]
impl ModelEndpoint for MockEndpoint {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }

    async fn stream_turn(
        &self,
        request: &TurnRequest,
        _cancel: CancellationToken,
    ) -> Result<FragmentStream, ColloquyError> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self.scripts.lock().unwrap().pop_front().unwrap_or(Script {
            items: vec![Ok(Fragment::text("Mock response"))],
            hang: false,
        });
        let replay = stream::iter(script.items);
        if script.hang {
            Ok(replay.chain(stream::pending()).boxed())
        } else {
            Ok(replay.boxed())
        }
    }
}

/// Title generator returning a fixed title, optionally after a delay.
pub struct MockTitles {
    title: String,
    delay: Duration,
    seeds: Mutex<Vec<String>>,
}

impl MockTitles {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            delay: Duration::ZERO,
            seeds: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn seeds(&self) -> Vec<String> {
        self.seeds.lock().unwrap().clone()
    }
}

#[async_trait]
impl TitleGenerator for MockTitles {
    async fn generate_title(&self, first_user_text: &str) -> Result<String, ColloquyError> {
        self.seeds.lock().unwrap().push(first_user_text.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.title.clone())
    }
}

/// Collects every turn event for later inspection.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<TurnEvent>>>,
}

impl EventLog {
    pub fn sink(&self) -> TurnEventSink {
        let events = self.events.clone();
        Arc::new(move |event| events.lock().unwrap().push(event))
    }

    pub fn events(&self) -> Vec<TurnEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Latest preview text, if any preview was emitted.
    pub fn latest_preview_text(&self) -> Option<String> {
        self.events().iter().rev().find_map(|e| match &e.payload {
            colloquy::turn::TurnEventPayload::Preview { preview } => Some(preview.text.clone()),
            _ => None,
        })
    }
}

/// Test fixture: orchestrator over an in-memory store and a mock endpoint.
pub struct Harness {
    pub chat: Arc<Chat>,
    pub endpoint: Arc<MockEndpoint>,
    pub store: Arc<MemorySessionStore>,
    pub events: EventLog,
}

pub fn config() -> ColloquyConfig {
    ColloquyConfig::new()
        .with_indicator_delay(Duration::from_millis(500))
        .with_title_generation(true)
}

pub fn harness() -> Harness {
    harness_with(|chat| chat)
}

pub fn harness_with(customize: impl FnOnce(Chat) -> Chat) -> Harness {
    let endpoint = Arc::new(MockEndpoint::new());
    let store = Arc::new(MemorySessionStore::new());
    let events = EventLog::default();
    let chat = Chat::new(store.clone(), endpoint.clone(), config()).with_event_sink(events.sink());
    Harness {
        chat: Arc::new(customize(chat)),
        endpoint,
        store,
        events,
    }
}

impl Harness {
    /// Create and persist an empty session.
    pub async fn session(&self) -> String {
        self.chat
            .create_session(Session::generate())
            .await
            .expect("create session")
            .id
    }

    pub async fn stored(&self, session_id: &str) -> Session {
        self.store
            .load_session(session_id)
            .await
            .unwrap()
            .expect("session exists")
    }

    /// Poll the stored session until `check` holds or a second passes.
    pub async fn eventually(&self, session_id: &str, check: impl Fn(&Session) -> bool) -> Session {
        for _ in 0..100 {
            let session = self.stored(session_id).await;
            if check(&session) {
                return session;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition never held for session {session_id}");
    }
}

/// Fragments for the weather example: two parallel calls, arguments split
/// across deltas, one continued by index and one by id.
pub fn weather_tool_calls() -> Vec<Fragment> {
    vec![
        Fragment::text("Let me check."),
        Fragment::tool_calls(vec![ToolCallDelta::start(0, "c1", "get_weather")]),
        Fragment::tool_calls(vec![ToolCallDelta::arguments(0, "{\"city\":")]),
        Fragment::tool_calls(vec![ToolCallDelta::start(1, "c2", "get_weather")]),
        Fragment::tool_calls(vec![ToolCallDelta::arguments(0, "\"Paris\"}")]),
        Fragment::tool_calls(vec![ToolCallDelta::arguments_for_id(
            "c2",
            "{\"city\":\"Rome\"}",
        )]),
        Fragment::usage(Usage::new(12, 7)),
    ]
}

pub fn user_texts(session: &Session) -> Vec<&str> {
    session
        .messages
        .iter()
        .filter(|m| m.role() == Role::User)
        .map(|m| m.content())
        .collect()
}

pub fn roles(session: &Session) -> Vec<Role> {
    session.messages.iter().map(|m| m.role()).collect()
}
