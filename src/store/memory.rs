use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{sort_recent_first, SessionStore};
use crate::error::ColloquyError;
use crate::types::Session;

/// In-process store, used by tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load_session(&self, id: &str) -> Result<Option<Session>, ColloquyError> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn save_session(&self, session: &Session) -> Result<(), ColloquyError> {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn delete_session(&self, id: &str) -> Result<(), ColloquyError> {
        self.sessions.write().await.remove(id);
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, ColloquyError> {
        let mut sessions: Vec<Session> = self.sessions.read().await.values().cloned().collect();
        sort_recent_first(&mut sessions);
        Ok(sessions)
    }
}
