//! Session persistence.

mod file;
mod memory;

pub use file::FileSessionStore;
pub use memory::MemorySessionStore;

use async_trait::async_trait;

use crate::error::ColloquyError;
use crate::types::Session;

/// Storage abstraction for sessions.
///
/// `save_session` replaces the whole session; callers always load, mutate
/// and save under the orchestrator's write lock.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load_session(&self, id: &str) -> Result<Option<Session>, ColloquyError>;
    async fn save_session(&self, session: &Session) -> Result<(), ColloquyError>;
    async fn delete_session(&self, id: &str) -> Result<(), ColloquyError>;
    /// All sessions, most recently updated first.
    async fn list_sessions(&self) -> Result<Vec<Session>, ColloquyError>;
}

pub(crate) fn sort_recent_first(sessions: &mut [Session]) {
    sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
}
