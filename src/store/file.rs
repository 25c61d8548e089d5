use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::warn;

use super::{sort_recent_first, SessionStore};
use crate::error::ColloquyError;
use crate::types::Session;

/// File-backed store: one pretty-printed JSON file per session.
///
/// # Example
/// ```no_run
/// use colloquy::store::{FileSessionStore, SessionStore};
/// use colloquy::types::Session;
///
/// # async fn demo() -> colloquy::Result<()> {
/// let store = FileSessionStore::new("/tmp/colloquy/sessions");
/// store.save_session(&Session::new("s1")).await?;
/// assert!(store.load_session("s1").await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    base_dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn session_path(&self, id: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", file_stem(id)))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load_session(&self, id: &str) -> Result<Option<Session>, ColloquyError> {
        let path = self.session_path(id);
        let raw = match fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let session: Session = serde_json::from_str(&raw)
            .map_err(|e| ColloquyError::Store(format!("{}: {e}", path.display())))?;
        Ok(Some(session))
    }

    async fn save_session(&self, session: &Session) -> Result<(), ColloquyError> {
        fs::create_dir_all(&self.base_dir).await?;
        let path = self.session_path(&session.id);
        let tmp = path.with_extension("json.tmp");
        let serialized = serde_json::to_vec_pretty(session)?;
        fs::write(&tmp, serialized).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn delete_session(&self, id: &str) -> Result<(), ColloquyError> {
        match fs::remove_file(self.session_path(id)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, ColloquyError> {
        let mut entries = match fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut sessions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = fs::read_to_string(&path).await?;
            match serde_json::from_str::<Session>(&raw) {
                Ok(session) => sessions.push(session),
                Err(err) => warn!(path = %path.display(), error = %err, "skipping unreadable session file"),
            }
        }
        sort_recent_first(&mut sessions);
        Ok(sessions)
    }
}

/// Escape an id into a file stem. Alphanumerics and `-` pass through, `_`
/// doubles, and every other byte becomes `_XX`, so distinct ids never share
/// a file.
fn file_stem(id: &str) -> String {
    if id.is_empty() {
        return "_".to_string();
    }
    let mut stem = String::with_capacity(id.len());
    for byte in id.bytes() {
        match byte {
            b'_' => stem.push_str("__"),
            b if b.is_ascii_alphanumeric() || b == b'-' => stem.push(char::from(b)),
            b => stem.push_str(&format!("_{b:02X}")),
        }
    }
    stem
}
