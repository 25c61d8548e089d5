//! One-turn-per-session bookkeeping.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::ColloquyError;

struct ActiveTurn {
    key: Uuid,
    cancel: CancellationToken,
    finished: watch::Receiver<bool>,
}

/// Sessions that currently have a turn in flight.
#[derive(Default)]
pub(crate) struct TurnRegistry {
    active: Mutex<HashMap<String, ActiveTurn>>,
}

impl TurnRegistry {
    fn entries(&self) -> MutexGuard<'_, HashMap<String, ActiveTurn>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the session. Fails with `TurnInFlight` if it is already claimed.
    pub(crate) fn begin(self: &Arc<Self>, session_id: &str) -> Result<TurnGuard, ColloquyError> {
        let mut entries = self.entries();
        if entries.contains_key(session_id) {
            return Err(ColloquyError::TurnInFlight(session_id.to_string()));
        }
        let key = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let (finished_tx, finished_rx) = watch::channel(false);
        entries.insert(
            session_id.to_string(),
            ActiveTurn {
                key,
                cancel: cancel.clone(),
                finished: finished_rx,
            },
        );
        Ok(TurnGuard {
            registry: Arc::clone(self),
            session_id: session_id.to_string(),
            key,
            cancel,
            finished: finished_tx,
        })
    }

    pub(crate) fn is_active(&self, session_id: &str) -> bool {
        self.entries().contains_key(session_id)
    }

    /// Signal cancellation without waiting. `false` if nothing was running.
    pub(crate) fn cancel(&self, session_id: &str) -> bool {
        match self.entries().get(session_id) {
            Some(turn) => {
                turn.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel the session's turn and wait until its guard is released, which
    /// happens only after the terminal message has been committed.
    pub(crate) async fn supersede(&self, session_id: &str) {
        let finished = self.entries().get(session_id).map(|turn| {
            turn.cancel.cancel();
            turn.finished.clone()
        });
        if let Some(mut finished) = finished {
            let _ = finished.wait_for(|done| *done).await;
        }
    }
}

/// Held for the lifetime of a turn; releases the session on drop.
pub(crate) struct TurnGuard {
    registry: Arc<TurnRegistry>,
    session_id: String,
    key: Uuid,
    cancel: CancellationToken,
    finished: watch::Sender<bool>,
}

impl TurnGuard {
    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        let mut entries = self.registry.entries();
        if entries
            .get(&self.session_id)
            .is_some_and(|turn| turn.key == self.key)
        {
            entries.remove(&self.session_id);
        }
        drop(entries);
        self.finished.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn second_claim_is_rejected_until_release() {
        let registry = Arc::new(TurnRegistry::default());
        let guard = registry.begin("s1").unwrap();
        assert!(matches!(registry.begin("s1"), Err(ColloquyError::TurnInFlight(_))));
        assert!(registry.begin("s2").is_ok());

        drop(guard);
        assert!(!registry.is_active("s1"));
        assert!(registry.begin("s1").is_ok());
    }

    #[tokio::test]
    async fn supersede_cancels_and_waits_for_release() {
        let registry = Arc::new(TurnRegistry::default());
        let guard = registry.begin("s1").unwrap();
        let token = guard.cancel_token();

        let holder = tokio::spawn(async move {
            token.cancelled().await;
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(guard);
        });

        registry.supersede("s1").await;
        assert!(!registry.is_active("s1"));
        holder.await.unwrap();
    }

    #[tokio::test]
    async fn supersede_without_turn_returns_immediately() {
        let registry = Arc::new(TurnRegistry::default());
        registry.supersede("idle").await;
        assert!(!registry.cancel("idle"));
    }
}
