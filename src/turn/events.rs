//! Turn event stream types.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::types::{TurnId, TurnState};
use crate::stream::StreamingPreview;

/// Callback used for streaming turn events.
pub type TurnEventSink = Arc<dyn Fn(TurnEvent) + Send + Sync>;

/// Concrete event payloads emitted while a turn runs.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEventPayload {
    Started,
    /// Nothing has arrived yet after the indicator delay.
    Responding,
    /// Snapshot of everything accumulated so far. Not authoritative.
    Preview { preview: StreamingPreview },
    PreviewCleared,
    Finished { state: TurnState },
    /// Tool results were appended ahead of this continuation turn.
    ToolResultsAppended { count: usize },
}

/// Envelope for turn events.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TurnEvent {
    pub session_id: String,
    pub turn_id: TurnId,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: TurnEventPayload,
}

pub(crate) struct TurnEventEmitter {
    session_id: String,
    turn_id: TurnId,
    seq: AtomicU64,
    sink: Option<TurnEventSink>,
}

impl TurnEventEmitter {
    pub(crate) fn new(session_id: String, turn_id: TurnId, sink: Option<TurnEventSink>) -> Self {
        Self {
            session_id,
            turn_id,
            seq: AtomicU64::new(1),
            sink,
        }
    }

    pub(crate) fn emit(&self, payload: TurnEventPayload) {
        let Some(sink) = &self.sink else {
            return;
        };
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        (sink)(TurnEvent {
            session_id: self.session_id.clone(),
            turn_id: self.turn_id,
            seq,
            timestamp: Utc::now(),
            payload,
        });
    }
}
