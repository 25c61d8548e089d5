//! Turn state machine: one streaming request/response cycle.

pub mod events;
pub mod runner;
pub mod types;

pub use events::{TurnEvent, TurnEventPayload, TurnEventSink};
pub use runner::{outbound_messages, TurnContext, TurnRunner};
pub use types::{StreamStatus, TurnId, TurnOutcome, TurnState};
