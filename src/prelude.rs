//! Convenience re-exports for common use.

pub use crate::chat::{Chat, ResolveOutcome, RetryOutcome};
pub use crate::config::ColloquyConfig;
pub use crate::error::{ColloquyError, Result};
pub use crate::provider::{ModelEndpoint, TitleGenerator, ToolDefinition};
pub use crate::store::{FileSessionStore, MemorySessionStore, SessionStore};
pub use crate::tools::{FnTool, Tool, ToolParameters, ToolRunner};
pub use crate::turn::{TurnEvent, TurnEventPayload, TurnOutcome, TurnState};
pub use crate::types::{
    AssistantMessage, ExecutionStatus, Fragment, Message, MessageKind, Role, Session, ToolCall,
    ToolOutcome, Usage,
};
