//! Error types for colloquy.

use thiserror::Error;

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    RateLimit,
    Network,
    Server,
    Api,
    Stream,
    Configuration,
    Serialization,
    Storage,
    Conversation,
    Unknown,
}

/// Primary error type for all colloquy operations.
#[derive(Error, Debug)]
pub enum ColloquyError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Tool call not found: {0}")]
    ToolCallNotFound(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("A turn is already in flight for session {0}")]
    TurnInFlight(String),

    #[error("Session {session_id} is waiting on {pending} tool call result(s)")]
    ToolCallsPending { session_id: String, pending: usize },
}

impl ColloquyError {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Network(_) => ErrorCategory::Network,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Stream(_) => ErrorCategory::Stream,
            Self::Io(_) | Self::Store(_) => ErrorCategory::Storage,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                429 => ErrorCategory::RateLimit,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::SessionNotFound(_)
            | Self::MessageNotFound(_)
            | Self::ToolCallNotFound(_)
            | Self::InvalidOperation(_)
            | Self::TurnInFlight(_)
            | Self::ToolCallsPending { .. } => ErrorCategory::Conversation,
        }
    }

    /// Whether this error came from the model endpoint rather than from the
    /// caller or the local store.
    pub fn is_endpoint_fault(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Authentication
                | ErrorCategory::RateLimit
                | ErrorCategory::Network
                | ErrorCategory::Server
                | ErrorCategory::Api
                | ErrorCategory::Stream
                | ErrorCategory::Serialization
        )
    }

    /// Whether retrying the same request could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit
                | ErrorCategory::Network
                | ErrorCategory::Server
                | ErrorCategory::Stream
        )
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ColloquyError>;
