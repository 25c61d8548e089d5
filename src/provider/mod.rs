//! Model endpoint contract and implementations.

pub mod http;
pub mod sanitize;
pub mod title;

#[cfg(feature = "openai-compatible")]
pub mod openai_compatible;

pub use sanitize::sanitize_messages_for_endpoint;
pub use title::{EndpointTitleGenerator, TitleGenerator};

use std::sync::Arc;

use async_trait::async_trait;
use bon::Builder;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::config::ColloquyConfig;
use crate::error::ColloquyError;
use crate::types::{Fragment, Message};

/// Lazy, ordered sequence of fragments for one turn.
pub type FragmentStream = BoxStream<'static, Result<Fragment, ColloquyError>>;

/// Tool definition sent to the endpoint.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// What a turn sends to the endpoint.
#[derive(Debug, Clone, Default, Builder)]
pub struct TurnRequest {
    /// Outbound transcript, system prompt first when present.
    pub messages: Vec<Message>,
    #[builder(default)]
    pub tools: Vec<ToolDefinition>,
}

/// A language-model endpoint that streams response fragments.
#[async_trait]
pub trait ModelEndpoint: Send + Sync {
    /// Provider label recorded on assistant messages (e.g. "openai").
    fn provider_name(&self) -> &str;
    /// Model label recorded on assistant messages.
    fn model_id(&self) -> &str;

    /// Open the fragment stream for one turn.
    ///
    /// The token is the turn's cancellation token; implementations may use it
    /// to stop network work early, but the turn stops polling on cancellation
    /// regardless.
    async fn stream_turn(
        &self,
        request: &TurnRequest,
        cancel: CancellationToken,
    ) -> Result<FragmentStream, ColloquyError>;
}

/// Create the configured endpoint.
#[allow(unused_variables)]
pub fn create_endpoint(config: &ColloquyConfig) -> Result<Arc<dyn ModelEndpoint>, ColloquyError> {
    #[cfg(feature = "openai-compatible")]
    {
        let api_key = config.api_key().ok_or_else(|| {
            ColloquyError::Authentication("Missing COLLOQUY_API_KEY or OPENAI_API_KEY".into())
        })?;
        Ok(Arc::new(openai_compatible::OpenAiCompatibleEndpoint::new(
            config.model(),
            api_key,
            config.base_url(),
        )))
    }
    #[cfg(not(feature = "openai-compatible"))]
    {
        Err(ColloquyError::Configuration(
            "no endpoint enabled via feature flags".into(),
        ))
    }
}
