//! Session title generation.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use futures::StreamExt;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use super::{ModelEndpoint, TurnRequest};
use crate::error::ColloquyError;
use crate::types::Message;

const MAX_TITLE_CHARS: usize = 60;

const TITLE_PROMPT: &str = "Summarize the user's message as a conversation title of at most six words. \
Reply with the title only, without quotes or punctuation at the end.";

/// Produces a short title from the first user message of a session.
#[async_trait]
pub trait TitleGenerator: Send + Sync {
    async fn generate_title(&self, first_user_text: &str) -> Result<String, ColloquyError>;
}

/// Title generator that asks a model endpoint for a summary.
pub struct EndpointTitleGenerator {
    endpoint: Arc<dyn ModelEndpoint>,
}

impl EndpointTitleGenerator {
    pub fn new(endpoint: Arc<dyn ModelEndpoint>) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl TitleGenerator for EndpointTitleGenerator {
    async fn generate_title(&self, first_user_text: &str) -> Result<String, ColloquyError> {
        let request = TurnRequest::builder()
            .messages(vec![Message::system(TITLE_PROMPT), Message::user(first_user_text)])
            .build();
        let mut stream = self
            .endpoint
            .stream_turn(&request, CancellationToken::new())
            .await?;

        let mut raw = String::new();
        while let Some(fragment) = stream.next().await {
            if let Some(text) = fragment?.text {
                raw.push_str(&text);
            }
        }

        let title = clean_title(&raw);
        if title.is_empty() {
            return Err(ColloquyError::Stream("title generation returned no text".into()));
        }
        Ok(title)
    }
}

/// Collapse whitespace, strip wrapping quotes and cap the length.
pub fn clean_title(raw: &str) -> String {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    let whitespace =
        WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex must compile"));
    let collapsed = whitespace.replace_all(raw.trim(), " ");

    let trimmed = collapsed
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '“' | '”'))
        .trim_end_matches('.')
        .trim();

    if trimmed.chars().count() <= MAX_TITLE_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(MAX_TITLE_CHARS).collect();
    cut.trim_end().to_string()
}
