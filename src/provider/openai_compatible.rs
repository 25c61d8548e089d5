//! OpenAI-compatible Chat Completions streaming endpoint.
//!
//! Works against OpenAI itself and the aggregators that mimic it. Tool-call
//! deltas are passed through untouched; whether continuations carry the id or
//! only the index is the reconciler's problem, not this module's.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ColloquyError;
use crate::stream::reconciler::MAX_TOOL_CALL_SLOTS;
use crate::types::{Fragment, Message, MessageKind, ToolCallDelta, Usage};

use super::http::{
    bearer_headers, parse_sse_data, shared_client, status_to_error, SseData, SseLineBuffer,
};
use super::{FragmentStream, ModelEndpoint, TurnRequest};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiCompatibleEndpoint {
    model: String,
    api_key: String,
    base_url: String,
    provider: String,
}

impl OpenAiCompatibleEndpoint {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            provider: "openai-compatible".to_string(),
        }
    }

    /// Override the provider label recorded on assistant messages.
    pub fn with_provider_name(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    fn build_request_body(&self, request: &TurnRequest) -> serde_json::Value {
        let messages = request
            .messages
            .iter()
            .map(message_to_openai)
            .collect::<Vec<_>>();

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
            "stream_options": { "include_usage": true },
        });

        if !request.tools.is_empty() {
            let tool_defs: Vec<serde_json::Value> = request
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = tool_defs.into();
        }

        body
    }
}

#[async_trait]
impl ModelEndpoint for OpenAiCompatibleEndpoint {
    fn provider_name(&self) -> &str {
        &self.provider
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn stream_turn(
        &self,
        request: &TurnRequest,
        cancel: CancellationToken,
    ) -> Result<FragmentStream, ColloquyError> {
        let body = self.build_request_body(request);
        let url = format!("{}/chat/completions", self.base_url);

        debug!(
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "openai-compatible stream_turn"
        );

        let resp = shared_client()
            .post(&url)
            .headers(bearer_headers(&self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }

        let byte_stream = resp.bytes_stream();

        let stream = async_stream::stream! {
            let mut lines = SseLineBuffer::new();
            futures::pin_mut!(byte_stream);

            'read: loop {
                let chunk = tokio::select! {
                    _ = cancel.cancelled() => break 'read,
                    chunk = byte_stream.next() => chunk,
                };
                let Some(chunk) = chunk else {
                    // flush a final line that arrived without a trailing newline
                    match lines.finish() {
                        Some(Ok(tail)) => {
                            if let Some(SseData::Event(data)) = parse_sse_data(&tail) {
                                match parse_chunk(data) {
                                    Ok(Some(fragment)) => yield Ok(fragment),
                                    Ok(None) => {}
                                    Err(err) => yield Err(err),
                                }
                            }
                        }
                        Some(Err(err)) => yield Err(err),
                        None => {}
                    }
                    break 'read;
                };
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(ColloquyError::Network(e));
                        break 'read;
                    }
                };

                lines.push(&chunk);

                while let Some(line) = lines.next_line() {
                    let line = match line {
                        Ok(line) => line,
                        Err(err) => {
                            yield Err(err);
                            break 'read;
                        }
                    };

                    match parse_sse_data(&line) {
                        None => continue,
                        Some(SseData::Done) => break 'read,
                        Some(SseData::Event(data)) => match parse_chunk(data) {
                            Ok(Some(fragment)) => yield Ok(fragment),
                            Ok(None) => {}
                            Err(err) => {
                                yield Err(err);
                                break 'read;
                            }
                        },
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Decode one SSE payload into a fragment. `Ok(None)` for chunks that carry
/// nothing (role-only deltas, finish markers).
pub(crate) fn parse_chunk(data: &str) -> Result<Option<Fragment>, ColloquyError> {
    let chunk: OpenAiStreamChunk = serde_json::from_str(data)?;

    if let Some(error) = chunk.error {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(ColloquyError::Stream(message));
    }

    let mut fragment = Fragment {
        usage: chunk.usage.map(Usage::from),
        ..Default::default()
    };

    if let Some(choice) = chunk.choices.unwrap_or_default().into_iter().next() {
        let delta = choice.delta.unwrap_or_default();
        fragment.text = delta.content.filter(|s| !s.is_empty());
        fragment.reasoning_text = delta
            .reasoning_content
            .or(delta.reasoning)
            .filter(|s| !s.is_empty());
        fragment.tool_call_deltas = delta.tool_calls.unwrap_or_default();
        if let Some(index) = fragment
            .tool_call_deltas
            .iter()
            .filter_map(|d| d.index)
            .find(|index| *index >= MAX_TOOL_CALL_SLOTS)
        {
            return Err(ColloquyError::Stream(format!(
                "tool call index {index} exceeds {MAX_TOOL_CALL_SLOTS} slots"
            )));
        }
    }

    let empty = fragment.text.is_none()
        && fragment.reasoning_text.is_none()
        && fragment.tool_call_deltas.is_empty()
        && fragment.usage.is_none();
    Ok((!empty).then_some(fragment))
}

fn message_to_openai(msg: &Message) -> serde_json::Value {
    match &msg.kind {
        MessageKind::System { content } => {
            serde_json::json!({ "role": "system", "content": content })
        }
        MessageKind::User { content } => {
            serde_json::json!({ "role": "user", "content": content })
        }
        MessageKind::ToolResult {
            content,
            tool_call_id,
            ..
        } => serde_json::json!({
            "role": "tool",
            "tool_call_id": tool_call_id,
            "content": content,
        }),
        MessageKind::Assistant(assistant) => {
            if assistant.tool_calls.is_empty() {
                return serde_json::json!({ "role": "assistant", "content": assistant.content });
            }
            let tool_calls: Vec<serde_json::Value> = assistant
                .tool_calls
                .iter()
                .map(|tc| {
                    serde_json::json!({
                        "id": tc.id,
                        "type": "function",
                        "function": {
                            "name": tc.name,
                            "arguments": tc.arguments,
                        }
                    })
                })
                .collect();
            let content = if assistant.content.is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::Value::String(assistant.content.clone())
            };
            serde_json::json!({
                "role": "assistant",
                "content": content,
                "tool_calls": tool_calls,
            })
        }
    }
}

// OpenAI API stream types (internal)

#[derive(Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Option<Vec<OpenAiStreamChoice>>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    delta: Option<OpenAiStreamDelta>,
}

#[derive(Deserialize, Default)]
struct OpenAiStreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
    #[serde(default)]
    prompt_tokens_details: Option<OpenAiPromptDetails>,
    #[serde(default)]
    completion_tokens_details: Option<OpenAiCompletionDetails>,
}

#[derive(Deserialize)]
struct OpenAiPromptDetails {
    #[serde(default)]
    cached_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct OpenAiCompletionDetails {
    #[serde(default)]
    reasoning_tokens: Option<u32>,
}

impl From<OpenAiUsage> for Usage {
    fn from(u: OpenAiUsage) -> Self {
        Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
            cache_read_tokens: u.prompt_tokens_details.and_then(|d| d.cached_tokens),
            reasoning_tokens: u.completion_tokens_details.and_then(|d| d.reasoning_tokens),
        }
    }
}
