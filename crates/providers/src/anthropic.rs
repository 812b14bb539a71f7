//! Anthropic Messages API provider.
//!
//! Differences from the OpenAI wire format that matter here:
//! - `x-api-key` header authentication plus a pinned `anthropic-version`
//! - the system prompt is a top-level field, not a message
//! - tool calls are `tool_use` content blocks; their answers are
//!   `tool_result` blocks inside a user turn
//! - streaming uses typed SSE events (`content_block_delta`, `message_stop`)

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use synapse_core::error::ProviderError;
use synapse_core::message::{Message, MessageToolCall, Role};
use synapse_core::provider::*;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::sse::SseLines;

const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: ANTHROPIC_BASE_URL.into(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Point at a proxy or test server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Split system messages out into the top-level `system` field.
    fn extract_system(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
        let (system, rest): (Vec<&Message>, Vec<&Message>) =
            messages.iter().partition(|m| m.role == Role::System);
        let system = (!system.is_empty()).then(|| {
            system
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n")
        });
        (system, rest)
    }

    /// Convert messages to content-block form. Consecutive tool results are
    /// folded into a single user turn so every `tool_use` of one assistant
    /// turn is answered together.
    fn to_api_messages(messages: &[&Message]) -> Vec<AnthropicMessage> {
        let mut result: Vec<AnthropicMessage> = Vec::new();

        for msg in messages {
            match msg.role {
                Role::User => result.push(AnthropicMessage {
                    role: "user".into(),
                    content: AnthropicContent::Text(msg.content.clone()),
                }),
                Role::Assistant if msg.tool_calls.is_empty() => result.push(AnthropicMessage {
                    role: "assistant".into(),
                    content: AnthropicContent::Text(msg.content.clone()),
                }),
                Role::Assistant => {
                    let mut blocks = Vec::new();
                    if !msg.content.is_empty() {
                        blocks.push(ContentBlock::Text {
                            text: msg.content.clone(),
                        });
                    }
                    for tc in &msg.tool_calls {
                        blocks.push(ContentBlock::ToolUse {
                            id: tc.id.clone(),
                            name: tc.name.clone(),
                            input: serde_json::from_str(&tc.arguments)
                                .unwrap_or_else(|_| serde_json::json!({})),
                        });
                    }
                    result.push(AnthropicMessage {
                        role: "assistant".into(),
                        content: AnthropicContent::Blocks(blocks),
                    });
                }
                Role::Tool => {
                    let block = ContentBlock::ToolResult {
                        tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                        content: msg.content.clone(),
                    };
                    if let Some(AnthropicMessage {
                        role,
                        content: AnthropicContent::Blocks(blocks),
                    }) = result.last_mut()
                    {
                        if role.as_str() == "user" {
                            blocks.push(block);
                            continue;
                        }
                    }
                    result.push(AnthropicMessage {
                        role: "user".into(),
                        content: AnthropicContent::Blocks(vec![block]),
                    });
                }
                Role::System => {}
            }
        }

        result
    }

    fn request_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let (system, messages) = Self::extract_system(&request.messages);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&messages),
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": request.temperature,
        });
        if stream {
            body["stream"] = serde_json::json!(true);
        }
        if let Some(sys) = system {
            body["system"] = serde_json::json!(sys);
        }
        if !request.tools.is_empty() {
            let tools: Vec<AnthropicTool> = request
                .tools
                .iter()
                .map(|t| AnthropicTool {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: t.parameters.clone(),
                })
                .collect();
            body["tools"] = serde_json::json!(tools);
        }
        body
    }

    async fn post(&self, body: &serde_json::Value) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        match status {
            200..=299 => Ok(response),
            429 => Err(ProviderError::RateLimited { retry_after_secs: 5 }),
            401 | 403 => Err(ProviderError::AuthenticationFailed("Invalid Anthropic API key".into())),
            _ => {
                let error_body = response.text().await.unwrap_or_default();
                warn!(status, body = %error_body, "Anthropic API error");
                Err(ProviderError::ApiError {
                    status_code: status,
                    message: error_body,
                })
            }
        }
    }

    fn response_to_provider_response(resp: AnthropicResponse) -> ProviderResponse {
        let mut text = Vec::new();
        let mut tool_calls = Vec::new();

        for block in resp.content {
            match block {
                ResponseContentBlock::Text { text: t } => text.push(t),
                ResponseContentBlock::ToolUse { id, name, input } => tool_calls.push(MessageToolCall {
                    id,
                    name,
                    arguments: input.to_string(),
                }),
                ResponseContentBlock::Other => {}
            }
        }

        let mut message = Message::assistant_with_tools(text.join("\n"), tool_calls);
        message.id = resp.id;

        ProviderResponse {
            message,
            usage: Some(Usage {
                prompt_tokens: resp.usage.input_tokens,
                completion_tokens: resp.usage.output_tokens,
                total_tokens: resp.usage.input_tokens + resp.usage.output_tokens,
            }),
            model: resp.model,
            metadata: serde_json::Map::new(),
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        debug!(provider = "anthropic", model = %request.model, tools = request.tools.len(), "Sending completion request");

        let response = self.post(&Self::request_body(&request, false)).await?;
        let api_resp: AnthropicResponse = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse Anthropic response: {e}"),
        })?;

        Ok(Self::response_to_provider_response(api_resp))
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> Result<mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError> {
        debug!(provider = "anthropic", model = %request.model, "Sending streaming request");

        let response = self.post(&Self::request_body(&request, true)).await?;
        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = SseLines::default();
            let mut state = StreamState::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(Err(ProviderError::StreamInterrupted(e.to_string()))).await;
                        return;
                    }
                };
                lines.push(&bytes);

                while let Some(data) = lines.next_data() {
                    let event: serde_json::Value = match serde_json::from_str(&data) {
                        Ok(v) => v,
                        Err(e) => {
                            trace!(error = %e, "Ignoring unparseable Anthropic SSE");
                            continue;
                        }
                    };
                    if let Some(chunk) = state.apply(&event) {
                        let done = chunk.done;
                        if tx.send(Ok(chunk)).await.is_err() || done {
                            return;
                        }
                    }
                }
            }

            // Stream ended without message_stop
            let _ = tx.send(Ok(state.finish())).await;
        });

        Ok(rx)
    }
}

/// Tracks the tool_use block currently being streamed.
#[derive(Default)]
struct StreamState {
    current: Option<MessageToolCall>,
    tool_calls: Vec<MessageToolCall>,
    usage: Option<Usage>,
}

impl StreamState {
    /// Apply one SSE event; returns a chunk to forward, if any.
    fn apply(&mut self, event: &serde_json::Value) -> Option<StreamChunk> {
        match event["type"].as_str().unwrap_or("") {
            "message_start" => {
                if let Some(input) = event["message"]["usage"]["input_tokens"].as_u64() {
                    self.usage = Some(Usage {
                        prompt_tokens: input as u32,
                        completion_tokens: 0,
                        total_tokens: input as u32,
                    });
                }
                None
            }
            "content_block_start" => {
                let block = &event["content_block"];
                if block["type"] == "tool_use" {
                    self.close_tool();
                    self.current = Some(MessageToolCall {
                        id: block["id"].as_str().unwrap_or_default().to_string(),
                        name: block["name"].as_str().unwrap_or_default().to_string(),
                        arguments: String::new(),
                    });
                }
                None
            }
            "content_block_delta" => {
                let delta = &event["delta"];
                match delta["type"].as_str() {
                    Some("text_delta") => delta["text"].as_str().map(|text| StreamChunk {
                        content: Some(text.to_string()),
                        tool_calls: Vec::new(),
                        done: false,
                        usage: None,
                    }),
                    Some("input_json_delta") => {
                        if let (Some(call), Some(partial)) = (self.current.as_mut(), delta["partial_json"].as_str()) {
                            call.arguments.push_str(partial);
                        }
                        None
                    }
                    _ => None,
                }
            }
            "content_block_stop" => {
                self.close_tool();
                None
            }
            "message_delta" => {
                if let Some(out) = event["usage"]["output_tokens"].as_u64() {
                    let usage = self.usage.get_or_insert(Usage {
                        prompt_tokens: 0,
                        completion_tokens: 0,
                        total_tokens: 0,
                    });
                    usage.completion_tokens = out as u32;
                    usage.total_tokens = usage.prompt_tokens + out as u32;
                }
                None
            }
            "message_stop" => Some(self.finish()),
            _ => None,
        }
    }

    fn close_tool(&mut self) {
        if let Some(mut call) = self.current.take() {
            if call.arguments.is_empty() {
                call.arguments = "{}".into();
            }
            self.tool_calls.push(call);
        }
    }

    fn finish(&mut self) -> StreamChunk {
        self.close_tool();
        StreamChunk {
            content: None,
            tool_calls: std::mem::take(&mut self.tool_calls),
            done: true,
            usage: self.usage.take(),
        }
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: AnthropicContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult { tool_use_id: String, content: String },
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    model: String,
    content: Vec<ResponseContentBlock>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}
