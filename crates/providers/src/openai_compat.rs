//! OpenAI-compatible provider implementation.
//!
//! Talks to any `/chat/completions` endpoint (OpenAI itself, Azure-style
//! proxies, vLLM). Supports non-streaming and SSE streaming completions with
//! function calling.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use synapse_core::error::ProviderError;
use synapse_core::message::{Message, MessageToolCall, Role};
use synapse_core::provider::*;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::sse::SseLines;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// The hosted OpenAI API.
    pub fn openai(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new("openai", OPENAI_BASE_URL, api_key)
    }

    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::System => "system".into(),
                    Role::Tool => "tool".into(),
                },
                content: Some(m.content.clone()),
                tool_calls: (!m.tool_calls.is_empty()).then(|| {
                    m.tool_calls
                        .iter()
                        .map(|tc| ApiToolCall {
                            id: tc.id.clone(),
                            r#type: "function".into(),
                            function: ApiFunction {
                                name: tc.name.clone(),
                                arguments: tc.arguments.clone(),
                            },
                        })
                        .collect()
                }),
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect()
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    /// Request body shared by both modes. Tools are only bound when present.
    fn request_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": stream,
        });
        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }
        body
    }

    async fn post(&self, body: &serde_json::Value, stream: bool) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if stream {
            builder = builder.header("Accept", "text/event-stream");
        }

        let response = builder.json(body).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(e.to_string())
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        check_status(response).await
    }
}

/// Map non-success HTTP statuses onto provider errors.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();
    match status {
        200..=299 => Ok(response),
        429 => Err(ProviderError::RateLimited { retry_after_secs: 5 }),
        401 | 403 => Err(ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        )),
        _ => {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            if status == 404 {
                return Err(ProviderError::ModelNotFound(error_body));
            }
            Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            })
        }
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        debug!(provider = %self.name, model = %request.model, tools = request.tools.len(), "Sending completion request");

        let body = Self::request_body(&request, false);
        let response = self.post(&body, false).await?;

        let api_response: ApiResponse = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse response: {e}"),
        })?;

        response_to_provider_response(api_response)
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> Result<mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError> {
        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let body = Self::request_body(&request, true);
        let response = self.post(&body, true).await?;

        let (tx, rx) = mpsc::channel(64);
        let provider_name = self.name.clone();

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = SseLines::default();
            let mut parser = SseParser::default();

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
                    match parser.feed(&data) {
                        Ok(chunks) => {
                            for chunk in chunks {
                                let done = chunk.done;
                                if tx.send(Ok(chunk)).await.is_err() || done {
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            trace!(provider = %provider_name, data = %data, error = %e, "Ignoring unparseable SSE chunk");
                        }
                    }
                }
            }

            // Stream ended without [DONE]
            let _ = tx.send(Ok(parser.finish(None))).await;
        });

        Ok(rx)
    }
}

fn response_to_provider_response(api_response: ApiResponse) -> Result<ProviderResponse, ProviderError> {
    let choice = api_response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::ApiError {
            status_code: 200,
            message: "No choices in response".into(),
        })?;

    let tool_calls: Vec<MessageToolCall> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| MessageToolCall {
            id: tc.id,
            name: tc.function.name,
            arguments: tc.function.arguments,
        })
        .collect();

    let content = choice.message.content.unwrap_or_default();
    Ok(ProviderResponse {
        message: Message::assistant_with_tools(content, tool_calls),
        usage: api_response.usage.map(Usage::from),
        model: api_response.model,
        metadata: serde_json::Map::new(),
    })
}

/// Turns SSE `data:` payloads into [`StreamChunk`]s, accumulating tool call
/// fragments (keyed by index, so emission order is stable) until the end.
#[derive(Default)]
struct SseParser {
    tool_calls: BTreeMap<u32, MessageToolCall>,
}

impl SseParser {
    fn feed(&mut self, data: &str) -> Result<Vec<StreamChunk>, serde_json::Error> {
        if data == "[DONE]" {
            return Ok(vec![self.finish(None)]);
        }

        let resp: StreamResponse = serde_json::from_str(data)?;
        let mut out = Vec::new();

        if let Some(choice) = resp.choices.first() {
            for delta in choice.delta.tool_calls.iter().flatten() {
                let acc = self.tool_calls.entry(delta.index).or_insert_with(|| MessageToolCall {
                    id: String::new(),
                    name: String::new(),
                    arguments: String::new(),
                });
                if let Some(id) = &delta.id {
                    acc.id = id.clone();
                }
                if let Some(func) = &delta.function {
                    if let Some(name) = &func.name {
                        acc.name = name.clone();
                    }
                    if let Some(args) = &func.arguments {
                        acc.arguments.push_str(args);
                    }
                }
            }

            if let Some(content) = choice.delta.content.as_ref().filter(|c| !c.is_empty()) {
                out.push(StreamChunk {
                    content: Some(content.clone()),
                    tool_calls: Vec::new(),
                    done: false,
                    usage: None,
                });
            }
        }

        // With stream_options.include_usage the usage chunk is the last one
        if let Some(usage) = resp.usage {
            out.push(self.finish(Some(usage.into())));
        }
        Ok(out)
    }

    fn finish(&mut self, usage: Option<Usage>) -> StreamChunk {
        StreamChunk {
            content: None,
            tool_calls: std::mem::take(&mut self.tool_calls).into_values().collect(),
            done: true,
            usage,
        }
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<ApiUsage> for Usage {
    fn from(u: ApiUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call fragment; only the first one for an index carries the id.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_constructor() {
        let provider = OpenAiCompatProvider::openai("sk-test").unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.base_url, OPENAI_BASE_URL);
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let provider = OpenAiCompatProvider::new("proxy", "http://localhost:4000/v1/", "k").unwrap();
        assert_eq!(provider.base_url, "http://localhost:4000/v1");
    }

    #[test]
    fn tool_messages_convert_to_api_roles() {
        let messages = vec![
            Message::system("You are Synapse"),
            Message::user("why is pod X slow"),
            Message::assistant_with_tools(
                "",
                vec![MessageToolCall {
                    id: "call_1".into(),
                    name: "check_metrics".into(),
                    arguments: r#"{"resource_type":"kubernetes","resource_id":"X"}"#.into(),
                }],
            ),
            Message::tool_result("call_1", "check_metrics", "CPU Usage: 45%"),
        ];
        let api = OpenAiCompatProvider::to_api_messages(&messages);
        let roles: Vec<&str> = api.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "tool"]);
        assert_eq!(api[2].tool_calls.as_ref().unwrap()[0].function.name, "check_metrics");
        assert_eq!(api[3].tool_call_id.as_deref(), Some("call_1"));
        assert!(api[1].tool_calls.is_none());
    }

    fn request(tools: Vec<ToolDefinition>) -> ProviderRequest {
        ProviderRequest::new("gpt-4o-mini", vec![Message::user("hi")])
            .with_max_tokens(Some(256))
            .with_tools(tools)
    }

    #[test]
    fn body_omits_tools_when_none_bound() {
        let body = OpenAiCompatProvider::request_body(&request(vec![]), false);
        assert!(body.get("tools").is_none());
        assert_eq!(body["max_tokens"], 256);
        assert!(body.get("stream_options").is_none());
    }

    #[test]
    fn body_binds_tools_and_stream_options() {
        let tools = vec![ToolDefinition {
            name: "query_logs".into(),
            description: "Search logs".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let body = OpenAiCompatProvider::request_body(&request(tools), true);
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "query_logs");
        assert_eq!(body["stream_options"]["include_usage"], true);
    }

    #[test]
    fn completion_response_maps_tool_calls() {
        let raw = r#"{
            "model": "gpt-4o-mini-2024-07-18",
            "choices": [{"message": {"role": "assistant", "content": null,
                "tool_calls": [{"id": "call_1", "type": "function",
                    "function": {"name": "query_logs", "arguments": "{\"query\":\"timeout\"}"}}]}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }"#;
        let api: ApiResponse = serde_json::from_str(raw).unwrap();
        let resp = response_to_provider_response(api).unwrap();
        assert_eq!(resp.message.role, Role::Assistant);
        assert_eq!(resp.message.content, "");
        assert_eq!(resp.message.tool_calls[0].name, "query_logs");
        assert_eq!(resp.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn empty_choices_is_an_error() {
        let api: ApiResponse = serde_json::from_str(r#"{"model":"m","choices":[]}"#).unwrap();
        assert!(response_to_provider_response(api).is_err());
    }

    #[test]
    fn parser_emits_content_deltas() {
        let mut parser = SseParser::default();
        let chunks = parser
            .feed(r#"{"choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#)
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content.as_deref(), Some("Hel"));
        assert!(!chunks[0].done);

        let chunks = parser.feed(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn parser_accumulates_tool_call_fragments_in_index_order() {
        let mut parser = SseParser::default();
        parser
            .feed(r#"{"choices":[{"delta":{"tool_calls":[{"index":1,"id":"call_b","function":{"name":"query_logs","arguments":""}},{"index":0,"id":"call_a","function":{"name":"check_metrics","arguments":"{\"resource_"}}]}}]}"#)
            .unwrap();
        parser
            .feed(r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"type\":\"kubernetes\"}"}}]}}]}"#)
            .unwrap();

        let done = parser.feed("[DONE]").unwrap();
        assert_eq!(done.len(), 1);
        let chunk = &done[0];
        assert!(chunk.done);
        assert_eq!(chunk.tool_calls.len(), 2);
        assert_eq!(chunk.tool_calls[0].id, "call_a");
        assert_eq!(chunk.tool_calls[0].arguments, r#"{"resource_type":"kubernetes"}"#);
        assert_eq!(chunk.tool_calls[1].name, "query_logs");
    }

    #[test]
    fn parser_usage_chunk_finishes_stream() {
        let mut parser = SseParser::default();
        let chunks = parser
            .feed(r#"{"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#)
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].done);
        assert_eq!(chunks[0].usage.as_ref().unwrap().prompt_tokens, 10);
    }

    #[test]
    fn parser_rejects_garbage() {
        let mut parser = SseParser::default();
        assert!(parser.feed("{not json").is_err());
    }

    #[tokio::test]
    async fn stream_keeps_characters_split_across_reads() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"café\"}}]}\n\ndata: [DONE]\n\n";
        let base_url = crate::sse::serve_chunked(crate::sse::split_inside_char(body)).await;
        let provider = OpenAiCompatProvider::new("proxy", base_url, "k").unwrap();

        let mut rx = provider
            .stream(ProviderRequest::new("gpt-4o-mini", vec![Message::user("hi")]))
            .await
            .unwrap();

        let mut content = String::new();
        while let Some(chunk) = rx.recv().await {
            let chunk = chunk.unwrap();
            content.push_str(chunk.content.as_deref().unwrap_or_default());
            if chunk.done {
                break;
            }
        }
        assert_eq!(content, "café");
    }
}
