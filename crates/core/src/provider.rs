//! The seam between the agent loop and an LLM backend.
//!
//! The loop builds a [`ProviderRequest`] from the conversation and the tool
//! registry, then asks a [`Provider`] for the next assistant message, whole
//! or as a stream of deltas.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::message::{Message, MessageToolCall};

/// Model temperature used when a request does not set one.
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

/// What the agent loop sends for one model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub model: String,

    /// System prompt first, then the session history.
    pub messages: Vec<Message>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Tools bound for this call. Empty means the model answers in text only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

impl ProviderRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
            tools: Vec::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// A tool as advertised to the model: name, description, JSON Schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub message: Message,

    pub usage: Option<Usage>,

    /// The model that answered, which may differ from the one requested.
    pub model: String,

    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One streamed delta.
///
/// Tool call deltas sharing an `id` are fragments of one call; the consumer
/// concatenates their `arguments`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// Set on the last chunk of a turn.
    #[serde(default)]
    pub done: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl StreamChunk {
    /// A whole response delivered as a single final chunk.
    pub fn from_response(response: ProviderResponse) -> Self {
        Self {
            content: Some(response.message.content).filter(|c| !c.is_empty()),
            tool_calls: response.message.tool_calls,
            done: true,
            usage: response.usage,
        }
    }
}

/// Receiving end of a streamed model turn.
pub type ChunkReceiver = mpsc::Receiver<Result<StreamChunk, ProviderError>>;

/// An LLM backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short backend name, reported in chat metadata (e.g. "openai").
    fn name(&self) -> &str;

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError>;

    /// Stream the next message as deltas.
    ///
    /// Backends without native streaming get this default, which runs
    /// `complete()` and sends the result as one final chunk.
    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let response = self.complete(request).await?;
        let (tx, rx) = mpsc::channel(1);
        let _ = tx.send(Ok(StreamChunk::from_response(response))).await;
        Ok(rx)
    }

    /// Whether the backend is reachable with the configured credentials.
    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Provider for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            let last = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(ProviderResponse {
                message: Message::assistant(last),
                usage: None,
                model: request.model,
                metadata: serde_json::Map::new(),
            })
        }
    }

    #[test]
    fn request_builder_defaults() {
        let req = ProviderRequest::new("gpt-4o-mini", vec![Message::user("hi")]);
        assert!((req.temperature - DEFAULT_TEMPERATURE).abs() < f32::EPSILON);
        assert!(req.max_tokens.is_none());
        assert!(req.tools.is_empty());

        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("tools").is_none());
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn tool_definition_serialization() {
        let tool = ToolDefinition {
            name: "query_logs".into(),
            description: "Search application logs".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search text" }
                },
                "required": ["query"]
            }),
        };
        let req = ProviderRequest::new("m", vec![])
            .with_temperature(0.5)
            .with_max_tokens(Some(512))
            .with_tools(vec![tool.clone()]);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["tools"][0]["name"], "query_logs");
        assert_eq!(json["max_tokens"], 512);
        assert_eq!(req.tools, vec![tool]);
    }

    #[tokio::test]
    async fn default_stream_sends_one_final_chunk() {
        let mut rx = Echo
            .stream(ProviderRequest::new("m", vec![Message::user("disk is full")]))
            .await
            .unwrap();

        let chunk = rx.recv().await.unwrap().unwrap();
        assert_eq!(chunk.content.as_deref(), Some("disk is full"));
        assert!(chunk.done);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn empty_content_is_not_a_delta() {
        let chunk = StreamChunk::from_response(ProviderResponse {
            message: Message::assistant_with_tools(
                "",
                vec![MessageToolCall {
                    id: "c1".into(),
                    name: "check_metrics".into(),
                    arguments: "{}".into(),
                }],
            ),
            usage: None,
            model: "m".into(),
            metadata: serde_json::Map::new(),
        });
        assert!(chunk.content.is_none());
        assert_eq!(chunk.tool_calls.len(), 1);
    }
}
