//! Scripted providers and tools for loop tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use synapse_core::error::{ProviderError, ToolError};
use synapse_core::message::{Message, MessageToolCall};
use synapse_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use synapse_core::tool::{ParamSpec, Tool, ToolArgs, ToolResult};

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue.
/// Panics if more calls are made than responses provided, unless built with
/// [`always_tool`](Self::always_tool).
pub struct SequentialMockProvider {
    responses: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    repeat: Option<ProviderResponse>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self::from_results(responses.into_iter().map(Ok).collect())
    }

    pub fn from_results(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a provider that returns a single text response (no tool calls).
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    /// Create a provider that first returns tool calls, then a final answer.
    pub fn tool_then_answer(tool_calls: Vec<MessageToolCall>, thought: &str, answer: &str) -> Self {
        Self::new(vec![
            make_tool_call_response(tool_calls, thought),
            make_text_response(answer),
        ])
    }

    /// A model that never stops asking for the same tool.
    pub fn always_tool(call: MessageToolCall) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            repeat: Some(make_tool_call_response(vec![call], "")),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };

        if let Some(repeat) = &self.repeat {
            return Ok(repeat.clone());
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("SequentialMockProvider: no more responses (call #{call})"))
    }
}

/// A tool that never finishes.
pub struct PendingTool;

#[async_trait]
impl Tool for PendingTool {
    fn name(&self) -> &str {
        "pending"
    }

    fn description(&self) -> &str {
        "Waits forever."
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![]
    }

    async fn execute(&self, _args: ToolArgs) -> Result<ToolResult, ToolError> {
        std::future::pending().await
    }
}

fn usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: usage(),
        model: "mock-model".into(),
        metadata: serde_json::Map::new(),
    }
}

/// Create a response with tool calls and optional thought content.
pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_with_tools(thought, tool_calls),
        usage: usage(),
        model: "mock-model".into(),
        metadata: serde_json::Map::new(),
    }
}

/// Helper to create a tool call.
pub fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}
