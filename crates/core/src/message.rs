//! Message and Conversation domain types.
//!
//! A conversation is the append-only message log of one session. The agent
//! loop is the only writer; it appends model responses and tool results in
//! the order they happen.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Externally supplied identifier scoping one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random session id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    /// Tool execution result
    Tool,
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,

    pub role: Role,

    pub content: String,

    /// Tool invocations requested by the assistant
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// For tool results: the invocation this answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// For tool results: the tool that produced it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    pub timestamp: DateTime<Utc>,

    /// Free-form metadata (e.g. the structured `error` of a failed model call)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    fn with_role(role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
            timestamp: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content.into())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content.into())
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content.into())
    }

    /// An assistant message carrying tool invocation requests.
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<MessageToolCall>) -> Self {
        let mut msg = Self::assistant(content);
        msg.tool_calls = tool_calls;
        msg
    }

    /// The answer to a single tool invocation.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::with_role(Role::Tool, content.into());
        msg.tool_call_id = Some(tool_call_id.into());
        msg.tool_name = Some(tool_name.into());
        msg
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageToolCall {
    pub id: String,

    pub name: String,

    /// Arguments as a raw JSON string, exactly as the model produced them
    pub arguments: String,
}

/// Where the control loop routes the conversation next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Waiting on the model
    #[default]
    Agent,
    /// Pending tool invocations
    Tools,
    /// A terminal message was produced
    End,
}

/// The ordered, append-only message log of one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: SessionId,

    messages: Vec<Message>,

    #[serde(default)]
    pub route: Route,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            id,
            messages: Vec::new(),
            route: Route::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message. The only way to mutate the log.
    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Names of every tool requested in this conversation, first occurrence order.
    pub fn tools_used(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for call in self.messages.iter().flat_map(|m| &m.tool_calls) {
            if !names.contains(&call.name) {
                names.push(call.name.clone());
            }
        }
        names
    }
}
