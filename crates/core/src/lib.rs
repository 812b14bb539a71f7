//! # Synapse Core
//!
//! Domain types, traits, and error definitions for the Synapse agents
//! service. Nothing here talks to the network; the provider and tool traits
//! are implemented by the crates that do.

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

pub use error::{NormalizationError, ProviderError, ToolError};
pub use message::{Conversation, Message, MessageToolCall, Role, Route, SessionId};
pub use provider::{ChunkReceiver, DEFAULT_TEMPERATURE, Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolDefinition, Usage};
pub use tool::{ERROR_MARKER, ParamKind, ParamSpec, Tool, ToolArgs, ToolCall, ToolRegistry, ToolResult};
