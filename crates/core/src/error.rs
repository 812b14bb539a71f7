//! Error types shared across the Synapse crates.
//!
//! One `thiserror` enum per failure domain. Crates that add their own
//! failure modes (RAG transport, configuration) define local enums and wrap
//! these where they meet.

use thiserror::Error;

/// Failures of the language model backend. Terminal for the current turn.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Whether retrying the same request later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::StreamInterrupted(_) | Self::Timeout(_) | Self::Network(_)
        ) || matches!(self, Self::ApiError { status_code, .. } if *status_code >= 500)
    }
}

/// Failures while dispatching a tool invocation.
///
/// None of these escape the agent loop; they are rendered into the tool
/// result text so the model can correct itself.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    NotFound(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },
}

/// A retrieval document could not be mapped onto the canonical shape.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizationError {
    #[error("document is not a JSON object")]
    NotAnObject,

    #[error("required field `{field}` not found (tried: {})", candidates.join(", "))]
    MissingField {
        field: &'static str,
        candidates: Vec<&'static str>,
    },
}
