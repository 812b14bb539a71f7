use synapse_core::error::NormalizationError;
use thiserror::Error;

/// Failures talking to the retrieval service.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("RAG service unreachable: {0}")]
    Http(String),

    #[error("RAG service timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("RAG service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("RAG service sent an unreadable response: {0}")]
    Decode(String),

    #[error(transparent)]
    Normalization(#[from] NormalizationError),
}
