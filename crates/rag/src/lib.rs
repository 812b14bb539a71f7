//! Retrieval (RAG) service integration.
//!
//! [`normalize`] reconciles the document shapes different retrieval
//! backends return; [`client`] is the HTTP client that applies it.

pub mod client;
pub mod error;
pub mod normalize;
pub mod types;

pub use client::{RagClient, RetrievalBackend};
pub use error::RagError;
pub use normalize::normalize_document;
pub use types::{RagDocument, RagHealth, RagIndexStats, RagQueryParams, RagQueryResponse, RagRetrievalResponse};
