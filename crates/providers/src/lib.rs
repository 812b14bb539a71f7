//! LLM provider implementations for Synapse.
//!
//! All providers implement the `synapse_core::Provider` trait.
//! [`router::build_from_config`] picks one based on configuration.

pub mod anthropic;
pub mod openai_compat;
pub mod router;
mod sse;

pub use anthropic::AnthropicProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::build_from_config;
