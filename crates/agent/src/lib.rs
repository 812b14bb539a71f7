//! The Synapse troubleshooting agent.
//!
//! One run of [`AgentLoop`] takes a conversation ending in a user message and
//! drives it to a terminal assistant message:
//!
//! 1. **Call the model** with the system prompt, the conversation and the tool definitions
//! 2. **If tool calls**: execute them in order, append one result per call, go to 1
//! 3. **If text**: append it and stop
//!
//! The number of tool rounds is bounded; a run that hits the bound ends with
//! [`RunStatus::LoopExceeded`] instead of looping forever.

pub mod loop_runner;
pub mod session;
pub mod stream_event;

#[cfg(any(test, feature = "test-util"))]
pub mod test_helpers;

use std::sync::Arc;
use synapse_config::AppConfig;
use synapse_core::error::ProviderError;
use tracing::info;

pub use loop_runner::{AgentLoop, AgentRun, DEFAULT_MAX_ITERATIONS, RunOutcome, RunStatus};
pub use session::SessionStore;
pub use stream_event::AgentStreamEvent;

/// Build the agent a configured service runs with.
///
/// Fails when no model provider can be built (e.g. the API key is missing).
/// Tool groups that fail to load are skipped, never fatal.
pub async fn build_agent(config: &AppConfig) -> Result<AgentLoop, ProviderError> {
    let provider = synapse_providers::build_from_config(&config.llm)?;
    let groups = synapse_tools::default_groups(config);
    let tools = Arc::new(synapse_tools::build_registry(&groups).await);
    info!(tools = tools.len(), model = %config.llm.model, "Agent ready");
    Ok(AgentLoop::from_config(provider, tools, config))
}
