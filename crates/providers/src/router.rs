//! Provider selection from configuration.

use std::sync::Arc;
use synapse_config::LlmConfig;
use synapse_core::error::ProviderError;
use synapse_core::provider::Provider;
use tracing::info;

use crate::anthropic::AnthropicProvider;
use crate::openai_compat::{OPENAI_BASE_URL, OpenAiCompatProvider};

/// Build the configured provider.
///
/// Fails with [`ProviderError::NotConfigured`] when the provider is unknown
/// or has no API key, so the caller can report why the agent is unavailable.
pub fn build_from_config(config: &LlmConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let api_key = config
        .require_api_key()
        .map_err(|e| ProviderError::NotConfigured(e.to_string()))?;

    let provider: Arc<dyn Provider> = match config.provider.as_str() {
        "openai" => {
            let base_url = config.base_url.as_deref().unwrap_or(OPENAI_BASE_URL);
            Arc::new(OpenAiCompatProvider::new("openai", base_url, api_key)?)
        }
        "anthropic" => {
            let mut p = AnthropicProvider::new(api_key)?;
            if let Some(base_url) = &config.base_url {
                p = p.with_base_url(base_url);
            }
            Arc::new(p)
        }
        other => {
            return Err(ProviderError::NotConfigured(format!("unsupported LLM provider '{other}'")));
        }
    };

    info!(provider = provider.name(), model = %config.model, "LLM provider ready");
    Ok(provider)
}
