//! Configuration loading and validation for the Synapse agents service.
//!
//! Loads `synapse.toml` (or an explicit path) and then applies environment
//! variable overrides, so a container can be configured with env alone.
//! Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "synapse.toml";

/// The root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// "development", "staging" or "production"
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Default tracing filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub rag: RagConfig,

    #[serde(default)]
    pub agent: AgentSettings,
}

fn default_service_name() -> String {
    "synapse-agents".into()
}
fn default_environment() -> String {
    "development".into()
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}
fn default_true() -> bool {
    true
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Origins allowed by the CORS layer
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8000
}
fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".into(),
        "http://localhost:5173".into(),
        "http://localhost:5174".into(),
    ]
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
        }
    }
}

/// Language model settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "openai" or "anthropic"
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic_api_key: Option<String>,

    /// Override the provider's API base URL (proxies, compatible servers)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

fn default_llm_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    4096
}

pub const SUPPORTED_PROVIDERS: &[&str] = &["openai", "anthropic"];

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            openai_api_key: None,
            anthropic_api_key: None,
            base_url: None,
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("anthropic_api_key", &redact(&self.anthropic_api_key))
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl LlmConfig {
    /// The API key for the selected provider, if configured.
    pub fn api_key(&self) -> Option<&str> {
        match self.provider.as_str() {
            "openai" => self.openai_api_key.as_deref(),
            "anthropic" => self.anthropic_api_key.as_deref(),
            _ => None,
        }
        .filter(|k| !k.is_empty())
    }

    /// Fail when the selected provider has no API key.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key()
            .ok_or_else(|| ConfigError::MissingApiKey(self.provider.clone()))
    }
}

/// Retrieval (RAG) service settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default = "default_rag_url")]
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_rag_timeout_ms")]
    pub timeout_ms: u64,

    /// Skip the retrieval tools at startup if the service is unreachable
    #[serde(default = "default_true")]
    pub probe_on_startup: bool,
}

fn default_rag_url() -> String {
    "http://rag-service:8080".into()
}
fn default_rag_timeout_ms() -> u64 {
    30_000
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            url: default_rag_url(),
            api_key: None,
            timeout_ms: default_rag_timeout_ms(),
            probe_on_startup: true,
        }
    }
}

impl std::fmt::Debug for RagConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagConfig")
            .field("url", &self.url)
            .field("api_key", &redact(&self.api_key))
            .field("timeout_ms", &self.timeout_ms)
            .field("probe_on_startup", &self.probe_on_startup)
            .finish()
    }
}

/// Control loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Maximum tool-execution rounds per run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// In-memory session cap; the oldest session is evicted beyond it
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_tool_timeout_secs() -> u64 {
    30
}
fn default_max_sessions() -> usize {
    1000
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tool_timeout_secs: default_tool_timeout_secs(),
            max_sessions: default_max_sessions(),
        }
    }
}

impl AppConfig {
    /// Load `./synapse.toml` (or `path`) and apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        let mut config = Self::load_from(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, without env overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production, a map in tests). Unparseable numbers are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("HOST") {
            self.gateway.host = v;
        }
        if let Some(port) = lookup("PORT").and_then(|v| v.parse().ok()) {
            self.gateway.port = port;
        }
        if let Some(v) = lookup("ENVIRONMENT") {
            self.environment = v;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log_level = v.to_lowercase();
        }
        if let Some(v) = lookup("LLM_PROVIDER") {
            self.llm.provider = v.to_lowercase();
        }
        if let Some(v) = lookup("LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = lookup("OPENAI_API_KEY") {
            self.llm.openai_api_key = Some(v);
        }
        if let Some(v) = lookup("ANTHROPIC_API_KEY") {
            self.llm.anthropic_api_key = Some(v);
        }
        if let Some(v) = lookup("RAG_SERVICE_URL") {
            self.rag.url = v;
        }
        if let Some(v) = lookup("RAG_SERVICE_API_KEY") {
            self.rag.api_key = Some(v);
        }
        if let Some(ms) = lookup("RAG_SERVICE_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.rag.timeout_ms = ms;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !SUPPORTED_PROVIDERS.contains(&self.llm.provider.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "llm.provider must be one of {}, got '{}'",
                SUPPORTED_PROVIDERS.join(", "),
                self.llm.provider
            )));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        if self.agent.tool_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent.tool_timeout_secs must be at least 1".into(),
            ));
        }

        if self.rag.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "rag.timeout_ms must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            environment: default_environment(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            gateway: GatewayConfig::default(),
            llm: LlmConfig::default(),
            rag: RagConfig::default(),
            agent: AgentSettings::default(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("No API key configured for LLM provider '{0}'")]
    MissingApiKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.gateway.port, 8000);
        assert_eq!(config.rag.url, "http://rag-service:8080");
        assert_eq!(config.agent.max_iterations, 10);
        assert!(config.is_development());
        assert!(!config.is_production());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.llm.provider, config.llm.provider);
        assert_eq!(parsed.gateway.cors_origins, config.gateway.cors_origins);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("synapse.toml");
        std::fs::write(
            &path,
            r#"
environment = "production"

[llm]
provider = "anthropic"
model = "claude-3-5-haiku-latest"

[agent]
max_iterations = 4
"#,
        )
        .unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert!(config.is_production());
        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.agent.max_iterations, 4);
        assert_eq!(config.agent.tool_timeout_secs, 30);
        assert_eq!(config.gateway.port, 8000);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("synapse.toml");
        std::fs::write(&path, "[llm\nprovider = ").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn invalid_values_rejected() {
        let mut config = AppConfig::default();
        config.llm.temperature = 5.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.llm.provider = "gemini".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("gemini"));

        let mut config = AppConfig::default();
        config.agent.max_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_tool_timeout_rejected() {
        let config: AppConfig = toml::from_str("[agent]\ntool_timeout_secs = 0\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("agent.tool_timeout_secs"));

        let config: AppConfig = toml::from_str("[agent]\ntool_timeout_secs = 1\n").unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/synapse.toml")).unwrap();
        assert_eq!(config.service_name, "synapse-agents");
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        config.apply_overrides(env(&[
            ("PORT", "9090"),
            ("LOG_LEVEL", "DEBUG"),
            ("LLM_PROVIDER", "Anthropic"),
            ("ANTHROPIC_API_KEY", "sk-ant"),
            ("RAG_SERVICE_URL", "http://localhost:8080"),
            ("RAG_SERVICE_TIMEOUT", "1500"),
        ]));
        assert_eq!(config.gateway.port, 9090);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.llm.api_key(), Some("sk-ant"));
        assert_eq!(config.rag.url, "http://localhost:8080");
        assert_eq!(config.rag.timeout_ms, 1500);
    }

    #[test]
    fn unparseable_numeric_override_is_ignored() {
        let mut config = AppConfig::default();
        config.apply_overrides(env(&[("PORT", "eighty")]));
        assert_eq!(config.gateway.port, 8000);
    }

    #[test]
    fn api_key_follows_selected_provider() {
        let mut llm = LlmConfig {
            openai_api_key: Some("sk-openai".into()),
            ..LlmConfig::default()
        };
        assert_eq!(llm.require_api_key().unwrap(), "sk-openai");

        llm.provider = "anthropic".into();
        let err = llm.require_api_key().unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiKey(ref p) if p == "anthropic"));

        llm.anthropic_api_key = Some(String::new());
        assert!(llm.api_key().is_none());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let mut config = AppConfig::default();
        config.llm.openai_api_key = Some("sk-secret".into());
        config.rag.api_key = Some("rag-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(!debug.contains("rag-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
