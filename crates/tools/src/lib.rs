//! Troubleshooting tools for the Synapse agent.
//!
//! Tools are loaded in groups. The retrieval group needs the RAG service;
//! the infrastructure group needs an [`InfraBackend`]. A group that fails to
//! load is skipped and the agent runs with whatever loaded.

pub mod infrastructure;
pub mod retrieval;

use async_trait::async_trait;
use std::sync::Arc;
use synapse_config::AppConfig;
use synapse_core::tool::{Tool, ToolRegistry};
use synapse_rag::{RagClient, RetrievalBackend};
use thiserror::Error;
use tracing::{info, warn};

pub use infrastructure::{
    AnalyzeHealthTool, CheckMetricsTool, InfraBackend, InfraError, MockInfraBackend, QueryLogsTool,
};
pub use retrieval::{RetrieveContextTool, SearchDocumentationTool, SearchIncidentLogsTool};

#[derive(Debug, Error)]
#[error("tool group `{group}` unavailable: {reason}")]
pub struct GroupLoadError {
    pub group: String,
    pub reason: String,
}

/// A set of tools that is loaded, or skipped, as a unit.
#[async_trait]
pub trait ToolGroup: Send + Sync {
    fn name(&self) -> &str;

    async fn load(&self) -> Result<Vec<Box<dyn Tool>>, GroupLoadError>;
}

/// `search_documentation`, `retrieve_context`, `search_incident_logs`.
pub struct RetrievalGroup {
    backend: Arc<dyn RetrievalBackend>,
    probe: bool,
}

impl RetrievalGroup {
    /// With `probe` set, loading fails unless the backend answers its health check.
    pub fn new(backend: Arc<dyn RetrievalBackend>, probe: bool) -> Self {
        Self { backend, probe }
    }
}

#[async_trait]
impl ToolGroup for RetrievalGroup {
    fn name(&self) -> &str {
        "retrieval"
    }

    async fn load(&self) -> Result<Vec<Box<dyn Tool>>, GroupLoadError> {
        if self.probe && !self.backend.is_available().await {
            return Err(GroupLoadError {
                group: self.name().into(),
                reason: "RAG service did not answer its health check".into(),
            });
        }
        Ok(vec![
            Box::new(SearchDocumentationTool::new(self.backend.clone())),
            Box::new(RetrieveContextTool::new(self.backend.clone())),
            Box::new(SearchIncidentLogsTool::new(self.backend.clone())),
        ])
    }
}

/// `check_metrics`, `query_logs`, `analyze_health`.
pub struct InfrastructureGroup {
    backend: Arc<dyn InfraBackend>,
}

impl InfrastructureGroup {
    pub fn new(backend: Arc<dyn InfraBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ToolGroup for InfrastructureGroup {
    fn name(&self) -> &str {
        "infrastructure"
    }

    async fn load(&self) -> Result<Vec<Box<dyn Tool>>, GroupLoadError> {
        Ok(vec![
            Box::new(CheckMetricsTool::new(self.backend.clone())),
            Box::new(QueryLogsTool::new(self.backend.clone())),
            Box::new(AnalyzeHealthTool::new(self.backend.clone())),
        ])
    }
}

/// The groups a configured service runs with.
pub fn default_groups(config: &AppConfig) -> Vec<Box<dyn ToolGroup>> {
    let mut groups: Vec<Box<dyn ToolGroup>> = Vec::new();
    match RagClient::new(&config.rag) {
        Ok(client) => groups.push(Box::new(RetrievalGroup::new(
            Arc::new(client),
            config.rag.probe_on_startup,
        ))),
        Err(e) => warn!(error = %e, "Could not build RAG client; retrieval tools disabled"),
    }
    groups.push(Box::new(InfrastructureGroup::new(Arc::new(MockInfraBackend))));
    groups
}

/// Load every group into one registry, skipping groups that fail.
pub async fn build_registry(groups: &[Box<dyn ToolGroup>]) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for group in groups {
        match group.load().await {
            Ok(tools) => {
                info!(group = group.name(), count = tools.len(), "Loaded tool group");
                for tool in tools {
                    registry.register(tool);
                }
            }
            Err(e) => warn!(group = group.name(), error = %e, "Skipping tool group"),
        }
    }
    registry
}
