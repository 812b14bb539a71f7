//! Infrastructure tools: metrics, logs and health of a named resource.
//!
//! Data comes from an [`InfraBackend`]. Only [`MockInfraBackend`] exists so
//! far; it serves fixed readings so the agent can be exercised end to end.

use async_trait::async_trait;
use std::fmt::{self, Write};
use std::sync::Arc;
use synapse_core::error::ToolError;
use synapse_core::tool::{ParamSpec, Tool, ToolArgs, ToolResult};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("resource {0} not found")]
    NotFound(String),

    #[error("infrastructure backend unavailable: {0}")]
    Unavailable(String),
}

/// A resource addressed as `type/id`, e.g. `kubernetes/api-7f9c`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub kind: String,
    pub id: String,
}

impl Resource {
    fn from_args(args: &ToolArgs) -> Result<Self, ToolError> {
        Ok(Self {
            kind: args.str("resource_type")?.to_string(),
            id: args.str("resource_id")?.to_string(),
        })
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Cpu,
    Memory,
    Disk,
    Network,
}

impl MetricKind {
    /// Parse a comma-separated list, silently dropping unknown kinds.
    pub fn parse_list(list: &str) -> Vec<Self> {
        list.split(',')
            .filter_map(|item| match item.trim().to_ascii_lowercase().as_str() {
                "cpu" => Some(Self::Cpu),
                "memory" => Some(Self::Memory),
                "disk" => Some(Self::Disk),
                "network" => Some(Self::Network),
                _ => None,
            })
            .collect()
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Cpu => "CPU Usage",
            Self::Memory => "Memory Usage",
            Self::Disk => "Disk Usage",
            Self::Network => "Network I/O",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricReading {
    pub kind: MetricKind,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    pub status: String,
    pub metrics: Vec<String>,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Source of infrastructure telemetry.
#[async_trait]
pub trait InfraBackend: Send + Sync {
    async fn metrics(
        &self,
        resource: &Resource,
        kinds: &[MetricKind],
        time_range: &str,
    ) -> Result<Vec<MetricReading>, InfraError>;

    /// Log lines containing `query` (case-insensitive), newest first, at most `max_lines`.
    async fn logs(
        &self,
        resource: &Resource,
        query: &str,
        time_range: &str,
        max_lines: usize,
    ) -> Result<Vec<String>, InfraError>;

    async fn health(&self, resource: &Resource) -> Result<HealthReport, InfraError>;
}

const MOCK_LOGS: &[&str] = &[
    "2024-12-02 07:10:15 [ERROR] Connection timeout to database server",
    "2024-12-02 07:08:42 [WARN] High memory usage detected: 85%",
    "2024-12-02 07:05:33 [ERROR] Failed to process message: NullPointerException",
    "2024-12-02 07:02:11 [INFO] Retrying failed operation (attempt 3/5)",
    "2024-12-02 07:00:05 [ERROR] API request failed with status 503",
];

/// Fixed readings for every resource.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockInfraBackend;

#[async_trait]
impl InfraBackend for MockInfraBackend {
    async fn metrics(
        &self,
        _resource: &Resource,
        kinds: &[MetricKind],
        _time_range: &str,
    ) -> Result<Vec<MetricReading>, InfraError> {
        Ok(kinds
            .iter()
            .map(|&kind| MetricReading {
                kind,
                summary: match kind {
                    MetricKind::Cpu => "45% (avg), 78% (max)",
                    MetricKind::Memory => "62% (avg), 85% (max)",
                    MetricKind::Disk => "71% (avg), 73% (max)",
                    MetricKind::Network => "125 MB/s in, 89 MB/s out",
                }
                .into(),
            })
            .collect())
    }

    async fn logs(
        &self,
        _resource: &Resource,
        query: &str,
        _time_range: &str,
        max_lines: usize,
    ) -> Result<Vec<String>, InfraError> {
        let needle = query.to_lowercase();
        Ok(MOCK_LOGS
            .iter()
            .filter(|line| line.to_lowercase().contains(&needle))
            .take(max_lines)
            .map(|line| line.to_string())
            .collect())
    }

    async fn health(&self, _resource: &Resource) -> Result<HealthReport, InfraError> {
        Ok(HealthReport {
            status: "DEGRADED".into(),
            metrics: vec![
                "CPU: 45% avg, 78% max".into(),
                "Memory: 62% avg, 85% max (WARNING: High usage)".into(),
                "Disk: 71% avg".into(),
            ],
            issues: vec![
                "3 connection timeouts in last hour".into(),
                "2 failed API requests (503 errors)".into(),
                "Memory usage exceeded 80% threshold".into(),
            ],
            recommendations: vec![
                "Investigate memory leak or increase memory allocation".into(),
                "Check database connection pool settings".into(),
                "Review API endpoint health".into(),
            ],
        })
    }
}

fn resource_params(kinds: &'static str) -> [ParamSpec; 2] {
    [
        ParamSpec::required_string("resource_type", kinds),
        ParamSpec::required_string("resource_id", "ID or name of the resource"),
    ]
}

pub struct CheckMetricsTool {
    backend: Arc<dyn InfraBackend>,
}

impl CheckMetricsTool {
    pub fn new(backend: Arc<dyn InfraBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for CheckMetricsTool {
    fn name(&self) -> &str {
        "check_metrics"
    }

    fn description(&self) -> &str {
        "Check system metrics for infrastructure resources. Use this to get CPU, memory, disk, or \
         network metrics for pods, VMs, or other resources. Specify the resource type (kubernetes, \
         azure, oracle), resource ID, and metric types."
    }

    fn params(&self) -> Vec<ParamSpec> {
        let mut params = resource_params("Type of resource (kubernetes, azure, oracle)").to_vec();
        params.push(ParamSpec::string(
            "metric_type",
            "Comma-separated metric types (cpu, memory, disk, network)",
            "cpu,memory",
        ));
        params.push(ParamSpec::string("time_range", "Time range (e.g., 1h, 6h, 24h)", "1h"));
        params
    }

    async fn execute(&self, args: ToolArgs) -> Result<ToolResult, ToolError> {
        let resource = Resource::from_args(&args)?;
        let time_range = args.str("time_range")?;
        let kinds = MetricKind::parse_list(args.str("metric_type")?);

        let readings = match self.backend.metrics(&resource, &kinds, time_range).await {
            Ok(readings) => readings,
            Err(e) => {
                error!(%resource, error = %e, "Error checking metrics");
                return Ok(ToolResult::error(format!("Error checking metrics: {e}")));
            }
        };

        let mut out = format!("Metrics for {resource} (last {time_range}):\n");
        for reading in &readings {
            let _ = write!(out, "\n  {}: {}", reading.kind.label(), reading.summary);
        }
        let _ = write!(out, "\n\nNote: Metrics are averaged over {time_range}");
        Ok(ToolResult::ok(out))
    }
}

pub struct QueryLogsTool {
    backend: Arc<dyn InfraBackend>,
}

impl QueryLogsTool {
    pub fn new(backend: Arc<dyn InfraBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for QueryLogsTool {
    fn name(&self) -> &str {
        "query_logs"
    }

    fn description(&self) -> &str {
        "Query and search logs from infrastructure and applications. Use this to find errors, \
         exceptions, or specific events in logs. Specify the resource type, resource ID, search \
         query, and time range."
    }

    fn params(&self) -> Vec<ParamSpec> {
        let mut params = resource_params("Type of resource (kubernetes, azure, application)").to_vec();
        params.push(ParamSpec::required_string(
            "query",
            "Search query or filter (e.g., 'error', 'exception', 'timeout')",
        ));
        params.push(ParamSpec::string("time_range", "Time range (e.g., 1h, 6h, 24h)", "1h"));
        params.push(ParamSpec::integer(
            "max_lines",
            "Maximum number of log lines to return",
            1,
            500,
            50,
        ));
        params
    }

    async fn execute(&self, args: ToolArgs) -> Result<ToolResult, ToolError> {
        let resource = Resource::from_args(&args)?;
        let query = args.str("query")?;
        let time_range = args.str("time_range")?;
        let max_lines = args.int("max_lines")? as usize;

        let lines = match self.backend.logs(&resource, query, time_range, max_lines).await {
            Ok(lines) => lines,
            Err(e) => {
                error!(%resource, error = %e, "Error querying logs");
                return Ok(ToolResult::error(format!("Error querying logs: {e}")));
            }
        };

        let mut out = format!("Logs for {resource} matching '{query}' (last {time_range}):\n");
        if lines.is_empty() {
            let _ = write!(out, "\nNo logs found matching '{query}'");
        } else {
            let _ = write!(out, "\nFound {} matching entries:\n", lines.len());
            for (i, line) in lines.iter().enumerate() {
                let _ = write!(out, "\n{}. {line}", i + 1);
            }
        }
        Ok(ToolResult::ok(out))
    }
}

pub struct AnalyzeHealthTool {
    backend: Arc<dyn InfraBackend>,
}

impl AnalyzeHealthTool {
    pub fn new(backend: Arc<dyn InfraBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for AnalyzeHealthTool {
    fn name(&self) -> &str {
        "analyze_health"
    }

    fn description(&self) -> &str {
        "Analyze the overall health of a resource including metrics, errors, and status. Use this \
         to get a quick overview of a resource's current state. Specify the resource type and \
         resource ID."
    }

    fn params(&self) -> Vec<ParamSpec> {
        resource_params("Type of resource to analyze (kubernetes, azure, oracle, application)").to_vec()
    }

    async fn execute(&self, args: ToolArgs) -> Result<ToolResult, ToolError> {
        let resource = Resource::from_args(&args)?;
        let report = match self.backend.health(&resource).await {
            Ok(report) => report,
            Err(e) => {
                warn!(%resource, error = %e, "Error analyzing health");
                return Ok(ToolResult::error(format!("Error analyzing health: {e}")));
            }
        };

        let mut out = format!("Health Analysis for {resource}:\n\nStatus: {}", report.status);
        out.push_str("\n\nMetrics (last 1h):");
        for line in &report.metrics {
            let _ = write!(out, "\n  {line}");
        }
        out.push_str("\n\nRecent Issues:");
        for issue in &report.issues {
            let _ = write!(out, "\n  - {issue}");
        }
        out.push_str("\n\nRecommendations:");
        for (i, rec) in report.recommendations.iter().enumerate() {
            let _ = write!(out, "\n  {}. {rec}", i + 1);
        }
        Ok(ToolResult::ok(out))
    }
}
