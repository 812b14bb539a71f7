//! Retrieval tools backed by the RAG service.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Write;
use std::sync::Arc;
use synapse_core::error::ToolError;
use synapse_core::tool::{ParamSpec, Tool, ToolArgs, ToolResult};
use synapse_rag::{RagDocument, RagQueryParams, RetrievalBackend};
use tracing::warn;

const DOCUMENTATION_EXCERPT: usize = 500;
const CONTEXT_EXCERPT: usize = 400;
const CONTEXT_THRESHOLD: f64 = 0.6;
const INCIDENT_THRESHOLD: f64 = 0.65;

/// Cut `text` to at most `max` characters, marking the cut with `...`.
pub(crate) fn excerpt(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte, _)) => format!("{}...", &text[..byte]),
        None => text.to_string(),
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(true) => "Yes".into(),
        Value::Bool(false) => "No".into(),
        other => other.to_string(),
    }
}

fn source_or<'a>(doc: &'a RagDocument, fallback: &'a str) -> &'a str {
    doc.source.as_deref().unwrap_or(fallback)
}

/// Searches documentation and knowledge base articles.
pub struct SearchDocumentationTool {
    backend: Arc<dyn RetrievalBackend>,
}

impl SearchDocumentationTool {
    pub fn new(backend: Arc<dyn RetrievalBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for SearchDocumentationTool {
    fn name(&self) -> &str {
        "search_documentation"
    }

    fn description(&self) -> &str {
        "Search through documentation and knowledge base articles. Use this when you need to find \
         information about how to troubleshoot issues, best practices, configuration guides, or \
         technical documentation. Input should be a clear search query describing what you're looking for."
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required_string("query", "The search query to find relevant documentation"),
            ParamSpec::integer("top_k", "Number of results to return (1-10)", 1, 10, 5),
            ParamSpec::number("threshold", "Minimum relevance score (0.0-1.0)", 0.0, 1.0, 0.7),
        ]
    }

    async fn execute(&self, args: ToolArgs) -> Result<ToolResult, ToolError> {
        let query = args.str("query")?;
        let params = RagQueryParams::new(query)
            .top_k(args.int("top_k")? as u32)
            .threshold(args.float("threshold")?)
            .filter("category", "documentation");

        let documents = match self.backend.search(&params).await {
            Ok(docs) => docs,
            Err(e) => {
                warn!(error = %e, "Documentation search failed");
                return Ok(ToolResult::error(format!("Error searching documentation: {e}")));
            }
        };

        if documents.is_empty() {
            return Ok(ToolResult::ok(format!(
                "No relevant documentation found for query: {query}"
            )));
        }

        let mut out = format!("Found {} relevant documentation articles:\n", documents.len());
        for (i, doc) in documents.iter().enumerate() {
            let _ = write!(
                out,
                "\n\n{}. {} (relevance: {:.2})\n   {}",
                i + 1,
                source_or(doc, "Unknown source"),
                doc.score,
                excerpt(&doc.content, DOCUMENTATION_EXCERPT)
            );
            let tags = doc.meta_list("tags");
            if !tags.is_empty() {
                let _ = write!(out, "\n   Tags: {}", tags.join(", "));
            }
        }
        Ok(ToolResult::ok(out))
    }
}

/// Pulls background context from documentation and, optionally, past incident logs.
pub struct RetrieveContextTool {
    backend: Arc<dyn RetrievalBackend>,
}

impl RetrieveContextTool {
    pub fn new(backend: Arc<dyn RetrievalBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for RetrieveContextTool {
    fn name(&self) -> &str {
        "retrieve_context"
    }

    fn description(&self) -> &str {
        "Retrieve relevant context including documentation and historical incident logs. Use this \
         when you need background information, similar past issues, or context to understand a \
         problem better. Input should be a description of the issue or question you need context for."
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required_string("query", "The query to find relevant context for"),
            ParamSpec::integer("top_k", "Number of context items to retrieve (1-5)", 1, 5, 3),
            ParamSpec::boolean("include_logs", "Whether to include historical logs", true),
        ]
    }

    async fn execute(&self, args: ToolArgs) -> Result<ToolResult, ToolError> {
        let query = args.str("query")?;
        let mut params = RagQueryParams::new(query)
            .top_k(args.int("top_k")? as u32)
            .threshold(CONTEXT_THRESHOLD);
        if !args.bool("include_logs")? {
            params = params.filter("category", "documentation");
        }

        let documents = match self.backend.search(&params).await {
            Ok(docs) => docs,
            Err(e) => {
                warn!(error = %e, "Context retrieval failed");
                return Ok(ToolResult::error(format!("Error retrieving context: {e}")));
            }
        };

        if documents.is_empty() {
            return Ok(ToolResult::ok(format!("No relevant context found for: {query}")));
        }

        let mut out = format!("Retrieved {} relevant context items:\n", documents.len());
        for (i, doc) in documents.iter().enumerate() {
            let category = doc.meta_str("category").unwrap_or("unknown").to_uppercase();
            let _ = write!(
                out,
                "\n\n{}. [{category}] {}\n   Relevance: {:.2}\n   {}",
                i + 1,
                source_or(doc, "Unknown source"),
                doc.score,
                excerpt(&doc.content, CONTEXT_EXCERPT)
            );
            if let Some(severity) = doc.metadata.get("severity") {
                let _ = write!(out, "\n   Severity: {}", display_value(severity));
            }
            if let Some(resolved) = doc.metadata.get("resolved") {
                let _ = write!(out, "\n   Resolved: {}", display_value(resolved));
            }
            let tags = doc.meta_list("tags");
            if !tags.is_empty() {
                let shown: Vec<&str> = tags.into_iter().take(3).collect();
                let _ = write!(out, "\n   Tags: {}", shown.join(", "));
            }
        }
        Ok(ToolResult::ok(out))
    }
}

/// Finds similar past incidents and how they were resolved.
pub struct SearchIncidentLogsTool {
    backend: Arc<dyn RetrievalBackend>,
}

impl SearchIncidentLogsTool {
    pub fn new(backend: Arc<dyn RetrievalBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for SearchIncidentLogsTool {
    fn name(&self) -> &str {
        "search_incident_logs"
    }

    fn description(&self) -> &str {
        "Search through historical incident logs to find similar past issues and their resolutions. \
         Use this when troubleshooting a problem to see if similar issues have occurred before and \
         how they were resolved. Input should be a description of the current issue or error."
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required_string("query", "The search query to find similar past incidents"),
            ParamSpec::integer("top_k", "Number of incidents to return (1-5)", 1, 5, 3),
        ]
    }

    async fn execute(&self, args: ToolArgs) -> Result<ToolResult, ToolError> {
        let query = args.str("query")?;
        let params = RagQueryParams::new(query)
            .top_k(args.int("top_k")? as u32)
            .threshold(INCIDENT_THRESHOLD)
            .filter("category", "incident");

        let documents = match self.backend.search(&params).await {
            Ok(docs) => docs,
            Err(e) => {
                warn!(error = %e, "Incident log search failed");
                return Ok(ToolResult::error(format!("Error searching incident logs: {e}")));
            }
        };

        if documents.is_empty() {
            return Ok(ToolResult::ok(format!("No similar past incidents found for: {query}")));
        }

        let mut out = format!("Found {} similar past incidents:\n", documents.len());
        for (i, doc) in documents.iter().enumerate() {
            let severity = doc
                .metadata
                .get("severity")
                .map(display_value)
                .unwrap_or_else(|| "unknown".into());
            let resolved = doc
                .metadata
                .get("resolved")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let _ = write!(
                out,
                "\n\n{}. {}\n   Severity: {severity} | Resolved: {}\n   Similarity: {:.2}\n   {}",
                i + 1,
                source_or(doc, "Unknown incident"),
                if resolved { "Yes" } else { "No" },
                doc.score,
                doc.content
            );
            let tags = doc.meta_list("tags");
            if !tags.is_empty() {
                let shown: Vec<&str> = tags.into_iter().take(5).collect();
                let _ = write!(out, "\n   Related: {}", shown.join(", "));
            }
        }
        Ok(ToolResult::ok(out))
    }
}
