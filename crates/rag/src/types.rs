//! Canonical retrieval types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const MIN_TOP_K: u32 = 1;
pub const MAX_TOP_K: u32 = 100;

/// A retrieved document after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagDocument {
    pub id: String,

    /// Never absent; empty when the backend sent no text
    pub content: String,

    /// Relevance as reported by the backend, unclamped
    pub score: f64,

    #[serde(default)]
    pub metadata: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl RagDocument {
    /// A string metadata field.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// String entries of an array metadata field (e.g. `tags`).
    pub fn meta_list(&self, key: &str) -> Vec<&str> {
        self.metadata
            .get(key)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// Parameters of a similarity query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RagQueryParams {
    pub query: String,
    pub top_k: u32,
    pub threshold: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl RagQueryParams {
    /// Defaults: `top_k = 5`, `threshold = 0.7`.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: 5,
            threshold: 0.7,
            filters: None,
            namespace: None,
        }
    }

    /// Clamped into `1..=100`.
    pub fn top_k(mut self, top_k: u32) -> Self {
        self.top_k = top_k.clamp(MIN_TOP_K, MAX_TOP_K);
        self
    }

    /// Clamped into `0.0..=1.0`.
    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RagQueryResponse {
    pub documents: Vec<RagDocument>,
    pub query: String,
    pub total_results: u64,
    /// Milliseconds, as reported by the backend
    pub processing_time: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RagRetrievalResponse {
    pub documents: Vec<RagDocument>,
    pub not_found: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagHealth {
    #[serde(default = "unknown")]
    pub status: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

fn unknown() -> String {
    "unknown".into()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RagIndexStats {
    pub total_documents: u64,
    pub namespaces: Option<Vec<String>>,
    pub last_updated: Option<String>,
    pub index_size: Option<u64>,
}
