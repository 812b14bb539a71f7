//! Response normalization for retrieval backends.
//!
//! Retrieval services disagree on field names (`id` vs `document_id`,
//! `content` vs `text`, `totalResults` vs `total_results`). Every canonical
//! field here is resolved from an ordered list of candidate key paths; the
//! first candidate that is present and of a usable type wins.
//!
//! A candidate counts as absent when the key is missing, `null`, or an empty
//! string. A numeric `0` score is present.

use serde_json::{Map, Value};
use synapse_core::error::NormalizationError;
use tracing::trace;

use crate::types::{RagDocument, RagIndexStats, RagQueryResponse, RagRetrievalResponse};

/// A key path into a JSON object; `&["metadata", "source"]` is nested.
pub type KeyPath = &'static [&'static str];

pub const ID_KEYS: &[KeyPath] = &[&["id"], &["document_id"], &["doc_id"]];
pub const CONTENT_KEYS: &[KeyPath] = &[&["content"], &["text"], &["document"]];
pub const SCORE_KEYS: &[KeyPath] = &[&["score"], &["similarity"], &["relevance"]];
pub const METADATA_KEYS: &[KeyPath] = &[&["metadata"], &["meta"]];
pub const SOURCE_KEYS: &[KeyPath] = &[&["source"], &["metadata", "source"], &["meta", "source"]];
pub const TIMESTAMP_KEYS: &[KeyPath] = &[&["timestamp"], &["created_at"], &["createdAt"]];

pub const DOCUMENT_LIST_KEYS: &[KeyPath] = &[&["documents"], &["results"]];
pub const TOTAL_KEYS: &[KeyPath] = &[&["total_results"], &["totalResults"]];
pub const PROCESSING_TIME_KEYS: &[KeyPath] = &[&["processing_time"], &["processingTime"]];
pub const NOT_FOUND_KEYS: &[KeyPath] = &[&["not_found"], &["notFound"]];
pub const TOTAL_DOCUMENTS_KEYS: &[KeyPath] = &[&["total_documents"], &["totalDocuments"]];
pub const LAST_UPDATED_KEYS: &[KeyPath] = &[&["last_updated"], &["lastUpdated"]];
pub const INDEX_SIZE_KEYS: &[KeyPath] = &[&["index_size"], &["indexSize"]];

fn lookup<'a>(value: &'a Value, path: KeyPath) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, key| v.get(*key))
}

/// Resolve the first candidate that `extract` accepts.
pub fn first_present<'a, T>(
    value: &'a Value,
    candidates: &[KeyPath],
    extract: impl Fn(&'a Value) -> Option<T>,
) -> Option<T> {
    candidates
        .iter()
        .filter_map(|path| lookup(value, *path))
        .find_map(extract)
}

fn non_empty_str(v: &Value) -> Option<String> {
    v.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

/// Ids may arrive as strings or integers.
fn id_like(v: &Value) -> Option<String> {
    match v {
        Value::Number(n) => Some(n.to_string()),
        other => non_empty_str(other),
    }
}

/// Numbers, or numeric strings from loosely typed backends.
fn number_like(v: &Value) -> Option<f64> {
    v.as_f64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

fn count_like(v: &Value) -> Option<u64> {
    v.as_u64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

fn object(v: &Value) -> Option<Map<String, Value>> {
    v.as_object().cloned()
}

/// Map one raw document onto the canonical shape.
///
/// Fails only when the value is not an object or no id candidate resolves.
pub fn normalize_document(raw: &Value) -> Result<RagDocument, NormalizationError> {
    if !raw.is_object() {
        return Err(NormalizationError::NotAnObject);
    }

    let id = first_present(raw, ID_KEYS, id_like).ok_or_else(|| NormalizationError::MissingField {
        field: "id",
        candidates: ID_KEYS.iter().map(|p| p[p.len() - 1]).collect(),
    })?;

    Ok(RagDocument {
        id,
        content: first_present(raw, CONTENT_KEYS, non_empty_str).unwrap_or_default(),
        score: first_present(raw, SCORE_KEYS, number_like).unwrap_or(0.0),
        metadata: first_present(raw, METADATA_KEYS, object).unwrap_or_default(),
        source: first_present(raw, SOURCE_KEYS, non_empty_str),
        timestamp: first_present(raw, TIMESTAMP_KEYS, |v| match v {
            Value::Number(n) => Some(n.to_string()),
            other => non_empty_str(other),
        }),
    })
}

fn normalize_documents(raw: &Value) -> Result<Vec<RagDocument>, NormalizationError> {
    let list = first_present(raw, DOCUMENT_LIST_KEYS, Value::as_array);
    list.map(|docs| docs.iter().map(normalize_document).collect::<Result<Vec<_>, _>>())
        .unwrap_or_else(|| Ok(Vec::new()))
}

/// Normalize a `POST /api/query` response body.
pub fn normalize_query_response(raw: &Value, query: &str) -> Result<RagQueryResponse, NormalizationError> {
    let documents = normalize_documents(raw)?;
    let total_results = first_present(raw, TOTAL_KEYS, count_like).unwrap_or(documents.len() as u64);
    trace!(documents = documents.len(), total_results, "Normalized query response");

    Ok(RagQueryResponse {
        query: query.to_string(),
        total_results,
        processing_time: first_present(raw, PROCESSING_TIME_KEYS, number_like),
        documents,
    })
}

/// Normalize a `POST /api/retrieve` response body.
pub fn normalize_retrieval_response(raw: &Value) -> Result<RagRetrievalResponse, NormalizationError> {
    Ok(RagRetrievalResponse {
        documents: normalize_documents(raw)?,
        not_found: first_present(raw, NOT_FOUND_KEYS, |v| {
            v.as_array()
                .map(|ids| ids.iter().filter_map(id_like).collect::<Vec<_>>())
        })
        .unwrap_or_default(),
    })
}

/// Normalize a `GET /api/stats` response body.
pub fn normalize_index_stats(raw: &Value) -> RagIndexStats {
    RagIndexStats {
        total_documents: first_present(raw, TOTAL_DOCUMENTS_KEYS, count_like).unwrap_or(0),
        namespaces: raw.get("namespaces").and_then(Value::as_array).map(|ns| {
            ns.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        }),
        last_updated: first_present(raw, LAST_UPDATED_KEYS, non_empty_str),
        index_size: first_present(raw, INDEX_SIZE_KEYS, count_like),
    }
}
