//! HTTP client for the retrieval service.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use synapse_config::RagConfig;
use tracing::{debug, warn};

use crate::error::RagError;
use crate::normalize::{normalize_index_stats, normalize_query_response, normalize_retrieval_response};
use crate::types::{RagDocument, RagHealth, RagIndexStats, RagQueryParams, RagQueryResponse, RagRetrievalResponse};

/// Anything that can answer similarity queries.
///
/// [`RagClient`] is the production implementation; tests substitute their own.
#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    async fn query(&self, params: &RagQueryParams) -> Result<RagQueryResponse, RagError>;

    /// Fetch documents by id.
    async fn retrieve(&self, document_ids: &[String], namespace: Option<&str>) -> Result<RagRetrievalResponse, RagError>;

    async fn check_health(&self) -> Result<RagHealth, RagError>;

    async fn index_stats(&self) -> Result<RagIndexStats, RagError>;

    /// Query and keep only the documents.
    async fn search(&self, params: &RagQueryParams) -> Result<Vec<RagDocument>, RagError> {
        Ok(self.query(params).await?.documents)
    }

    /// Whether the health endpoint answers at all.
    async fn is_available(&self) -> bool {
        match self.check_health().await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "RAG service health check failed");
                false
            }
        }
    }
}

/// reqwest-backed client for the RAG service's HTTP API.
pub struct RagClient {
    base_url: String,
    api_key: Option<String>,
    timeout_ms: u64,
    client: reqwest::Client,
}

impl RagClient {
    pub fn new(config: &RagConfig) -> Result<Self, RagError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| RagError::Http(e.to_string()))?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            timeout_ms: config.timeout_ms,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, format!("{}{path}", self.base_url));
        if let Some(key) = &self.api_key {
            builder = builder.header("X-API-Key", key);
        }
        builder
    }

    /// Send, check the status and decode the JSON body.
    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<Value, RagError> {
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                RagError::Timeout {
                    timeout_ms: self.timeout_ms,
                }
            } else {
                RagError::Http(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "RAG service returned error");
            return Err(RagError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response.json().await.map_err(|e| RagError::Decode(e.to_string()))
    }
}

#[async_trait]
impl RetrievalBackend for RagClient {
    async fn query(&self, params: &RagQueryParams) -> Result<RagQueryResponse, RagError> {
        debug!(query = %params.query, top_k = params.top_k, threshold = params.threshold, "RAG query");
        let raw = self
            .send(self.request(reqwest::Method::POST, "/api/query").json(params))
            .await?;
        Ok(normalize_query_response(&raw, &params.query)?)
    }

    async fn retrieve(&self, document_ids: &[String], namespace: Option<&str>) -> Result<RagRetrievalResponse, RagError> {
        let mut body = json!({ "document_ids": document_ids });
        if let Some(ns) = namespace {
            body["namespace"] = json!(ns);
        }
        let raw = self
            .send(self.request(reqwest::Method::POST, "/api/retrieve").json(&body))
            .await?;
        Ok(normalize_retrieval_response(&raw)?)
    }

    async fn check_health(&self) -> Result<RagHealth, RagError> {
        let raw = self.send(self.request(reqwest::Method::GET, "/health")).await?;
        serde_json::from_value(raw).map_err(|e| RagError::Decode(e.to_string()))
    }

    async fn index_stats(&self) -> Result<RagIndexStats, RagError> {
        let raw = self.send(self.request(reqwest::Method::GET, "/api/stats")).await?;
        Ok(normalize_index_stats(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<(Option<String>, Value)>>>;

    /// A fake RAG service speaking the camelCase dialect.
    async fn spawn_fake_rag(seen: Seen) -> String {
        let query_seen = seen.clone();
        let app = Router::new()
            .route(
                "/api/query",
                post(move |headers: HeaderMap, Json(body): Json<Value>| {
                    let seen = query_seen.clone();
                    async move {
                        let key = headers
                            .get("x-api-key")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        seen.lock().unwrap().push((key, body));
                        Json(json!({
                            "results": [
                                {"doc_id": "r-1", "text": "Scale the deployment", "similarity": 0.82,
                                 "meta": {"source": "runbooks/scale.md"}}
                            ],
                            "totalResults": 1,
                            "processingTime": 4.2
                        }))
                    }
                }),
            )
            .route(
                "/api/retrieve",
                post(|Json(body): Json<Value>| async move {
                    let ids = body["document_ids"].as_array().cloned().unwrap_or_default();
                    Json(json!({
                        "documents": [{"id": ids[0].clone(), "content": "found"}],
                        "notFound": ids[1..].to_vec()
                    }))
                }),
            )
            .route(
                "/health",
                get(|| async { Json(json!({"status": "healthy", "service": "rag", "timestamp": "now"})) }),
            )
            .route(
                "/api/stats",
                get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "index rebuilding") }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client(url: &str, api_key: Option<&str>) -> RagClient {
        RagClient::new(&RagConfig {
            url: url.to_string(),
            api_key: api_key.map(str::to_string),
            timeout_ms: 2_000,
            probe_on_startup: false,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn query_normalizes_camel_case_backend() {
        let seen: Seen = Arc::default();
        let url = spawn_fake_rag(seen.clone()).await;
        let rag = client(&url, Some("secret"));

        let params = RagQueryParams::new("pods pending")
            .top_k(3)
            .threshold(0.65)
            .filter("category", "incident");
        let resp = rag.query(&params).await.unwrap();

        assert_eq!(resp.total_results, 1);
        assert_eq!(resp.processing_time, Some(4.2));
        assert_eq!(resp.query, "pods pending");
        let doc = &resp.documents[0];
        assert_eq!(doc.id, "r-1");
        assert_eq!(doc.content, "Scale the deployment");
        assert_eq!(doc.source.as_deref(), Some("runbooks/scale.md"));

        let requests = seen.lock().unwrap();
        let (key, body) = &requests[0];
        assert_eq!(key.as_deref(), Some("secret"));
        assert_eq!(body["top_k"], 3);
        assert_eq!(body["filters"]["category"], "incident");
    }

    #[tokio::test]
    async fn api_key_header_omitted_when_unset() {
        let seen: Seen = Arc::default();
        let url = spawn_fake_rag(seen.clone()).await;
        let docs = client(&url, None).search(&RagQueryParams::new("q")).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert!(seen.lock().unwrap()[0].0.is_none());
    }

    #[tokio::test]
    async fn retrieve_reports_not_found() {
        let url = spawn_fake_rag(Arc::default()).await;
        let resp = client(&url, None)
            .retrieve(&["a".to_string(), "b".to_string()], Some("docs"))
            .await
            .unwrap();
        assert_eq!(resp.documents[0].id, "a");
        assert_eq!(resp.not_found, vec!["b"]);
    }

    #[tokio::test]
    async fn health_and_availability() {
        let url = spawn_fake_rag(Arc::default()).await;
        let rag = client(&url, None);
        assert_eq!(rag.check_health().await.unwrap().status, "healthy");
        assert!(rag.is_available().await);
    }

    #[tokio::test]
    async fn error_status_is_surfaced() {
        let url = spawn_fake_rag(Arc::default()).await;
        let err = client(&url, None).index_stats().await.unwrap_err();
        assert!(matches!(err, RagError::Status { status: 503, ref body } if body == "index rebuilding"));
    }

    #[tokio::test]
    async fn unreachable_service_is_unavailable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let rag = client(&format!("http://{addr}"), None);
        assert!(!rag.is_available().await);
        assert!(matches!(rag.check_health().await, Err(RagError::Http(_))));
    }
}
