//! HTTP gateway for the Synapse agents service.
//!
//! Exposes health probes and the agent chat API. Built on Axum.

pub mod agents;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::{Router, extract::State, response::Json, routing::get};
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;
use synapse_agent::{AgentLoop, SessionStore};
use synapse_config::AppConfig;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Request bodies above this size are rejected with 413.
pub const BODY_LIMIT_BYTES: usize = 1024 * 1024;

/// Shared application state.
///
/// The agent is built once at startup. If that fails the reason is kept and
/// the agent endpoints answer 500 with it.
pub struct AppState {
    pub config: AppConfig,
    agent: Result<Arc<AgentLoop>, String>,
    pub sessions: SessionStore,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: AppConfig, agent: Result<AgentLoop, String>) -> Self {
        let sessions = SessionStore::new(config.agent.max_sessions);
        Self {
            config,
            agent: agent.map(Arc::new),
            sessions,
        }
    }

    /// Build the agent from configuration, keeping the error if it fails.
    pub async fn from_config(config: AppConfig) -> Self {
        let agent = synapse_agent::build_agent(&config).await.map_err(|e| {
            error!(error = %e, "Agent unavailable; chat endpoints will return 500");
            e.to_string()
        });
        Self::new(config, agent)
    }

    pub fn agent(&self) -> Result<&Arc<AgentLoop>, &str> {
        self.agent.as_ref().map_err(String::as_str)
    }
}

/// Build the full router.
///
/// Layers applied:
/// - CORS restricted to the configured origins
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let cors = cors_layer(&state.config.gateway.cors_origins);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/health/", get(health_handler))
        .route("/health/ready", get(ready_handler))
        .route("/health/live", get(live_handler))
        .nest("/api/agents", agents::agents_router())
        .with_state(state)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}

/// Start the gateway HTTP server and serve until Ctrl-C.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    info!(
        service = %config.service_name,
        environment = %config.environment,
        port = config.gateway.port,
        "Starting service"
    );

    let state = Arc::new(AppState::from_config(config).await);
    let app = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!(service = %state.config.service_name, "Shutting down");
    Ok(())
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

async fn root_handler(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({
        "service": state.config.service_name,
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "timestamp": now(),
    }))
}

async fn health_handler(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": state.config.service_name,
        "timestamp": now(),
        "environment": state.config.environment,
    }))
}

async fn ready_handler() -> Json<Value> {
    Json(json!({ "ready": true, "timestamp": now() }))
}

async fn live_handler() -> Json<Value> {
    Json(json!({ "alive": true, "timestamp": now() }))
}
