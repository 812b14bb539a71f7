//! Agent endpoints, nested under `/api/agents`.
//!
//! - `POST /chat` runs the agent and answers as JSON
//! - `POST /chat/stream` runs the agent and answers as an SSE stream
//! - `GET /status` reports what the agent is running with

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::sse::{Event as SseEvent, Sse},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::convert::Infallible;
use std::sync::Arc;
use synapse_agent::{AgentLoop, AgentRun, RunStatus};
use synapse_core::message::{Message, SessionId};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info};

use crate::SharedState;

/// Sentinel closing every SSE stream.
pub const DONE_SENTINEL: &str = "[DONE]";

pub fn agents_router() -> Router<SharedState> {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/chat/stream", post(chat_stream_handler))
        .route("/status", get(status_handler))
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,

    /// Existing session to continue (omit to start a new one).
    #[serde(default)]
    pub session_id: Option<String>,

    /// Key/value facts folded into the user message.
    #[serde(default)]
    pub context: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub session_id: String,
    pub metadata: ChatMetadata,
}

#[derive(Debug, Serialize)]
pub struct ChatMetadata {
    pub tools_used: Vec<String>,
    pub message_count: usize,
    pub model: String,
    pub provider: String,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Error body: `{"detail": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn unavailable(reason: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: format!("Agent is not available: {reason}"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

/// The user message sent to the agent.
///
/// With context: `Context:\n<k>: <v>\n...\n\nQuestion: <message>`.
pub fn compose_user_message(message: &str, context: Option<&Map<String, Value>>) -> String {
    match context.filter(|c| !c.is_empty()) {
        None => message.to_string(),
        Some(context) => {
            let lines: Vec<String> = context
                .iter()
                .map(|(k, v)| match v {
                    Value::String(s) => format!("{k}: {s}"),
                    other => format!("{k}: {other}"),
                })
                .collect();
            format!("Context:\n{}\n\nQuestion: {message}", lines.join("\n"))
        }
    }
}

fn session_id(requested: Option<String>) -> SessionId {
    requested
        .filter(|s| !s.trim().is_empty())
        .map(SessionId::from)
        .unwrap_or_else(SessionId::generate)
}

fn require_agent(state: &SharedState) -> Result<Arc<AgentLoop>, ApiError> {
    state.agent().cloned().map_err(ApiError::unavailable)
}

async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let agent = require_agent(&state)?;
    let session_id = session_id(payload.session_id);
    info!(session_id = %session_id, "Agent chat request");

    let mut conversation = state.sessions.checkout(&session_id).await;
    conversation.push(Message::user(compose_user_message(
        &payload.message,
        payload.context.as_ref(),
    )));

    let outcome = agent.run(&mut conversation).await;
    info!(
        session_id = %session_id,
        status = outcome.status.as_str(),
        model_calls = outcome.model_calls,
        "Agent chat finished"
    );

    let response = ChatResponse {
        response: outcome.response().to_string(),
        session_id: session_id.to_string(),
        metadata: ChatMetadata {
            tools_used: conversation.tools_used(),
            message_count: conversation.len(),
            model: agent.model().to_string(),
            provider: agent.provider_name().to_string(),
            status: outcome.status,
            error: outcome.error().map(str::to_string),
        },
    };
    state.sessions.save(conversation).await;
    Ok(Json(response))
}

async fn chat_stream_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let agent = require_agent(&state)?;
    let session_id = session_id(payload.session_id);
    info!(session_id = %session_id, "Agent chat stream request");

    let mut conversation = state.sessions.checkout(&session_id).await;
    conversation.push(Message::user(compose_user_message(
        &payload.message,
        payload.context.as_ref(),
    )));

    let AgentRun { events, handle } = agent.run_stream(conversation);

    // Persist whatever the run produced, even if the client went away.
    let store = state.clone();
    tokio::spawn(async move {
        match handle.await {
            Ok((conversation, outcome)) => {
                info!(
                    session_id = %conversation.id,
                    status = outcome.status.as_str(),
                    "Agent chat stream finished"
                );
                store.sessions.save(conversation).await;
            }
            Err(e) => error!(error = %e, "Agent stream task failed"),
        }
    });

    let stream = ReceiverStream::new(events)
        .map(|event| {
            let data = serde_json::to_string(&event).unwrap_or_default();
            Ok::<_, Infallible>(SseEvent::default().event(event.event_type()).data(data))
        })
        .chain(tokio_stream::once(Ok::<_, Infallible>(SseEvent::default().data(DONE_SENTINEL))));

    Ok(Sse::new(stream))
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    agents_available: bool,
    tools_loaded: usize,
    tools: Vec<String>,
    active_sessions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    features: Features,
}

#[derive(Debug, Serialize)]
struct Features {
    supervisor_agent: bool,
    rag_integration: bool,
    tool_execution: bool,
}

async fn status_handler(State(state): State<SharedState>) -> Json<StatusResponse> {
    let active_sessions = state.sessions.len().await;
    let response = match state.agent() {
        Ok(agent) => {
            let tools: Vec<String> = agent.tools().names().into_iter().map(String::from).collect();
            StatusResponse {
                agents_available: true,
                tools_loaded: tools.len(),
                active_sessions,
                model: Some(agent.model().to_string()),
                provider: Some(agent.provider_name().to_string()),
                message: None,
                features: Features {
                    supervisor_agent: true,
                    rag_integration: agent.tools().get("search_documentation").is_some(),
                    tool_execution: !tools.is_empty(),
                },
                tools,
            }
        }
        Err(reason) => StatusResponse {
            agents_available: false,
            tools_loaded: 0,
            tools: Vec::new(),
            active_sessions,
            model: None,
            provider: None,
            message: Some(reason.to_string()),
            features: Features {
                supervisor_agent: false,
                rag_integration: false,
                tool_execution: false,
            },
        },
    };
    Json(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_without_context_is_unchanged() {
        assert_eq!(compose_user_message("why is api slow", None), "why is api slow");
        assert_eq!(
            compose_user_message("why is api slow", Some(&Map::new())),
            "why is api slow"
        );
    }

    #[test]
    fn context_is_folded_into_message() {
        let context = json!({"namespace": "prod", "replicas": 3})
            .as_object()
            .cloned()
            .unwrap();
        assert_eq!(
            compose_user_message("why is api slow", Some(&context)),
            "Context:\nnamespace: prod\nreplicas: 3\n\nQuestion: why is api slow"
        );
    }

    #[test]
    fn blank_session_id_is_replaced() {
        assert_eq!(session_id(Some("abc".into())).as_str(), "abc");
        assert_ne!(session_id(Some("  ".into())).as_str(), "  ");
        assert!(!session_id(None).as_str().is_empty());
    }
}
