//! Agent-level streaming events.
//!
//! `AgentStreamEvent` is what the gateway forwards to clients over SSE. The
//! wire shape is `{"type": ..., "data": ...}`; the end of a run is the
//! channel closing, never an event.

use serde::{Deserialize, Serialize};

use crate::loop_runner::RunStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    /// Partial text from the model.
    Content(String),

    /// A tool is about to run.
    ToolStart { tool: String },

    /// The tool finished (successfully or not).
    ToolEnd { tool: String },

    /// The run ended without a normal answer.
    Error { message: String, status: RunStatus },
}

impl AgentStreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Content(_) => "content",
            Self::ToolStart { .. } => "tool_start",
            Self::ToolEnd { .. } => "tool_end",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_is_a_bare_string() {
        let event = AgentStreamEvent::Content("Checking".into());
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "content", "data": "Checking"})
        );
    }

    #[test]
    fn tool_events_carry_the_tool_name() {
        let event = AgentStreamEvent::ToolStart {
            tool: "check_metrics".into(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "tool_start", "data": {"tool": "check_metrics"}})
        );
        assert_eq!(event.event_type(), "tool_start");
    }

    #[test]
    fn error_event_serialization() {
        let event = AgentStreamEvent::Error {
            message: "rate limited".into(),
            status: RunStatus::ModelError,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains(r#""status":"model_error""#));
    }

    #[test]
    fn event_deserialization() {
        let event: AgentStreamEvent =
            serde_json::from_str(r#"{"type":"tool_end","data":{"tool":"query_logs"}}"#).unwrap();
        assert_eq!(
            event,
            AgentStreamEvent::ToolEnd {
                tool: "query_logs".into()
            }
        );
        assert_eq!(event.event_type(), "tool_end");
    }
}
