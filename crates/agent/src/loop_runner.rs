//! The agent control loop.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use synapse_config::AppConfig;
use synapse_core::error::{ProviderError, ToolError};
use synapse_core::message::{Conversation, Message, MessageToolCall, Route};
use synapse_core::provider::{Provider, ProviderRequest};
use synapse_core::tool::{ToolRegistry, ToolResult};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::stream_event::AgentStreamEvent;

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

const EVENT_BUFFER: usize = 128;

const SKIPPED_RESULT: &str = "Skipped: the maximum number of tool iterations was reached";
const CANCELLED_RESULT: &str = "Cancelled: the client disconnected before this tool finished";

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    LoopExceeded,
    ModelError,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::LoopExceeded => "loop_exceeded",
            Self::ModelError => "model_error",
            Self::Cancelled => "cancelled",
        }
    }
}

/// The result of one run of the loop.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: RunStatus,

    /// The terminal assistant message. Only appended to the conversation
    /// when `status` is `Completed`.
    pub message: Message,

    pub model_calls: u32,

    pub tool_rounds: u32,

    /// Tools executed during this run, in call order
    pub tools_invoked: Vec<String>,
}

impl RunOutcome {
    pub fn response(&self) -> &str {
        &self.message.content
    }

    /// The structured error of a failed run.
    pub fn error(&self) -> Option<&str> {
        self.message.metadata.get("error").and_then(|v| v.as_str())
    }
}

/// A streaming run in progress.
pub struct AgentRun {
    pub events: mpsc::Receiver<AgentStreamEvent>,

    /// Resolves to the conversation after the run and its outcome.
    pub handle: JoinHandle<(Conversation, RunOutcome)>,
}

/// Drives one conversational turn: model call, tool round, model call, ...
/// until the model answers without requesting tools.
pub struct AgentLoop {
    provider: Arc<dyn Provider>,

    model: String,

    temperature: f32,

    max_tokens: Option<u32>,

    tools: Arc<ToolRegistry>,

    /// Tool rounds allowed per run
    max_iterations: u32,

    tool_timeout: Duration,
}

impl AgentLoop {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.1,
            max_tokens: None,
            tools,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tool_timeout: Duration::from_secs(30),
        }
    }

    /// Model, sampling and loop bounds from the application config.
    pub fn from_config(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>, config: &AppConfig) -> Self {
        Self::new(provider, &config.llm.model, tools)
            .with_temperature(config.llm.temperature)
            .with_max_tokens(config.llm.max_tokens)
            .with_max_iterations(config.agent.max_iterations)
            .with_tool_timeout(Duration::from_secs(config.agent.tool_timeout_secs))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// The role description sent ahead of every model call.
    pub fn system_prompt(&self) -> String {
        let mut prompt = String::from(
            "You are Synapse AI, an intelligent troubleshooting assistant for on-call engineers.\n\n\
             Your role is to help engineers diagnose and resolve issues in their infrastructure by:\n\
             1. Analyzing the problem description\n\
             2. Searching relevant documentation and past incidents\n\
             3. Checking system metrics and logs\n\
             4. Providing step-by-step troubleshooting guidance\n\
             5. Suggesting remediation actions\n",
        );

        if self.tools.is_empty() {
            prompt.push_str("\nNo tools are currently available; answer from your own knowledge.\n");
        } else {
            prompt.push_str("\nAvailable tools:\n");
            for (name, description) in self.tools.summaries() {
                let summary = description.split(". ").next().unwrap_or(description);
                prompt.push_str(&format!("- {name}: {}\n", summary.trim_end_matches('.')));
            }
        }

        prompt.push_str(
            "\nGuidelines:\n\
             - Always start by understanding the problem fully\n\
             - Search for similar past incidents to learn from previous resolutions\n\
             - Check relevant metrics and logs to gather evidence\n\
             - Provide clear, actionable recommendations\n\
             - Explain your reasoning at each step\n\
             - If you're unsure, say so and suggest next steps\n\n\
             Be concise but thorough. Focus on solving the problem efficiently.",
        );
        prompt
    }

    /// Run the loop to completion, appending to `conversation`.
    ///
    /// Never fails: model errors and the iteration bound are reported through
    /// [`RunOutcome::status`].
    pub async fn run(&self, conversation: &mut Conversation) -> RunOutcome {
        self.drive(conversation, None).await
    }

    /// Run the loop on a spawned task, streaming events as it goes.
    ///
    /// Dropping `AgentRun::events` cancels the run at its next suspension point.
    pub fn run_stream(self: Arc<Self>, mut conversation: Conversation) -> AgentRun {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let handle = tokio::spawn(async move {
            let outcome = self.drive(&mut conversation, Some(&tx)).await;
            if matches!(outcome.status, RunStatus::ModelError | RunStatus::LoopExceeded) {
                let _ = tx
                    .send(AgentStreamEvent::Error {
                        message: outcome.response().to_string(),
                        status: outcome.status,
                    })
                    .await;
            }
            (conversation, outcome)
        });
        AgentRun { events: rx, handle }
    }

    async fn drive(
        &self,
        conversation: &mut Conversation,
        events: Option<&mpsc::Sender<AgentStreamEvent>>,
    ) -> RunOutcome {
        info!(
            session_id = %conversation.id,
            messages = conversation.len(),
            streaming = events.is_some(),
            "Running agent"
        );

        let system = Message::system(self.system_prompt());
        let definitions = self.tools.definitions();
        let mut model_calls = 0;
        let mut tool_rounds = 0;
        let mut tools_invoked: Vec<String> = Vec::new();

        loop {
            conversation.route = Route::Agent;
            model_calls += 1;
            debug!(session_id = %conversation.id, model_calls, tool_rounds, "Agent loop iteration");

            let mut messages = Vec::with_capacity(conversation.len() + 1);
            messages.push(system.clone());
            messages.extend_from_slice(conversation.messages());
            let request = ProviderRequest::new(&self.model, messages)
                .with_temperature(self.temperature)
                .with_max_tokens(self.max_tokens)
                .with_tools(definitions.clone());

            let response = match events {
                None => self.provider.complete(request).await.map(|r| r.message),
                Some(tx) => match until_closed(tx, self.stream_turn(request, tx)).await {
                    Some(result) => result,
                    None => return self.cancelled(conversation, &[], model_calls, tool_rounds, tools_invoked),
                },
            };

            let mut message = match response {
                Ok(message) => message,
                Err(e) => {
                    error!(
                        session_id = %conversation.id,
                        error = %e,
                        transient = e.is_transient(),
                        "Model invocation failed"
                    );
                    let message = Message::assistant(format!(
                        "I encountered an error while processing your request: {e}"
                    ))
                    .with_metadata("error", e.to_string().into());
                    conversation.push(message.clone());
                    conversation.route = Route::End;
                    return RunOutcome {
                        status: RunStatus::ModelError,
                        message,
                        model_calls,
                        tool_rounds,
                        tools_invoked,
                    };
                }
            };

            if !message.has_tool_calls() || self.tools.is_empty() {
                message.tool_calls.clear();
                conversation.push(message.clone());
                conversation.route = Route::End;
                return RunOutcome {
                    status: RunStatus::Completed,
                    message,
                    model_calls,
                    tool_rounds,
                    tools_invoked,
                };
            }

            let calls = message.tool_calls.clone();
            conversation.push(message);

            if tool_rounds >= self.max_iterations {
                warn!(
                    session_id = %conversation.id,
                    max_iterations = self.max_iterations,
                    "Max tool iterations reached"
                );
                for call in &calls {
                    conversation.push(Message::tool_result(&call.id, &call.name, SKIPPED_RESULT));
                }
                conversation.route = Route::End;
                let reason = format!("maximum tool iterations ({}) exceeded", self.max_iterations);
                return RunOutcome {
                    status: RunStatus::LoopExceeded,
                    message: Message::assistant(
                        "I've reached the maximum number of tool call iterations without a final \
                         answer. Please narrow the question or provide further guidance.",
                    )
                    .with_metadata("error", reason.into()),
                    model_calls,
                    tool_rounds,
                    tools_invoked,
                };
            }

            tool_rounds += 1;
            conversation.route = Route::Tools;
            debug!(tool_count = calls.len(), "Executing tool calls");

            for (i, call) in calls.iter().enumerate() {
                emit(events, AgentStreamEvent::ToolStart { tool: call.name.clone() }).await;

                let result = match events {
                    None => self.execute_tool(call).await,
                    Some(tx) => match until_closed(tx, self.execute_tool(call)).await {
                        Some(result) => result,
                        None => return self.cancelled(conversation, &calls[i..], model_calls, tool_rounds, tools_invoked),
                    },
                };
                conversation.push(Message::tool_result(&call.id, &call.name, result.output));
                tools_invoked.push(call.name.clone());

                emit(events, AgentStreamEvent::ToolEnd { tool: call.name.clone() }).await;
            }
        }
    }

    /// One streamed model call, forwarding text deltas as they arrive.
    async fn stream_turn(
        &self,
        request: ProviderRequest,
        tx: &mpsc::Sender<AgentStreamEvent>,
    ) -> Result<Message, ProviderError> {
        let mut chunks = self.provider.stream(request).await?;
        let mut content = String::new();
        let mut tool_calls: Vec<MessageToolCall> = Vec::new();

        while let Some(chunk) = chunks.recv().await {
            let chunk = chunk?;
            if let Some(text) = chunk.content.filter(|t| !t.is_empty()) {
                content.push_str(&text);
                let _ = tx.send(AgentStreamEvent::Content(text)).await;
            }
            for delta in chunk.tool_calls {
                match tool_calls.iter_mut().find(|t| t.id == delta.id) {
                    Some(existing) => existing.arguments.push_str(&delta.arguments),
                    None => tool_calls.push(delta),
                }
            }
            if chunk.done {
                break;
            }
        }

        Ok(Message::assistant_with_tools(content, tool_calls))
    }

    async fn execute_tool(&self, call: &MessageToolCall) -> ToolResult {
        debug!(tool = %call.name, call_id = %call.id, "Executing tool");
        let result = match tokio::time::timeout(self.tool_timeout, self.tools.dispatch(call)).await {
            Ok(result) => result,
            Err(_) => ToolResult::error(
                ToolError::Timeout {
                    tool_name: call.name.clone(),
                    timeout_secs: self.tool_timeout.as_secs(),
                }
                .to_string(),
            ),
        };
        if !result.success {
            warn!(tool = %call.name, output = %result.output, "Tool call failed");
        }
        result
    }

    fn cancelled(
        &self,
        conversation: &mut Conversation,
        unanswered: &[MessageToolCall],
        model_calls: u32,
        tool_rounds: u32,
        tools_invoked: Vec<String>,
    ) -> RunOutcome {
        info!(session_id = %conversation.id, "Client disconnected, cancelling run");
        for call in unanswered {
            conversation.push(Message::tool_result(&call.id, &call.name, CANCELLED_RESULT));
        }
        conversation.route = Route::End;
        RunOutcome {
            status: RunStatus::Cancelled,
            message: Message::assistant("").with_metadata("error", "cancelled".into()),
            model_calls,
            tool_rounds,
            tools_invoked,
        }
    }
}

/// Await `fut` unless the event receiver goes away first.
async fn until_closed<F: Future>(tx: &mpsc::Sender<AgentStreamEvent>, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = tx.closed() => None,
        out = fut => Some(out),
    }
}

async fn emit(events: Option<&mpsc::Sender<AgentStreamEvent>>, event: AgentStreamEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use serde_json::json;
    use synapse_core::message::{Role, SessionId};
    use synapse_tools::{InfrastructureGroup, MockInfraBackend, ToolGroup};

    async fn infra_registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        for tool in InfrastructureGroup::new(Arc::new(MockInfraBackend)).load().await.unwrap() {
            registry.register(tool);
        }
        Arc::new(registry)
    }

    fn conversation(question: &str) -> Conversation {
        let mut conv = Conversation::new(SessionId::from("test-session"));
        conv.push(Message::user(question));
        conv
    }

    #[tokio::test]
    async fn empty_registry_answers_directly() {
        let provider = Arc::new(SequentialMockProvider::single_text("Restart the pod."));
        let agent = AgentLoop::new(provider.clone(), "mock-model", Arc::new(ToolRegistry::new()));

        let mut conv = conversation("my pod is crashlooping");
        let outcome = agent.run(&mut conv).await;

        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.response(), "Restart the pod.");
        assert_eq!(conv.len(), 2);
        assert_eq!(conv.route, Route::End);

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].tools.is_empty());
    }

    #[tokio::test]
    async fn system_prompt_is_sent_but_not_persisted() {
        let provider = Arc::new(SequentialMockProvider::single_text("ok"));
        let agent = AgentLoop::new(provider.clone(), "mock-model", infra_registry().await);

        let mut conv = conversation("hi");
        agent.run(&mut conv).await;

        let sent = &provider.requests()[0];
        assert_eq!(sent.messages[0].role, Role::System);
        assert!(sent.messages[0].content.contains("You are Synapse AI"));
        assert!(sent.messages[0].content.contains("- check_metrics: Check system metrics"));
        assert_eq!(sent.tools.len(), 3);
        assert!(conv.messages().iter().all(|m| m.role != Role::System));
    }

    #[tokio::test]
    async fn slow_pod_question_checks_metrics() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_tool_call(
                "check_metrics",
                json!({"resource_type": "kubernetes", "resource_id": "checkout-5d8f"}),
            )],
            "",
            "CPU peaks at 78%; scale the deployment.",
        ));
        let agent = AgentLoop::new(provider.clone(), "mock-model", infra_registry().await);

        let mut conv = conversation("why is pod checkout-5d8f slow");
        let outcome = agent.run(&mut conv).await;

        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.tool_rounds, 1);
        assert_eq!(outcome.tools_invoked, vec!["check_metrics"]);
        assert_eq!(conv.len(), 4);
        assert_eq!(conv.tools_used(), vec!["check_metrics"]);

        let tool_msg = &conv.messages()[2];
        assert_eq!(tool_msg.role, Role::Tool);
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_check_metrics"));
        assert!(tool_msg.content.contains("Metrics for kubernetes/checkout-5d8f"));
        assert!(tool_msg.content.contains("CPU Usage: 45% (avg), 78% (max)"));

        // The second model call sees the tool result.
        assert_eq!(provider.requests()[1].messages.len(), 4);
    }

    #[tokio::test]
    async fn tool_failures_are_fed_back_as_text() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![
                make_tool_call("restart_cluster", json!({})),
                make_tool_call("query_logs", json!({"resource_type": "kubernetes"})),
                MessageToolCall {
                    id: "call_bad".into(),
                    name: "analyze_health".into(),
                    arguments: "{not json".into(),
                },
            ],
            "Let me look.",
            "I could not gather data.",
        ));
        let agent = AgentLoop::new(provider, "mock-model", infra_registry().await);

        let mut conv = conversation("help");
        let outcome = agent.run(&mut conv).await;

        assert_eq!(outcome.status, RunStatus::Completed);
        // user + assistant + 3 tool results + final
        assert_eq!(conv.len(), 6);
        let results: Vec<&str> = conv.messages()[2..5].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(results[0], "Error: Unknown tool: restart_cluster");
        assert!(results[1].starts_with("Error: Invalid tool arguments"));
        assert!(results[1].contains("resource_id"));
        assert!(results[2].starts_with("Error"));
        assert!(results[2].contains("not valid JSON"));
    }

    #[tokio::test]
    async fn iteration_bound_is_enforced() {
        let provider = Arc::new(SequentialMockProvider::always_tool(make_tool_call(
            "analyze_health",
            json!({"resource_type": "azure", "resource_id": "vm-1"}),
        )));
        let agent = AgentLoop::new(provider.clone(), "mock-model", infra_registry().await)
            .with_max_iterations(2);

        let mut conv = conversation("loop forever");
        let outcome = agent.run(&mut conv).await;

        assert_eq!(outcome.status, RunStatus::LoopExceeded);
        assert_eq!(outcome.model_calls, 3);
        assert_eq!(provider.call_count(), 3);
        assert!(outcome.error().unwrap().contains("maximum tool iterations (2)"));

        // user + 3 * (assistant + tool result); the synthetic answer is not appended
        assert_eq!(conv.len(), 7);
        let last = conv.last().unwrap();
        assert_eq!(last.role, Role::Tool);
        assert_eq!(last.content, SKIPPED_RESULT);
    }

    #[tokio::test]
    async fn model_error_becomes_terminal_message() {
        let provider = Arc::new(SequentialMockProvider::from_results(vec![Err(
            ProviderError::RateLimited { retry_after_secs: 20 },
        )]));
        let agent = AgentLoop::new(provider, "mock-model", infra_registry().await);

        let mut conv = conversation("hello");
        let outcome = agent.run(&mut conv).await;

        assert_eq!(outcome.status, RunStatus::ModelError);
        assert!(outcome.response().starts_with("I encountered an error"));
        assert!(outcome.error().is_some());

        // The error answer is part of the history, so the session never ends on a bare user turn.
        assert_eq!(conv.len(), 2);
        let last = conv.last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.content, outcome.response());
        assert!(last.metadata["error"].as_str().unwrap().contains("Rate limited"));
    }

    #[tokio::test]
    async fn model_error_after_tool_round_still_appends() {
        let provider = Arc::new(SequentialMockProvider::from_results(vec![
            Ok(make_tool_call_response(
                vec![make_tool_call("analyze_health", json!({"resource_type": "kubernetes", "resource_id": "api"}))],
                "",
            )),
            Err(ProviderError::Network("connection reset".into())),
        ]));
        let agent = AgentLoop::new(provider, "mock-model", infra_registry().await);

        let mut conv = conversation("is api healthy?");
        let before = conv.len();
        let outcome = agent.run(&mut conv).await;

        assert_eq!(outcome.status, RunStatus::ModelError);
        // assistant tool request + tool result + error answer
        assert_eq!(conv.len(), before + 3);
        assert!(conv.last().unwrap().metadata.contains_key("error"));
    }

    #[tokio::test]
    async fn message_count_grows_one_per_turn_and_call() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(
                vec![
                    make_tool_call("check_metrics", json!({"resource_type": "k8s", "resource_id": "a"})),
                    make_tool_call("query_logs", json!({"resource_type": "k8s", "resource_id": "a", "query": "error"})),
                ],
                "",
            ),
            make_tool_call_response(
                vec![make_tool_call("analyze_health", json!({"resource_type": "k8s", "resource_id": "a"}))],
                "",
            ),
            make_text_response("done"),
        ]));
        let agent = AgentLoop::new(provider, "mock-model", infra_registry().await);

        let mut conv = conversation("investigate a");
        let before = conv.len();
        let outcome = agent.run(&mut conv).await;

        assert_eq!(outcome.model_calls, 3);
        assert_eq!(conv.len(), before + 3 + 3);
        assert_eq!(conv.tools_used(), vec!["check_metrics", "query_logs", "analyze_health"]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_tools_time_out() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(PendingTool));
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_tool_call("pending", json!({}))],
            "",
            "gave up",
        ));
        let agent = AgentLoop::new(provider, "mock-model", Arc::new(registry))
            .with_tool_timeout(Duration::from_secs(5));

        let mut conv = conversation("wait");
        let outcome = agent.run(&mut conv).await;

        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(conv.messages()[2].content, "Error: Tool timed out: pending after 5s");
    }

    #[tokio::test]
    async fn stream_emits_balanced_tool_events() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_tool_call("check_metrics", json!({"resource_type": "k8s", "resource_id": "x"}))],
            "Checking metrics.",
            "All good.",
        ));
        let agent = Arc::new(AgentLoop::new(provider, "mock-model", infra_registry().await));

        let AgentRun { mut events, handle } = agent.run_stream(conversation("status of x"));
        let mut seen = Vec::new();
        while let Some(event) = events.recv().await {
            seen.push(event);
        }
        let (conv, outcome) = handle.await.unwrap();

        assert_eq!(
            seen,
            vec![
                AgentStreamEvent::Content("Checking metrics.".into()),
                AgentStreamEvent::ToolStart { tool: "check_metrics".into() },
                AgentStreamEvent::ToolEnd { tool: "check_metrics".into() },
                AgentStreamEvent::Content("All good.".into()),
            ]
        );
        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(conv.len(), 4);
    }

    #[tokio::test]
    async fn stream_reports_model_error_before_closing() {
        let provider = Arc::new(SequentialMockProvider::from_results(vec![Err(
            ProviderError::AuthenticationFailed("bad key".into()),
        )]));
        let agent = Arc::new(AgentLoop::new(provider, "mock-model", Arc::new(ToolRegistry::new())));

        let AgentRun { mut events, handle } = agent.run_stream(conversation("hi"));
        let event = events.recv().await.unwrap();
        assert!(matches!(event, AgentStreamEvent::Error { status: RunStatus::ModelError, .. }));
        assert!(events.recv().await.is_none());
        assert_eq!(handle.await.unwrap().1.status, RunStatus::ModelError);
    }

    #[tokio::test]
    async fn dropping_the_receiver_cancels_an_in_flight_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(PendingTool));
        let provider = Arc::new(SequentialMockProvider::new(vec![make_tool_call_response(
            vec![make_tool_call("pending", json!({}))],
            "",
        )]));
        let agent = Arc::new(AgentLoop::new(provider.clone(), "mock-model", Arc::new(registry)));

        let AgentRun { mut events, handle } = agent.run_stream(conversation("hang"));
        assert_eq!(
            events.recv().await,
            Some(AgentStreamEvent::ToolStart { tool: "pending".into() })
        );
        drop(events);

        let (conv, outcome) = handle.await.unwrap();
        assert_eq!(outcome.status, RunStatus::Cancelled);
        assert_eq!(provider.call_count(), 1);
        // user + assistant + cancellation marker for the abandoned call
        assert_eq!(conv.len(), 3);
        assert_eq!(conv.last().unwrap().content, CANCELLED_RESULT);
    }

    #[test]
    fn from_config_applies_settings() {
        let mut config = AppConfig::default();
        config.llm.model = "claude-sonnet".into();
        config.agent.max_iterations = 4;
        let agent = AgentLoop::from_config(
            Arc::new(SequentialMockProvider::new(vec![])),
            Arc::new(ToolRegistry::new()),
            &config,
        );
        assert_eq!(agent.model(), "claude-sonnet");
        assert_eq!(agent.max_iterations(), 4);
        assert_eq!(agent.provider_name(), "sequential_mock");
        assert!(agent.system_prompt().contains("No tools are currently available"));
    }

    #[test]
    fn status_names() {
        assert_eq!(RunStatus::LoopExceeded.as_str(), "loop_exceeded");
        assert_eq!(serde_json::to_value(RunStatus::ModelError).unwrap(), json!("model_error"));
    }
}
