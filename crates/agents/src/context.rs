//! Collaborators injected into every stage for one run.

use std::sync::Arc;
use std::time::Duration;

use pentarch_common::{
    EventEmitter, PentarchError, Result, SharedState, ToolDispatcher, ToolStatus,
};
use pentarch_llm::LlmClient;
use serde_json::Value;
use tracing::{error, warn};

/// Default ceiling on a single tool dispatch.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

const TOOL_DETAIL_PREVIEW_CHARS: usize = 80;

/// Per-run dependency bundle handed to agents.
///
/// The supervisor builds one per run. Agents receive it by reference
/// and keep no collaborator state of their own.
pub struct AgentContext {
    emitter: EventEmitter,
    llm: Option<Arc<dyn LlmClient>>,
    tools: Option<Arc<dyn ToolDispatcher>>,
    tool_timeout: Duration,
}

impl AgentContext {
    pub fn new(emitter: EventEmitter) -> Self {
        Self {
            emitter,
            llm: None,
            tools: None,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_tools(mut self, tools: Arc<dyn ToolDispatcher>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }

    pub fn llm(&self) -> Option<&Arc<dyn LlmClient>> {
        self.llm.as_ref()
    }

    pub fn has_tools(&self) -> bool {
        self.tools.is_some()
    }

    /// Dispatches a tool call wrapped in its event pair.
    ///
    /// Exactly one `tool_completed` follows every `tool_executing`,
    /// also when the dispatcher fails or the call times out.
    pub async fn run_tool(&self, agent: &'static str, tool: &str, params: Value) -> Result<Value> {
        let Some(dispatcher) = &self.tools else {
            return Err(PentarchError::DependencyMissing {
                agent,
                dependency: "tool dispatcher",
            });
        };

        self.emitter.notify_tool_executing(agent, tool, &params).await;

        let outcome = tokio::time::timeout(self.tool_timeout, dispatcher.dispatch(tool, params));
        match outcome.await {
            Ok(Ok(value)) => {
                let detail: String = value
                    .to_string()
                    .chars()
                    .take(TOOL_DETAIL_PREVIEW_CHARS)
                    .collect();
                self.emitter
                    .notify_tool_completed(agent, tool, ToolStatus::Success, &detail)
                    .await;
                Ok(value)
            }
            Ok(Err(e)) => {
                warn!(agent = agent, tool = tool, error = %e, "Tool dispatch failed");
                self.emitter
                    .notify_tool_completed(agent, tool, ToolStatus::Error, "tool call failed")
                    .await;
                Err(PentarchError::Tool {
                    tool: tool.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                warn!(
                    agent = agent,
                    tool = tool,
                    timeout_ms = self.tool_timeout.as_millis() as u64,
                    "Tool dispatch timed out"
                );
                self.emitter
                    .notify_tool_completed(agent, tool, ToolStatus::Error, "tool call timed out")
                    .await;
                Err(PentarchError::Tool {
                    tool: tool.to_string(),
                    reason: format!(
                        "timed out after {}ms",
                        self.tool_timeout.as_millis()
                    ),
                })
            }
        }
    }

    /// Publishes the user-facing error event and hands the error back
    /// for propagation. The single exit for stage failures; internal
    /// detail goes to the log, never into the event.
    pub async fn fail(
        &self,
        agent: &'static str,
        public_message: &str,
        err: PentarchError,
    ) -> PentarchError {
        error!(agent = agent, error = %err, "Stage failed");
        self.emitter.notify_error(agent, public_message).await;
        err
    }

    /// Advances the run's step counter, converting a blown step budget
    /// into the standard failure path.
    pub async fn advance(&self, agent: &'static str, state: &mut SharedState) -> Result<()> {
        match state.advance_step() {
            Ok(_) => Ok(()),
            Err(e) => Err(self
                .fail(agent, "Run exceeded its step budget", e.into())
                .await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pentarch_common::{EventSink, EventType, PipelineEvent};
    use serde_json::json;
    use std::sync::Mutex;

    struct RecordingSink {
        events: Mutex<Vec<PipelineEvent>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
            })
        }

        fn event_types(&self) -> Vec<EventType> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|e| e.event_type)
                .collect()
        }
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn deliver(&self, event: PipelineEvent) -> Result<()> {
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    struct EchoDispatcher;

    #[async_trait]
    impl ToolDispatcher for EchoDispatcher {
        async fn dispatch(&self, tool: &str, params: Value) -> Result<Value> {
            Ok(json!({ "tool": tool, "params": params }))
        }
    }

    struct FailingDispatcher;

    #[async_trait]
    impl ToolDispatcher for FailingDispatcher {
        async fn dispatch(&self, _tool: &str, _params: Value) -> Result<Value> {
            Err(PentarchError::Tool {
                tool: "usage_metrics".to_string(),
                reason: "backend offline".to_string(),
            })
        }
    }

    struct StuckDispatcher;

    #[async_trait]
    impl ToolDispatcher for StuckDispatcher {
        async fn dispatch(&self, _tool: &str, _params: Value) -> Result<Value> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Value::Null)
        }
    }

    fn context_with(sink: Arc<RecordingSink>, tools: Arc<dyn ToolDispatcher>) -> AgentContext {
        AgentContext::new(EventEmitter::new("run_1", "thread_1", sink)).with_tools(tools)
    }

    #[tokio::test]
    async fn test_run_tool_pairs_events_on_success() {
        let sink = RecordingSink::new();
        let ctx = context_with(sink.clone(), Arc::new(EchoDispatcher));

        let value = ctx
            .run_tool("data_agent", "usage_metrics", json!({ "window": "30d" }))
            .await
            .unwrap();
        assert_eq!(value["tool"], "usage_metrics");

        assert_eq!(
            sink.event_types(),
            vec![EventType::ToolExecuting, EventType::ToolCompleted]
        );
        let events = sink.events.lock().unwrap();
        assert_eq!(events[1].data["status"], "success");
    }

    #[tokio::test]
    async fn test_run_tool_pairs_events_on_failure() {
        let sink = RecordingSink::new();
        let ctx = context_with(sink.clone(), Arc::new(FailingDispatcher));

        let result = ctx.run_tool("data_agent", "usage_metrics", json!({})).await;
        assert!(result.is_err());

        assert_eq!(
            sink.event_types(),
            vec![EventType::ToolExecuting, EventType::ToolCompleted]
        );
        let events = sink.events.lock().unwrap();
        assert_eq!(events[1].data["status"], "error");
    }

    #[tokio::test]
    async fn test_run_tool_pairs_events_on_timeout() {
        let sink = RecordingSink::new();
        let ctx = context_with(sink.clone(), Arc::new(StuckDispatcher))
            .with_tool_timeout(Duration::from_millis(20));

        let result = ctx.run_tool("data_agent", "cost_breakdown", json!({})).await;
        assert!(matches!(result, Err(PentarchError::Tool { .. })));

        assert_eq!(
            sink.event_types(),
            vec![EventType::ToolExecuting, EventType::ToolCompleted]
        );
        let events = sink.events.lock().unwrap();
        assert_eq!(events[1].data["status"], "error");
        assert_eq!(events[1].data["detail"], "tool call timed out");
    }

    #[tokio::test]
    async fn test_run_tool_without_dispatcher_names_the_dependency() {
        let ctx = AgentContext::new(EventEmitter::detached("run_1", "thread_1"));

        let err = ctx
            .run_tool("data_agent", "usage_metrics", json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("tool dispatcher"));
        assert!(err.to_string().contains("data_agent"));
    }

    #[tokio::test]
    async fn test_fail_emits_sanitized_error_event() {
        let sink = RecordingSink::new();
        let ctx = AgentContext::new(EventEmitter::new("run_1", "thread_1", sink.clone()));

        let err = ctx
            .fail(
                "actions_agent",
                "The action planner is unavailable for this run",
                PentarchError::Llm("secret internal detail".to_string()),
            )
            .await;
        assert!(matches!(err, PentarchError::Llm(_)));

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Error);
        assert_eq!(
            events[0].data["message"],
            "The action planner is unavailable for this run"
        );
        assert!(!events[0].data.to_string().contains("secret internal detail"));
    }
}
