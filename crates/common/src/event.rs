//! Pipeline lifecycle events and the transport-agnostic emitter.
//!
//! Every externally observable moment in a run is published as a
//! [`PipelineEvent`] with a fixed payload shape:
//!
//! ```json
//! {
//!   "event_type": "agent_started",
//!   "run_id": "run_...",
//!   "thread_id": "thread_...",
//!   "timestamp": 1700000000000,
//!   "data": { "agent": "triage_agent", "stage": "triage" }
//! }
//! ```
//!
//! Delivery is best effort. A run without a transport still executes
//! every stage, and a slow or failing transport is logged and skipped
//! rather than surfaced to the pipeline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::warn;

use crate::error::Result;
use crate::message::now_millis;
use crate::state::Stage;

/// Default ceiling on how long one event delivery may take.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Lifecycle event kinds, in wire naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AgentStarted,
    AgentThinking,
    ToolExecuting,
    ToolCompleted,
    AgentCompleted,
    Error,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::AgentStarted => "agent_started",
            EventType::AgentThinking => "agent_thinking",
            EventType::ToolExecuting => "tool_executing",
            EventType::ToolCompleted => "tool_completed",
            EventType::AgentCompleted => "agent_completed",
            EventType::Error => "error",
        }
    }
}

/// Outcome reported in a `tool_completed` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Error,
}

/// One event as delivered to transports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub event_type: EventType,
    pub run_id: String,
    pub thread_id: String,
    /// Timestamp (Unix millis)
    pub timestamp: u64,
    pub data: Value,
}

/// Transport seam for event delivery.
///
/// Implementations forward events to whatever carries them to clients.
/// Errors are recovered by the emitter and never reach the pipeline.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, event: PipelineEvent) -> Result<()>;
}

/// Sink that fans events out over a tokio broadcast channel.
///
/// A send failure means no receiver is currently subscribed, which is
/// a normal condition, not an error.
pub struct BroadcastSink {
    sender: broadcast::Sender<PipelineEvent>,
}

impl BroadcastSink {
    pub fn new(sender: broadcast::Sender<PipelineEvent>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl EventSink for BroadcastSink {
    async fn deliver(&self, event: PipelineEvent) -> Result<()> {
        let _ = self.sender.send(event);
        Ok(())
    }
}

/// Per-run event publisher.
///
/// Cheap to clone; every clone stamps the same run and thread ids onto
/// the events it builds. Without a sink every `notify_*` call is a
/// no-op, so agents can emit unconditionally.
#[derive(Clone)]
pub struct EventEmitter {
    run_id: String,
    thread_id: String,
    sink: Option<Arc<dyn EventSink>>,
    delivery_timeout: Duration,
}

impl EventEmitter {
    pub fn new(
        run_id: impl Into<String>,
        thread_id: impl Into<String>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            thread_id: thread_id.into(),
            sink: Some(sink),
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
        }
    }

    /// Emitter with no transport attached. Events are dropped.
    pub fn detached(run_id: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            thread_id: thread_id.into(),
            sink: None,
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
        }
    }

    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    pub async fn notify_agent_started(&self, agent: &str, stage: Stage) {
        self.emit(
            EventType::AgentStarted,
            json!({ "agent": agent, "stage": stage }),
        )
        .await;
    }

    pub async fn notify_agent_thinking(&self, agent: &str, thought: &str) {
        self.emit(
            EventType::AgentThinking,
            json!({ "agent": agent, "thought": thought }),
        )
        .await;
    }

    pub async fn notify_tool_executing(&self, agent: &str, tool: &str, params: &Value) {
        self.emit(
            EventType::ToolExecuting,
            json!({ "agent": agent, "tool": tool, "params": params }),
        )
        .await;
    }

    pub async fn notify_tool_completed(
        &self,
        agent: &str,
        tool: &str,
        status: ToolStatus,
        detail: &str,
    ) {
        self.emit(
            EventType::ToolCompleted,
            json!({ "agent": agent, "tool": tool, "status": status, "detail": detail }),
        )
        .await;
    }

    pub async fn notify_agent_completed(&self, agent: &str, stage: Stage, summary: Value) {
        self.emit(
            EventType::AgentCompleted,
            json!({ "agent": agent, "stage": stage, "summary": summary }),
        )
        .await;
    }

    /// Publishes a user-facing error notification. `message` must be
    /// sanitized; internal details belong in the log, not the event.
    pub async fn notify_error(&self, agent: &str, message: &str) {
        self.emit(
            EventType::Error,
            json!({ "agent": agent, "message": message }),
        )
        .await;
    }

    async fn emit(&self, event_type: EventType, data: Value) {
        let Some(sink) = &self.sink else {
            return;
        };

        let event = PipelineEvent {
            event_type,
            run_id: self.run_id.clone(),
            thread_id: self.thread_id.clone(),
            timestamp: now_millis(),
            data,
        };

        match tokio::time::timeout(self.delivery_timeout, sink.deliver(event)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(event = event_type.as_str(), error = %e, "Event delivery failed");
            }
            Err(_) => {
                warn!(
                    event = event_type.as_str(),
                    timeout_ms = self.delivery_timeout.as_millis() as u64,
                    "Event delivery timed out"
                );
            }
        }
    }
}
