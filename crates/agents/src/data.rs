//! Data stage: gathers usage and cost data through the tool dispatcher.

use async_trait::async_trait;
use pentarch_common::{DataResult, Message, Result, SharedState, Stage, TriageResult};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::context::AgentContext;
use crate::traits::Agent;

/// Tools queried for usage data, in order.
const USAGE_TOOLS: &[&str] = &["usage_metrics", "cost_breakdown"];

/// Collects usage metrics for the run. Tolerates individual tool
/// failures and degrades to an empty result when no dispatcher is
/// configured at all.
pub struct DataAgent;

impl DataAgent {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DataAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for DataAgent {
    fn stage(&self) -> Stage {
        Stage::Data
    }

    /// Requires a user request. A missing triage result is filled with
    /// a low-confidence default so the stage can still run.
    fn validate_preconditions(&self, state: &mut SharedState) -> bool {
        if state.user_request().trim().is_empty() {
            return false;
        }
        if state.triage_result().is_none() {
            warn!(run_id = %state.run_id(), "No triage result, assuming a general request");
            let _ = state.set_triage_result(TriageResult::degraded(
                "Classification unavailable, assuming a general request",
            ));
        }
        true
    }

    fn required_inputs(&self) -> &'static str {
        "a non-empty user_request"
    }

    async fn execute_core_logic(&self, state: &mut SharedState, ctx: &AgentContext) -> Result<()> {
        let agent = self.name();
        ctx.advance(agent, state).await?;
        ctx.emitter().notify_agent_started(agent, self.stage()).await;
        ctx.emitter()
            .notify_agent_thinking(agent, "Checking which usage sources are available")
            .await;

        let result = if ctx.has_tools() {
            let category = state
                .triage_result()
                .map(|t| t.category.to_string())
                .unwrap_or_else(|| "general".to_string());
            let params = json!({
                "user_id": state.user_id(),
                "category": category,
            });

            let mut sources = Vec::new();
            let mut failed = Vec::new();
            let mut metrics = Map::new();
            for &tool in USAGE_TOOLS {
                ctx.advance(agent, state).await?;
                match ctx.run_tool(agent, tool, params.clone()).await {
                    Ok(value) => {
                        metrics.insert(tool.to_string(), value);
                        sources.push(tool.to_string());
                    }
                    Err(e) => {
                        warn!(tool = tool, error = %e, "Usage source unavailable");
                        failed.push(tool.to_string());
                    }
                }
            }

            let confidence = if failed.is_empty() {
                0.9
            } else if sources.is_empty() {
                0.3
            } else {
                0.6
            };
            let summary = if sources.is_empty() {
                "No usage sources responded".to_string()
            } else {
                format!("Collected usage data from {}", sources.join(", "))
            };

            let mut result = DataResult::new(sources, metrics, summary, confidence);
            if !failed.is_empty() {
                result.metadata.insert(
                    "failed_sources".into(),
                    Value::Array(failed.into_iter().map(Value::String).collect()),
                );
            }
            result
        } else {
            info!(run_id = %state.run_id(), "No tool dispatcher, producing empty usage data");
            DataResult::degraded()
        };

        ctx.emitter()
            .notify_agent_thinking(
                agent,
                &format!(
                    "Gathered {} of {} usage sources",
                    result.sources.len(),
                    USAGE_TOOLS.len()
                ),
            )
            .await;

        let summary = json!({
            "sources": result.sources,
            "confidence": result.confidence_score,
        });
        state.record_quality("data_confidence", result.confidence_score);
        state.push_message(Message::from_agent(agent, result.summary.clone()));
        if let Err(e) = state.set_data_result(result) {
            return Err(ctx
                .fail(agent, "Data collection could not record its result", e.into())
                .await);
        }

        ctx.advance(agent, state).await?;
        ctx.emitter()
            .notify_agent_completed(agent, self.stage(), summary)
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pentarch_common::{EventEmitter, PentarchError, RunRequest, ToolDispatcher};
    use std::sync::Arc;

    struct EchoDispatcher;

    #[async_trait]
    impl ToolDispatcher for EchoDispatcher {
        async fn dispatch(&self, tool: &str, _params: Value) -> Result<Value> {
            Ok(json!({ "tool": tool, "total": 42 }))
        }
    }

    struct HalfBrokenDispatcher;

    #[async_trait]
    impl ToolDispatcher for HalfBrokenDispatcher {
        async fn dispatch(&self, tool: &str, _params: Value) -> Result<Value> {
            if tool == "cost_breakdown" {
                return Err(PentarchError::Tool {
                    tool: tool.to_string(),
                    reason: "upstream returned 500".to_string(),
                });
            }
            Ok(json!({ "tool": tool }))
        }
    }

    fn state_for(request: &str) -> SharedState {
        SharedState::new(RunRequest::new(request, "user-1", "thread-1")).unwrap()
    }

    fn detached_ctx(state: &SharedState) -> AgentContext {
        AgentContext::new(EventEmitter::detached(
            state.run_id().to_string(),
            state.thread_id().to_string(),
        ))
    }

    #[test]
    fn test_preconditions_fill_missing_triage() {
        let agent = DataAgent::new();
        let mut state = state_for("collect my usage");
        assert!(state.triage_result().is_none());

        assert!(agent.validate_preconditions(&mut state));

        let triage = state.triage_result().unwrap();
        assert_eq!(triage.metadata.get("degraded"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_preconditions_keep_existing_triage() {
        let agent = DataAgent::new();
        let mut state = state_for("collect my usage");
        let existing = TriageResult::new(
            pentarch_common::TriageCategory::Performance,
            pentarch_common::Priority::High,
            "existing",
            0.9,
        );
        state.set_triage_result(existing).unwrap();

        assert!(agent.validate_preconditions(&mut state));
        assert_eq!(state.triage_result().unwrap().summary, "existing");
    }

    #[tokio::test]
    async fn test_execute_without_dispatcher_degrades() {
        let agent = DataAgent::new();
        let mut state = state_for("how much am I spending");
        agent.validate_preconditions(&mut state);
        let ctx = detached_ctx(&state);

        agent.execute_core_logic(&mut state, &ctx).await.unwrap();

        let result = state.data_result().unwrap();
        assert!(result.sources.is_empty());
        assert_eq!(result.metadata.get("degraded"), Some(&Value::Bool(true)));
        assert!(state.quality_metrics().contains_key("data_confidence"));
    }

    #[tokio::test]
    async fn test_execute_collects_all_sources() {
        let agent = DataAgent::new();
        let mut state = state_for("how much am I spending");
        agent.validate_preconditions(&mut state);
        let ctx = detached_ctx(&state).with_tools(Arc::new(EchoDispatcher));

        agent.execute_core_logic(&mut state, &ctx).await.unwrap();

        let result = state.data_result().unwrap();
        assert_eq!(result.sources, vec!["usage_metrics", "cost_breakdown"]);
        assert!(result.metrics.contains_key("usage_metrics"));
        assert_eq!(result.confidence_score, 0.9);
    }

    #[tokio::test]
    async fn test_execute_tolerates_partial_failure() {
        let agent = DataAgent::new();
        let mut state = state_for("how much am I spending");
        agent.validate_preconditions(&mut state);
        let ctx = detached_ctx(&state).with_tools(Arc::new(HalfBrokenDispatcher));

        agent.execute_core_logic(&mut state, &ctx).await.unwrap();

        let result = state.data_result().unwrap();
        assert_eq!(result.sources, vec!["usage_metrics"]);
        assert_eq!(result.confidence_score, 0.6);
        let failed = result.metadata.get("failed_sources").unwrap();
        assert_eq!(failed, &json!(["cost_breakdown"]));
    }
}
