//! Actions stage: turns recommendations into a concrete action plan.

use async_trait::async_trait;
use pentarch_common::{
    ActionItem, ActionPlanResult, DataResult, Message, OptimizationsResult, PentarchError,
    Priority, Result, SharedState, Stage,
};
use pentarch_llm::LlmRequest;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::context::AgentContext;
use crate::extract::{extract_json_object, str_field, str_list};
use crate::traits::Agent;

const ACTIONS_SYSTEM_PROMPT: &str = r#"You are the action planning stage of an infrastructure optimization pipeline.

You receive optimization recommendations and the data behind them. Turn them into an ordered, executable plan. Respond ONLY with a JSON object, no other text:

{
  "action_plan_summary": "one-sentence summary of the plan",
  "actions": [
    {
      "title": "short imperative title",
      "description": "exactly what to do",
      "tool": "optional tool name to execute this with"
    }
  ],
  "plan_steps": ["ordered step 1", "ordered step 2"],
  "priority": "low|normal|high|critical"
}

Rules:
- Every action must trace back to a recommendation you were given
- Order actions by impact, highest first
- Omit "tool" when the action is manual"#;

/// Longest model-response slice kept as the summary of a salvaged plan.
const PARTIAL_PREVIEW_CHARS: usize = 160;

/// Builds the action plan. This stage requires a configured model;
/// without one it fails rather than inventing a plan.
pub struct ActionsAgent {
    temperature: f32,
}

impl ActionsAgent {
    pub fn new() -> Self {
        Self { temperature: 0.4 }
    }

    fn parse_response(content: &str) -> Option<ActionPlanResult> {
        let json_str = extract_json_object(content)?;
        let parsed: Value = serde_json::from_str(json_str).ok()?;

        let mut actions = Vec::new();
        if let Some(items) = parsed.get("actions").and_then(Value::as_array) {
            for item in items {
                let title = str_field(item, "title", "");
                if title.is_empty() {
                    continue;
                }
                let mut action = ActionItem::new(title, str_field(item, "description", title));
                if let Some(tool) = item.get("tool").and_then(Value::as_str) {
                    action = action.with_tool(tool);
                }
                actions.push(action);
            }
        }

        Some(ActionPlanResult::new(
            str_field(&parsed, "action_plan_summary", "Action plan"),
            actions,
            str_list(&parsed, "plan_steps"),
            Priority::parse_lenient(str_field(&parsed, "priority", "normal")),
        ))
    }

    /// Confidence recorded in the quality metrics, derived from how
    /// the plan was obtained.
    fn plan_confidence(plan: &ActionPlanResult) -> f64 {
        if plan.partial_extraction {
            0.4
        } else if plan.error.is_some() {
            0.3
        } else {
            0.85
        }
    }

    fn build_prompt(state: &SharedState) -> String {
        let recommendations = state
            .optimizations_result()
            .map(|o| {
                o.recommendations
                    .iter()
                    .map(|r| format!("- {}: {}", r.title, r.description))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_else(|| "- none".to_string());
        let data_summary = state
            .data_result()
            .map(|d| d.summary.clone())
            .unwrap_or_else(|| "no usage data".to_string());

        format!(
            "Request: {}\nRecommendations:\n{}\nData: {}",
            state.user_request(),
            recommendations,
            data_summary
        )
    }
}

impl Default for ActionsAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for ActionsAgent {
    fn stage(&self) -> Stage {
        Stage::Actions
    }

    /// Missing upstream results are filled with low-confidence
    /// defaults so a plan can still be drafted from the request alone.
    fn validate_preconditions(&self, state: &mut SharedState) -> bool {
        if state.user_request().trim().is_empty() {
            return false;
        }
        if state.data_result().is_none() {
            warn!(run_id = %state.run_id(), "No data result, planning without usage data");
            let _ = state.set_data_result(DataResult::degraded());
        }
        if state.optimizations_result().is_none() {
            warn!(run_id = %state.run_id(), "No optimizations result, planning without recommendations");
            let _ = state.set_optimizations_result(OptimizationsResult::degraded("general"));
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
            .notify_agent_thinking(agent, "Turning the recommendations into an executable plan")
            .await;

        let Some(llm) = ctx.llm() else {
            return Err(ctx
                .fail(
                    agent,
                    "The action planning model is not configured for this run",
                    PentarchError::DependencyMissing {
                        agent,
                        dependency: "LLM client",
                    },
                )
                .await);
        };

        let llm_request = LlmRequest::new(Self::build_prompt(state))
            .with_system(ACTIONS_SYSTEM_PROMPT)
            .with_temperature(self.temperature);

        let plan = match llm.complete(llm_request).await {
            Ok(response) => match Self::parse_response(&response.content) {
                Some(plan) => plan,
                None => {
                    warn!("Action plan response had no usable JSON, keeping the raw text");
                    let preview: String =
                        response.content.chars().take(PARTIAL_PREVIEW_CHARS).collect();
                    ActionPlanResult::partial(
                        preview,
                        Vec::new(),
                        "response contained no JSON object",
                    )
                }
            },
            Err(e) => {
                warn!(error = %e, "Action planning model call failed, using the fallback plan");
                ActionPlanResult::fallback("action planning model call failed")
            }
        };

        ctx.emitter()
            .notify_agent_thinking(
                agent,
                &format!("Drafted a plan with {} actions", plan.actions.len()),
            )
            .await;

        info!(
            run_id = %state.run_id(),
            actions = plan.actions.len(),
            partial = plan.partial_extraction,
            "Action planning complete"
        );

        let summary = json!({
            "actions": plan.actions.len(),
            "priority": plan.priority,
            "partial_extraction": plan.partial_extraction,
        });
        state.record_quality("actions_confidence", Self::plan_confidence(&plan));
        state.push_message(Message::from_agent(agent, plan.action_plan_summary.clone()));
        if let Err(e) = state.set_action_plan_result(plan) {
            return Err(ctx
                .fail(agent, "Action planning could not record its result", e.into())
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
    use pentarch_common::{EventEmitter, RunRequest};
    use pentarch_llm::{LlmClient, LlmResponse};
    use std::sync::Arc;

    struct ScriptedLlm {
        content: String,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _request: LlmRequest) -> Result<LlmResponse> {
            Ok(LlmResponse {
                content: self.content.clone(),
                model: "scripted".to_string(),
                usage: None,
                finish_reason: None,
            })
        }
        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl LlmClient for FailingLlm {
        async fn complete(&self, _request: LlmRequest) -> Result<LlmResponse> {
            Err(PentarchError::Llm("model exploded".to_string()))
        }
        fn model_name(&self) -> &str {
            "failing"
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
    fn test_preconditions_fill_missing_upstream() {
        let agent = ActionsAgent::new();
        let mut state = state_for("make a plan");
        assert!(state.data_result().is_none());
        assert!(state.optimizations_result().is_none());

        assert!(agent.validate_preconditions(&mut state));

        assert!(state.data_result().is_some());
        assert!(state.optimizations_result().is_some());
        assert_eq!(
            state.data_result().unwrap().metadata.get("degraded"),
            Some(&Value::Bool(true))
        );
    }

    #[test]
    fn test_preconditions_reject_empty_request() {
        let agent = ActionsAgent::new();
        let mut state = state_for("  ");
        assert!(!agent.validate_preconditions(&mut state));
    }

    #[test]
    fn test_parse_response_reads_plan() {
        let response = r#"{
            "action_plan_summary": "Scale down and clean up",
            "actions": [
                {"title": "Scale down api fleet", "description": "Reduce from 12 to 6", "tool": "scale_service"},
                {"title": "Delete idle volumes"}
            ],
            "plan_steps": ["Scale down", "Verify", "Clean up"],
            "priority": "high"
        }"#;
        let plan = ActionsAgent::parse_response(response).unwrap();

        assert_eq!(plan.action_plan_summary, "Scale down and clean up");
        assert_eq!(plan.actions.len(), 2);
        assert_eq!(plan.actions[0].tool.as_deref(), Some("scale_service"));
        assert_eq!(plan.actions[1].tool, None);
        assert_eq!(plan.plan_steps.len(), 3);
        assert_eq!(plan.priority, Priority::High);
        assert!(!plan.partial_extraction);
    }

    #[tokio::test]
    async fn test_execute_without_llm_fails_with_dependency_error() {
        let agent = ActionsAgent::new();
        let mut state = state_for("make a plan");
        agent.validate_preconditions(&mut state);
        let ctx = detached_ctx(&state);

        let err = agent.execute_core_logic(&mut state, &ctx).await.unwrap_err();

        assert!(matches!(
            err,
            PentarchError::DependencyMissing {
                agent: "actions_agent",
                dependency: "LLM client",
            }
        ));
        assert!(state.action_plan_result().is_none());
    }

    #[tokio::test]
    async fn test_execute_with_failing_llm_uses_fallback_plan() {
        let agent = ActionsAgent::new();
        let mut state = state_for("make a plan");
        agent.validate_preconditions(&mut state);
        let ctx = detached_ctx(&state).with_llm(Arc::new(FailingLlm));

        agent.execute_core_logic(&mut state, &ctx).await.unwrap();

        let plan = state.action_plan_result().unwrap();
        assert!(plan.error.is_some());
        assert!(!plan.partial_extraction);
        assert!(!plan.actions.is_empty());
        assert_eq!(state.quality_metrics().get("actions_confidence"), Some(&0.3));
    }

    #[tokio::test]
    async fn test_execute_with_prose_response_salvages_partial_plan() {
        let agent = ActionsAgent::new();
        let mut state = state_for("make a plan");
        agent.validate_preconditions(&mut state);
        let ctx = detached_ctx(&state).with_llm(Arc::new(ScriptedLlm {
            content: "I think you should scale down the fleet first.".to_string(),
        }));

        agent.execute_core_logic(&mut state, &ctx).await.unwrap();

        let plan = state.action_plan_result().unwrap();
        assert!(plan.partial_extraction);
        assert!(plan.actions.is_empty());
        assert!(plan.action_plan_summary.contains("scale down"));
        assert_eq!(state.quality_metrics().get("actions_confidence"), Some(&0.4));
    }

    #[tokio::test]
    async fn test_execute_with_clean_response_records_plan() {
        let agent = ActionsAgent::new();
        let mut state = state_for("make a plan");
        agent.validate_preconditions(&mut state);
        let ctx = detached_ctx(&state).with_llm(Arc::new(ScriptedLlm {
            content: r#"{"action_plan_summary":"Do it","actions":[{"title":"Act","description":"Now"}],"plan_steps":["one"],"priority":"critical"}"#
                .to_string(),
        }));

        agent.execute_core_logic(&mut state, &ctx).await.unwrap();

        let plan = state.action_plan_result().unwrap();
        assert_eq!(plan.priority, Priority::Critical);
        assert_eq!(state.quality_metrics().get("actions_confidence"), Some(&0.85));
        assert_eq!(state.messages().len(), 1);
    }
}
