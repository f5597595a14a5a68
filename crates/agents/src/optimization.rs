//! Optimization stage: turns classification and usage data into
//! recommendations.

use async_trait::async_trait;
use pentarch_common::{
    Message, OptimizationsResult, Recommendation, Result, SharedState, Stage, TriageCategory,
};
use pentarch_llm::LlmRequest;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::context::AgentContext;
use crate::extract::{extract_json_object, f64_field, str_field};
use crate::traits::Agent;

const OPTIMIZATION_SYSTEM_PROMPT: &str = r#"You are the optimization stage of an infrastructure optimization pipeline.

You receive a classified request and collected usage data. Propose concrete optimizations. Respond ONLY with a JSON object, no other text:

{
  "optimization_type": "short label for the kind of optimization",
  "recommendations": [
    {
      "title": "short imperative title",
      "description": "what to do and why it helps",
      "estimated_impact": "optional, e.g. '20% cost reduction'"
    }
  ],
  "cost_savings": 0.0,
  "performance_improvement": 0.0,
  "confidence": 0.0-1.0
}

Rules:
- Base every recommendation on the data you were given
- "cost_savings" and "performance_improvement" are fractions (0.2 = 20%); use null when not applicable
- Two to five recommendations, most impactful first"#;

/// Produces optimization recommendations from the triage and data
/// results, with a heuristic fallback when no model is configured.
pub struct OptimizationAgent {
    temperature: f32,
}

impl OptimizationAgent {
    pub fn new() -> Self {
        Self { temperature: 0.5 }
    }

    fn parse_response(content: &str, category: TriageCategory) -> Option<OptimizationsResult> {
        let json_str = extract_json_object(content)?;
        let parsed: Value = serde_json::from_str(json_str).ok()?;

        let mut recommendations = Vec::new();
        if let Some(items) = parsed.get("recommendations").and_then(Value::as_array) {
            for item in items {
                let title = str_field(item, "title", "");
                if title.is_empty() {
                    continue;
                }
                let mut rec = Recommendation::new(title, str_field(item, "description", title));
                if let Some(impact) = item.get("estimated_impact").and_then(Value::as_str) {
                    rec = rec.with_impact(impact);
                }
                recommendations.push(rec);
            }
        }
        if recommendations.is_empty() {
            return None;
        }

        let default_type = category.to_string();
        let mut result = OptimizationsResult::new(
            str_field(&parsed, "optimization_type", &default_type),
            recommendations,
            f64_field(&parsed, "confidence", 0.5),
        );
        if let Some(savings) = parsed.get("cost_savings").and_then(Value::as_f64) {
            result = result.with_cost_savings(savings);
        }
        if let Some(improvement) = parsed.get("performance_improvement").and_then(Value::as_f64) {
            result = result.with_performance_improvement(improvement);
        }
        result
            .metadata
            .insert("generator".into(), Value::from("llm"));
        Some(result)
    }

    /// Canned per-category recommendations for runs without a model.
    fn heuristic_recommendations(category: TriageCategory) -> OptimizationsResult {
        let recommendations = match category {
            TriageCategory::CostOptimization => vec![
                Recommendation::new(
                    "Rightsize over-provisioned resources",
                    "Compare allocated capacity against observed peak usage and scale down instances running below 40% utilization",
                ),
                Recommendation::new(
                    "Remove idle resources",
                    "Identify resources with no traffic in the last 30 days and decommission them",
                ),
            ],
            TriageCategory::Performance => vec![
                Recommendation::new(
                    "Cache hot read paths",
                    "Put a cache in front of the most frequently read endpoints to cut repeated backend work",
                ),
                Recommendation::new(
                    "Index slow queries",
                    "Pull the slowest queries from the query log and add covering indexes",
                ),
            ],
            TriageCategory::Reliability => vec![
                Recommendation::new(
                    "Add health checks with automatic restart",
                    "Detect wedged instances early and recycle them before they affect traffic",
                ),
                Recommendation::new(
                    "Retry flaky downstream calls",
                    "Wrap calls to unreliable dependencies in bounded retries with backoff",
                ),
            ],
            TriageCategory::Security => vec![
                Recommendation::new(
                    "Tighten access policies",
                    "Rotate long-lived credentials and remove permissions not exercised in the last 90 days",
                ),
                Recommendation::new(
                    "Audit public exposure",
                    "Enumerate endpoints and storage reachable from the internet and close anything unintended",
                ),
            ],
            TriageCategory::General => vec![Recommendation::new(
                "Review recent usage for anomalies",
                "Walk through the collected metrics and flag anything that changed sharply",
            )],
        };

        let mut result = OptimizationsResult::new(category.to_string(), recommendations, 0.5);
        result
            .metadata
            .insert("generator".into(), Value::from("heuristic"));
        result
    }

    async fn recommend(&self, ctx: &AgentContext, state: &SharedState) -> OptimizationsResult {
        // Preconditions guarantee both results are present.
        let category = state
            .triage_result()
            .map(|t| t.category)
            .unwrap_or_default();

        let Some(llm) = ctx.llm() else {
            return Self::heuristic_recommendations(category);
        };

        let data_summary = state
            .data_result()
            .map(|d| {
                format!(
                    "{}\nMetrics: {}",
                    d.summary,
                    serde_json::to_string(&d.metrics).unwrap_or_else(|_| "{}".to_string())
                )
            })
            .unwrap_or_else(|| "no usage data".to_string());

        let prompt = format!(
            "Request: {}\nCategory: {}\nUsage data:\n{}",
            state.user_request(),
            category,
            data_summary
        );
        let llm_request = LlmRequest::new(prompt)
            .with_system(OPTIMIZATION_SYSTEM_PROMPT)
            .with_temperature(self.temperature);

        match llm.complete(llm_request).await {
            Ok(response) => match Self::parse_response(&response.content, category) {
                Some(result) => result,
                None => {
                    warn!("Optimization model response had no recommendations, using heuristics");
                    Self::heuristic_recommendations(category)
                }
            },
            Err(e) => {
                warn!(error = %e, "Optimization model call failed, using heuristics");
                Self::heuristic_recommendations(category)
            }
        }
    }
}

impl Default for OptimizationAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for OptimizationAgent {
    fn stage(&self) -> Stage {
        Stage::Optimization
    }

    /// Hard requirement on both upstream results. Unlike the other
    /// stages this one does not synthesize defaults; recommendations
    /// invented without data would be worse than halting.
    fn validate_preconditions(&self, state: &mut SharedState) -> bool {
        !state.user_request().trim().is_empty()
            && state.triage_result().is_some()
            && state.data_result().is_some()
    }

    fn required_inputs(&self) -> &'static str {
        "triage_result and data_result from earlier stages"
    }

    async fn execute_core_logic(&self, state: &mut SharedState, ctx: &AgentContext) -> Result<()> {
        let agent = self.name();
        ctx.advance(agent, state).await?;
        ctx.emitter().notify_agent_started(agent, self.stage()).await;
        ctx.emitter()
            .notify_agent_thinking(agent, "Reviewing the classification and usage data")
            .await;

        let result = self.recommend(ctx, state).await;

        ctx.emitter()
            .notify_agent_thinking(
                agent,
                &format!("Prepared {} recommendations", result.recommendations.len()),
            )
            .await;

        info!(
            run_id = %state.run_id(),
            count = result.recommendations.len(),
            confidence = result.confidence_score,
            "Optimization complete"
        );

        let summary = json!({
            "optimization_type": result.optimization_type,
            "recommendations": result.recommendations.len(),
            "confidence": result.confidence_score,
        });
        state.record_quality("optimization_confidence", result.confidence_score);
        state.push_message(Message::from_agent(
            agent,
            format!(
                "Prepared {} {} recommendations",
                result.recommendations.len(),
                result.optimization_type
            ),
        ));
        if let Err(e) = state.set_optimizations_result(result) {
            return Err(ctx
                .fail(agent, "Optimization could not record its result", e.into())
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
    use pentarch_common::{DataResult, EventEmitter, Priority, RunRequest, TriageResult};

    fn state_with_upstream() -> SharedState {
        let mut state =
            SharedState::new(RunRequest::new("cut our costs", "user-1", "thread-1")).unwrap();
        state
            .set_triage_result(TriageResult::new(
                TriageCategory::CostOptimization,
                Priority::High,
                "Cost reduction request",
                0.9,
            ))
            .unwrap();
        state.set_data_result(DataResult::degraded()).unwrap();
        state
    }

    #[test]
    fn test_preconditions_require_both_upstream_results() {
        let agent = OptimizationAgent::new();

        let mut bare =
            SharedState::new(RunRequest::new("cut our costs", "user-1", "thread-1")).unwrap();
        assert!(!agent.validate_preconditions(&mut bare));

        let mut triage_only =
            SharedState::new(RunRequest::new("cut our costs", "user-1", "thread-1")).unwrap();
        triage_only
            .set_triage_result(TriageResult::degraded("assumed"))
            .unwrap();
        assert!(!agent.validate_preconditions(&mut triage_only));

        let mut full = state_with_upstream();
        assert!(agent.validate_preconditions(&mut full));
    }

    #[test]
    fn test_heuristics_cover_every_category() {
        for category in [
            TriageCategory::CostOptimization,
            TriageCategory::Performance,
            TriageCategory::Reliability,
            TriageCategory::Security,
            TriageCategory::General,
        ] {
            let result = OptimizationAgent::heuristic_recommendations(category);
            assert!(!result.recommendations.is_empty());
            assert_eq!(
                result.metadata.get("generator"),
                Some(&Value::from("heuristic"))
            );
        }
    }

    #[test]
    fn test_parse_response_reads_recommendations() {
        let response = r#"{
            "optimization_type": "rightsizing",
            "recommendations": [
                {"title": "Scale down", "description": "Halve the fleet", "estimated_impact": "30% cost reduction"},
                {"title": "Drop idle volumes"}
            ],
            "cost_savings": 0.3,
            "confidence": 0.85
        }"#;
        let result =
            OptimizationAgent::parse_response(response, TriageCategory::CostOptimization).unwrap();

        assert_eq!(result.optimization_type, "rightsizing");
        assert_eq!(result.recommendations.len(), 2);
        assert_eq!(
            result.recommendations[0].estimated_impact.as_deref(),
            Some("30% cost reduction")
        );
        // Description falls back to the title when absent.
        assert_eq!(result.recommendations[1].description, "Drop idle volumes");
        assert_eq!(result.cost_savings, Some(0.3));
        assert_eq!(result.performance_improvement, None);
    }

    #[test]
    fn test_parse_response_rejects_empty_recommendations() {
        let response = r#"{"optimization_type": "none", "recommendations": []}"#;
        assert!(OptimizationAgent::parse_response(response, TriageCategory::General).is_none());
    }

    #[tokio::test]
    async fn test_execute_without_llm_uses_heuristics() {
        let agent = OptimizationAgent::new();
        let mut state = state_with_upstream();
        let ctx = AgentContext::new(EventEmitter::detached(
            state.run_id().to_string(),
            state.thread_id().to_string(),
        ));

        agent.execute_core_logic(&mut state, &ctx).await.unwrap();

        let result = state.optimizations_result().unwrap();
        assert_eq!(result.optimization_type, "cost_optimization");
        assert_eq!(result.recommendations.len(), 2);
        assert!(state.quality_metrics().contains_key("optimization_confidence"));
    }
}
