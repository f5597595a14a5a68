//! Triage stage: classifies the incoming request.

use async_trait::async_trait;
use pentarch_common::{
    Message, Priority, Result, SharedState, Stage, TriageCategory, TriageResult,
};
use pentarch_llm::LlmRequest;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::context::AgentContext;
use crate::extract::{extract_json_object, f64_field, str_field};
use crate::traits::Agent;

const TRIAGE_SYSTEM_PROMPT: &str = r#"You are the triage stage of an infrastructure optimization pipeline.

Classify the user's request. Respond ONLY with a JSON object, no other text. The JSON must have this exact structure:

{
  "category": "cost_optimization|performance|reliability|security|general",
  "priority": "low|normal|high|critical",
  "summary": "one-sentence restatement of what the user wants",
  "confidence": 0.0-1.0
}

Category definitions:
- "cost_optimization": Reducing spend, rightsizing, eliminating waste
- "performance": Latency, throughput, slow queries, scaling behavior
- "reliability": Outages, error rates, failover, resilience
- "security": Access control, exposure, patching, compliance
- "general": Anything that does not fit the above

Examples:

User: "Our AWS bill doubled last month, help"
{"category":"cost_optimization","priority":"high","summary":"Investigate and reduce a doubled AWS bill","confidence":0.95}

User: "API latency spikes every day at noon"
{"category":"performance","priority":"high","summary":"Diagnose recurring midday API latency spikes","confidence":0.9}"#;

/// Longest request slice included in the classification prompt.
const MAX_PROMPT_CHARS: usize = 4000;

/// Classifies the user request into a category and priority, with an
/// LLM when one is configured and keyword matching otherwise.
pub struct TriageAgent {
    temperature: f32,
}

impl TriageAgent {
    pub fn new() -> Self {
        // Low temperature for consistent classification
        Self { temperature: 0.3 }
    }

    fn parse_response(content: &str, original: &str) -> Option<TriageResult> {
        let json_str = extract_json_object(content)?;
        let parsed: Value = serde_json::from_str(json_str).ok()?;

        let category = match str_field(&parsed, "category", "general") {
            "cost_optimization" => TriageCategory::CostOptimization,
            "performance" => TriageCategory::Performance,
            "reliability" => TriageCategory::Reliability,
            "security" => TriageCategory::Security,
            other => {
                if other != "general" {
                    warn!(category = other, "Unknown triage category, using general");
                }
                TriageCategory::General
            }
        };

        let priority = Priority::parse_lenient(str_field(&parsed, "priority", "normal"));
        let summary = str_field(&parsed, "summary", original).to_string();
        let confidence = f64_field(&parsed, "confidence", 0.5);

        Some(
            TriageResult::new(category, priority, summary, confidence)
                .with_metadata("classifier", Value::from("llm")),
        )
    }

    /// Keyword classification, the fallback when no model is
    /// configured or the model response was unusable.
    fn keyword_classify(content: &str) -> TriageResult {
        let lower = content.to_lowercase();

        let (category, priority, summary, confidence) = if lower.contains("cost")
            || lower.contains("bill")
            || lower.contains("spend")
            || lower.contains("expensive")
            || lower.contains("budget")
        {
            (
                TriageCategory::CostOptimization,
                Priority::High,
                "Cost reduction request",
                0.75,
            )
        } else if lower.contains("slow")
            || lower.contains("latency")
            || lower.contains("performance")
            || lower.contains("timeout")
            || lower.contains("throughput")
        {
            (
                TriageCategory::Performance,
                Priority::High,
                "Performance investigation request",
                0.7,
            )
        } else if lower.contains("outage")
            || lower.contains("down")
            || lower.contains("crash")
            || lower.contains("error rate")
            || lower.contains("failover")
        {
            (
                TriageCategory::Reliability,
                Priority::Critical,
                "Reliability incident request",
                0.7,
            )
        } else if lower.contains("security")
            || lower.contains("vulnerab")
            || lower.contains("breach")
            || lower.contains("exposed")
            || lower.contains("compliance")
        {
            (
                TriageCategory::Security,
                Priority::High,
                "Security review request",
                0.7,
            )
        } else {
            (
                TriageCategory::General,
                Priority::Normal,
                "General assistance request",
                0.6,
            )
        };

        TriageResult::new(category, priority, summary, confidence)
            .with_metadata("classifier", Value::from("keyword"))
    }

    async fn classify(&self, ctx: &AgentContext, request: &str) -> TriageResult {
        let Some(llm) = ctx.llm() else {
            return Self::keyword_classify(request);
        };

        let truncated: String = request.chars().take(MAX_PROMPT_CHARS).collect();
        let llm_request = LlmRequest::new(format!("Classify this request:\n\n{truncated}"))
            .with_system(TRIAGE_SYSTEM_PROMPT)
            .with_temperature(self.temperature);

        match llm.complete(llm_request).await {
            Ok(response) => match Self::parse_response(&response.content, request) {
                Some(result) => result,
                None => {
                    warn!("Triage model response had no usable JSON, using keyword fallback");
                    Self::keyword_classify(request)
                }
            },
            Err(e) => {
                warn!(error = %e, "Triage model call failed, using keyword fallback");
                Self::keyword_classify(request)
            }
        }
    }
}

impl Default for TriageAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for TriageAgent {
    fn stage(&self) -> Stage {
        Stage::Triage
    }

    fn validate_preconditions(&self, state: &mut SharedState) -> bool {
        !state.user_request().trim().is_empty()
    }

    fn required_inputs(&self) -> &'static str {
        "a non-empty user_request"
    }

    async fn execute_core_logic(&self, state: &mut SharedState, ctx: &AgentContext) -> Result<()> {
        let agent = self.name();
        ctx.advance(agent, state).await?;
        ctx.emitter().notify_agent_started(agent, self.stage()).await;
        ctx.emitter()
            .notify_agent_thinking(agent, "Reading the request to decide its category")
            .await;

        let result = self.classify(ctx, state.user_request()).await;

        ctx.emitter()
            .notify_agent_thinking(
                agent,
                &format!(
                    "Classified as {} with {} priority",
                    result.category, result.priority
                ),
            )
            .await;

        info!(
            run_id = %state.run_id(),
            category = %result.category,
            confidence = result.confidence_score,
            "Triage complete"
        );

        let summary = json!({
            "category": result.category,
            "priority": result.priority,
            "confidence": result.confidence_score,
        });
        state.record_quality("triage_confidence", result.confidence_score);
        state.push_message(Message::from_agent(agent, result.summary.clone()));
        if let Err(e) = state.set_triage_result(result) {
            return Err(ctx
                .fail(agent, "Triage could not record its result", e.into())
                .await);
        }

        ctx.advance(agent, state).await?;
        ctx.emitter()
            .notify_agent_completed(agent, self.stage(), summary)
            .await;
        Ok(())
    }
}
