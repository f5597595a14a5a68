//! Reporting stage: assembles the final report for the user.

use async_trait::async_trait;
use pentarch_common::{
    ActionPlanResult, DataResult, Message, OptimizationsResult, ReportResult, Result, SharedState,
    Stage, TriageResult,
};
use pentarch_llm::LlmRequest;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::context::AgentContext;
use crate::traits::Agent;

const REPORTING_SYSTEM_PROMPT: &str = r#"You are the reporting stage of an infrastructure optimization pipeline.

You receive a draft markdown report. Rewrite it for clarity and flow. Keep every fact, number and recommendation exactly as given. Keep the markdown headings. Return only the polished markdown, no commentary."#;

/// Section headings of the composed report, in order.
const REPORT_SECTIONS: &[&str] = &[
    "Request",
    "Classification",
    "Usage Data",
    "Recommendations",
    "Action Plan",
];

/// Composes the final report from whatever the earlier stages
/// produced. Always succeeds: missing upstream results are replaced
/// with low-confidence defaults and the template never needs a model.
pub struct ReportingAgent {
    temperature: f32,
}

impl ReportingAgent {
    pub fn new() -> Self {
        Self { temperature: 0.3 }
    }

    fn compose_report(state: &SharedState) -> String {
        let mut report = String::from("# Optimization Report\n");

        report.push_str("\n## Request\n");
        report.push_str(state.user_request());
        report.push('\n');

        report.push_str("\n## Classification\n");
        if let Some(triage) = state.triage_result() {
            report.push_str(&format!(
                "Category: {}\nPriority: {}\n\n{}\n",
                triage.category, triage.priority, triage.summary
            ));
        }

        report.push_str("\n## Usage Data\n");
        if let Some(data) = state.data_result() {
            report.push_str(&data.summary);
            report.push('\n');
            if !data.sources.is_empty() {
                report.push_str(&format!("Sources: {}\n", data.sources.join(", ")));
            }
        }

        report.push_str("\n## Recommendations\n");
        match state.optimizations_result() {
            Some(opts) if !opts.recommendations.is_empty() => {
                for (i, rec) in opts.recommendations.iter().enumerate() {
                    report.push_str(&format!("{}. **{}**: {}", i + 1, rec.title, rec.description));
                    if let Some(impact) = &rec.estimated_impact {
                        report.push_str(&format!(" ({})", impact));
                    }
                    report.push('\n');
                }
                if let Some(savings) = opts.cost_savings {
                    report.push_str(&format!(
                        "\nEstimated cost savings: {:.0}%\n",
                        savings * 100.0
                    ));
                }
            }
            _ => report.push_str("No recommendations were produced for this run.\n"),
        }

        report.push_str("\n## Action Plan\n");
        if let Some(plan) = state.action_plan_result() {
            report.push_str(&plan.action_plan_summary);
            report.push('\n');
            for (i, action) in plan.actions.iter().enumerate() {
                report.push_str(&format!("{}. {}: {}\n", i + 1, action.title, action.description));
            }
            if plan.partial_extraction {
                report.push_str("\nNote: this plan was partially recovered and may be incomplete.\n");
            }
        }

        report
    }

    /// Overall confidence is the mean of the upstream stage
    /// confidences. Preconditions guarantee all three are present.
    fn report_confidence(state: &SharedState) -> f64 {
        let confidences = [
            state.triage_result().map(|r| r.confidence_score),
            state.data_result().map(|r| r.confidence_score),
            state.optimizations_result().map(|r| r.confidence_score),
        ];
        let present: Vec<f64> = confidences.into_iter().flatten().collect();
        if present.is_empty() {
            return 0.0;
        }
        present.iter().sum::<f64>() / present.len() as f64
    }

    async fn polish(&self, ctx: &AgentContext, draft: &str) -> Option<String> {
        let llm = ctx.llm()?;
        let request = LlmRequest::new(draft.to_string())
            .with_system(REPORTING_SYSTEM_PROMPT)
            .with_temperature(self.temperature);

        match llm.complete(request).await {
            Ok(response) if !response.content.trim().is_empty() => Some(response.content),
            Ok(_) => {
                warn!("Report polish returned an empty response, keeping the draft");
                None
            }
            Err(e) => {
                warn!(error = %e, "Report polish failed, keeping the draft");
                None
            }
        }
    }
}

impl Default for ReportingAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for ReportingAgent {
    fn stage(&self) -> Stage {
        Stage::Reporting
    }

    /// Fills every missing upstream slot with a degraded default so
    /// the report can always be produced.
    fn validate_preconditions(&self, state: &mut SharedState) -> bool {
        if state.user_request().trim().is_empty() {
            return false;
        }
        if state.triage_result().is_none() {
            let _ = state.set_triage_result(TriageResult::degraded(
                "Classification unavailable, assuming a general request",
            ));
        }
        if state.data_result().is_none() {
            let _ = state.set_data_result(DataResult::degraded());
        }
        if state.optimizations_result().is_none() {
            let _ = state.set_optimizations_result(OptimizationsResult::degraded("general"));
        }
        if state.action_plan_result().is_none() {
            let _ = state.set_action_plan_result(ActionPlanResult::fallback(
                "no action plan was produced by the earlier stages",
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
            .notify_agent_thinking(agent, "Assembling the report from the collected results")
            .await;

        let draft = Self::compose_report(state);
        let confidence = Self::report_confidence(state);
        let recommendations_count = state
            .optimizations_result()
            .map(|o| o.recommendations.len())
            .unwrap_or(0);

        let (report, polished) = match self.polish(ctx, &draft).await {
            Some(text) => (text, true),
            None => (draft, false),
        };
        let thought = if polished {
            "Polished the report with the model"
        } else {
            "Formatted the report from the template"
        };
        ctx.emitter().notify_agent_thinking(agent, thought).await;

        info!(
            run_id = %state.run_id(),
            recommendations = recommendations_count,
            confidence = confidence,
            polished = polished,
            "Report complete"
        );

        let mut result = ReportResult::new(
            report,
            REPORT_SECTIONS.iter().map(|s| s.to_string()).collect(),
            recommendations_count,
            confidence,
        );
        if polished {
            result.metadata.insert("polished".into(), Value::Bool(true));
        }

        let summary = json!({
            "sections": result.sections,
            "recommendations_count": recommendations_count,
            "confidence": result.confidence_score,
        });
        state.record_quality("report_confidence", result.confidence_score);
        state.push_message(Message::from_agent(agent, result.report.clone()));
        if let Err(e) = state.set_report_result(result) {
            return Err(ctx
                .fail(agent, "Reporting could not record its result", e.into())
                .await);
        }

        ctx.advance(agent, state).await?;
        ctx.emitter()
            .notify_agent_completed(agent, self.stage(), summary)
            .await;
        Ok(())
    }
}
