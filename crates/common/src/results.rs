//! Result payloads produced by the pipeline stages.
//!
//! Each stage writes exactly one of these into the shared state's
//! write-once slot for it. Results are treated as immutable once
//! written; downstream stages read them by shared reference.
//! Constructors clamp confidence scores into [0.0, 1.0] so a
//! misbehaving model cannot push out-of-range values downstream.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Clamps a model-reported confidence into the valid range.
pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        return 0.0;
    }
    confidence.clamp(0.0, 1.0)
}

/// Priority assigned to a request or an action plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    /// Lenient parse used on model output; unknown strings map to
    /// Normal.
    pub fn parse_lenient(s: &str) -> Self {
        match s {
            "low" => Priority::Low,
            "high" => Priority::High,
            "critical" => Priority::Critical,
            _ => Priority::Normal,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        };
        write!(f, "{}", name)
    }
}

/// Request category decided by triage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageCategory {
    CostOptimization,
    Performance,
    Reliability,
    Security,
    #[default]
    General,
}

impl std::fmt::Display for TriageCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TriageCategory::CostOptimization => "cost_optimization",
            TriageCategory::Performance => "performance",
            TriageCategory::Reliability => "reliability",
            TriageCategory::Security => "security",
            TriageCategory::General => "general",
        };
        write!(f, "{}", name)
    }
}

/// Classification of the user request, produced by the triage stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageResult {
    pub category: TriageCategory,
    pub priority: Priority,
    pub summary: String,
    pub confidence_score: f64,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl TriageResult {
    pub fn new(
        category: TriageCategory,
        priority: Priority,
        summary: impl Into<String>,
        confidence_score: f64,
    ) -> Self {
        Self {
            category,
            priority,
            summary: summary.into(),
            confidence_score: clamp_confidence(confidence_score),
            metadata: Map::new(),
        }
    }

    /// Low-confidence placeholder used when triage had to be assumed
    /// rather than computed.
    pub fn degraded(summary: impl Into<String>) -> Self {
        let mut result = Self::new(TriageCategory::General, Priority::Normal, summary, 0.3);
        result.metadata.insert("degraded".into(), Value::Bool(true));
        result
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Usage data gathered by the data stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataResult {
    /// Tool names that contributed data.
    pub sources: Vec<String>,
    pub metrics: Map<String, Value>,
    pub summary: String,
    pub confidence_score: f64,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl DataResult {
    pub fn new(
        sources: Vec<String>,
        metrics: Map<String, Value>,
        summary: impl Into<String>,
        confidence_score: f64,
    ) -> Self {
        Self {
            sources,
            metrics,
            summary: summary.into(),
            confidence_score: clamp_confidence(confidence_score),
            metadata: Map::new(),
        }
    }

    /// Empty placeholder for runs where no usage data could be
    /// collected.
    pub fn degraded() -> Self {
        let mut result = Self::new(Vec::new(), Map::new(), "no usage data available", 0.2);
        result.metadata.insert("degraded".into(), Value::Bool(true));
        result
    }
}

/// A single optimization suggestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_impact: Option<String>,
}

impl Recommendation {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            estimated_impact: None,
        }
    }

    pub fn with_impact(mut self, impact: impl Into<String>) -> Self {
        self.estimated_impact = Some(impact.into());
        self
    }
}

/// Recommendations produced by the optimization stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationsResult {
    pub optimization_type: String,
    pub recommendations: Vec<Recommendation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_savings: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance_improvement: Option<f64>,
    pub confidence_score: f64,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl OptimizationsResult {
    pub fn new(
        optimization_type: impl Into<String>,
        recommendations: Vec<Recommendation>,
        confidence_score: f64,
    ) -> Self {
        Self {
            optimization_type: optimization_type.into(),
            recommendations,
            cost_savings: None,
            performance_improvement: None,
            confidence_score: clamp_confidence(confidence_score),
            metadata: Map::new(),
        }
    }

    /// Empty default for runs where no recommendations could be
    /// computed.
    pub fn degraded(optimization_type: impl Into<String>) -> Self {
        let mut result = Self::new(optimization_type, Vec::new(), 0.2);
        result.metadata.insert("degraded".into(), Value::Bool(true));
        result
    }

    pub fn with_cost_savings(mut self, savings: f64) -> Self {
        self.cost_savings = Some(savings);
        self
    }

    pub fn with_performance_improvement(mut self, improvement: f64) -> Self {
        self.performance_improvement = Some(improvement);
        self
    }
}

/// A single executable action inside a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionItem {
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}

impl ActionItem {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            tool: None,
        }
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }
}

/// Concrete action plan produced by the actions stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPlanResult {
    pub action_plan_summary: String,
    pub actions: Vec<ActionItem>,
    pub plan_steps: Vec<String>,
    pub priority: Priority,
    /// True when the plan was salvaged from a malformed model
    /// response rather than parsed cleanly.
    #[serde(default)]
    pub partial_extraction: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl ActionPlanResult {
    pub fn new(
        action_plan_summary: impl Into<String>,
        actions: Vec<ActionItem>,
        plan_steps: Vec<String>,
        priority: Priority,
    ) -> Self {
        Self {
            action_plan_summary: action_plan_summary.into(),
            actions,
            plan_steps,
            priority,
            partial_extraction: false,
            error: None,
            metadata: Map::new(),
        }
    }

    /// Default plan used when the model call failed outright.
    pub fn fallback(reason: impl Into<String>) -> Self {
        let mut result = Self::new(
            "Review the findings above and address the highest-priority recommendation first",
            vec![ActionItem::new(
                "Manual review",
                "Walk through the recommendations and pick the ones that apply",
            )],
            vec!["Review recommendations".to_string()],
            Priority::Normal,
        );
        result.error = Some(reason.into());
        result.metadata.insert("degraded".into(), Value::Bool(true));
        result
    }

    /// Plan salvaged from a response that did not parse cleanly.
    pub fn partial(
        action_plan_summary: impl Into<String>,
        actions: Vec<ActionItem>,
        error: impl Into<String>,
    ) -> Self {
        let mut result = Self::new(action_plan_summary, actions, Vec::new(), Priority::Normal);
        result.partial_extraction = true;
        result.error = Some(error.into());
        result
    }
}

/// Final report produced by the reporting stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportResult {
    pub report: String,
    pub sections: Vec<String>,
    pub recommendations_count: usize,
    pub confidence_score: f64,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl ReportResult {
    pub fn new(
        report: impl Into<String>,
        sections: Vec<String>,
        recommendations_count: usize,
        confidence_score: f64,
    ) -> Self {
        Self {
            report: report.into(),
            sections,
            recommendations_count,
            confidence_score: clamp_confidence(confidence_score),
            metadata: Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(clamp_confidence(-0.5), 0.0);
        assert_eq!(clamp_confidence(0.7), 0.7);
        assert_eq!(clamp_confidence(1.8), 1.0);
        assert_eq!(clamp_confidence(f64::NAN), 0.0);

        let result = TriageResult::new(TriageCategory::Security, Priority::High, "s", 3.0);
        assert_eq!(result.confidence_score, 1.0);
    }

    #[test]
    fn test_degraded_results_are_marked() {
        let triage = TriageResult::degraded("assumed");
        assert_eq!(triage.metadata.get("degraded"), Some(&Value::Bool(true)));
        assert!(triage.confidence_score < 0.5);

        let data = DataResult::degraded();
        assert!(data.sources.is_empty());
        assert_eq!(data.metadata.get("degraded"), Some(&Value::Bool(true)));

        let opts = OptimizationsResult::degraded("general");
        assert!(opts.recommendations.is_empty());
        assert_eq!(opts.metadata.get("degraded"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_action_plan_fallback_and_partial() {
        let fallback = ActionPlanResult::fallback("model unavailable");
        assert!(!fallback.partial_extraction);
        assert_eq!(fallback.error.as_deref(), Some("model unavailable"));
        assert!(!fallback.actions.is_empty());

        let partial = ActionPlanResult::partial(
            "salvaged",
            vec![ActionItem::new("a", "b")],
            "response was not valid JSON",
        );
        assert!(partial.partial_extraction);
        assert!(partial.error.is_some());
    }

    #[test]
    fn test_priority_ordering_and_default() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn test_category_wire_names() {
        let json = serde_json::to_string(&TriageCategory::CostOptimization).unwrap();
        assert_eq!(json, "\"cost_optimization\"");

        let parsed: TriageCategory = serde_json::from_str("\"performance\"").unwrap();
        assert_eq!(parsed, TriageCategory::Performance);
    }
}
