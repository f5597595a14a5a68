//! Run outcome types returned by the supervisor.

use pentarch_common::{SharedState, Stage};
use serde::Serialize;

/// Status of one stage within a run.
///
/// A stage moves `Pending → Running → {Completed | Failed}`. `Running`
/// never transitions back, and a `Failed` stage never becomes
/// `Completed`. Failed covers both a precondition gate returning false
/// (the agent never executed; the outcome's `halted` field carries the
/// detail) and an execution error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// The run ended before this stage was reached.
    Pending,
    /// The stage holds control right now.
    Running,
    Completed,
    Failed,
}

/// Per-stage record in a [`PipelineOutcome`].
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    /// Name of the agent that owns this stage.
    pub agent: String,
    pub status: AgentStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageReport {
    pub(crate) fn pending(stage: Stage, agent: &str) -> Self {
        Self {
            stage,
            agent: agent.to_string(),
            status: AgentStatus::Pending,
            duration_ms: 0,
            error: None,
        }
    }
}

/// Why a run halted before its pipeline finished.
#[derive(Debug, Clone, Serialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub agent: String,
    /// Names the agent and the inputs it was missing.
    pub reason: String,
}

/// Result of a full pipeline run.
///
/// A halted run is still an `Ok` outcome with `success: false` and
/// `halted` describing the gate that stopped it. Execution errors
/// inside a stage propagate as `Err` from [`Supervisor::run`] instead.
///
/// [`Supervisor::run`]: crate::Supervisor::run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    /// Final state of the run, including every result slot that was
    /// written.
    pub state: SharedState,
    /// One report per pipeline stage, in pipeline order.
    pub stages: Vec<StageReport>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halted: Option<StageFailure>,
    pub duration_ms: u64,
}

impl PipelineOutcome {
    pub fn run_id(&self) -> &str {
        self.state.run_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&AgentStatus::Pending).unwrap(),
            "\"pending\""
        );
        assert_eq!(
            serde_json::to_string(&AgentStatus::Running).unwrap(),
            "\"running\""
        );
        assert_eq!(
            serde_json::to_string(&AgentStatus::Failed).unwrap(),
            "\"failed\""
        );
    }

    #[test]
    fn test_stage_report_skips_absent_error() {
        let report = StageReport::pending(Stage::Triage, "triage_agent");
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["stage"], "triage");
        assert_eq!(json["status"], "pending");
        assert!(json.get("error").is_none());
    }
}
