//! The contract every pipeline stage agent implements.

use async_trait::async_trait;
use pentarch_common::{Result, SharedState, Stage};

use crate::context::AgentContext;

/// A pipeline stage.
///
/// Agents hold no per-run state; everything about a run lives in its
/// [`SharedState`], so one agent instance can serve concurrent runs.
/// The supervisor calls `validate_preconditions` first and only hands
/// over control when it returns true.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Stage this agent implements.
    fn stage(&self) -> Stage;

    /// Agent name as it appears in events and reports.
    fn name(&self) -> &'static str {
        self.stage().agent_name()
    }

    /// Checks whether the state carries everything this agent needs.
    ///
    /// Returns false instead of erroring; the supervisor halts the run
    /// and reports what was missing. The only permitted mutation is
    /// filling a missing upstream result with a documented default,
    /// which can never overwrite a real result because the slots are
    /// write-once.
    fn validate_preconditions(&self, state: &mut SharedState) -> bool;

    /// Human-readable description of the inputs checked by
    /// `validate_preconditions`, used in halt reports.
    fn required_inputs(&self) -> &'static str;

    /// Runs the stage against the state.
    ///
    /// Implementations emit `agent_started` first, at least two
    /// `agent_thinking` updates while working, the
    /// executing/completed pair around every tool call, and finish
    /// with exactly one of `agent_completed` (success, including
    /// documented degraded fallbacks) or `error` followed by an `Err`
    /// return. Each stage writes only its own result slot.
    async fn execute_core_logic(&self, state: &mut SharedState, ctx: &AgentContext) -> Result<()>;
}
