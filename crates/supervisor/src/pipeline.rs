//! The fixed-order run supervisor.
//!
//! A run walks the five stages in pipeline order. Before each stage
//! the supervisor asks the agent to validate its preconditions; a
//! false answer halts the run with a structured reason naming the
//! agent and what it was missing. Execution errors inside a stage
//! propagate to the caller after the agent has published its error
//! event. There are no retries at this layer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pentarch_agents::context::DEFAULT_TOOL_TIMEOUT;
use pentarch_agents::{
    ActionsAgent, Agent, AgentContext, DataAgent, OptimizationAgent, ReportingAgent, TriageAgent,
};
use pentarch_common::{
    EventEmitter, EventSink, Result, RunRequest, SharedState, ToolDispatcher,
    DEFAULT_DELIVERY_TIMEOUT,
};
use pentarch_llm::LlmClient;
use tracing::{error, info, warn};

use crate::checkpoint::{CheckpointKind, CheckpointManager};
use crate::report::{AgentStatus, PipelineOutcome, StageFailure, StageReport};

/// Builds a [`Supervisor`] with its collaborators.
///
/// Every collaborator is optional. Without a model the pipeline runs
/// degraded; without a sink events are dropped; without a checkpoint
/// manager snapshots are skipped.
pub struct SupervisorBuilder {
    agents: Vec<Arc<dyn Agent>>,
    llm: Option<Arc<dyn LlmClient>>,
    tools: Option<Arc<dyn ToolDispatcher>>,
    sink: Option<Arc<dyn EventSink>>,
    checkpoints: CheckpointManager,
    event_timeout: Duration,
    tool_timeout: Duration,
}

impl SupervisorBuilder {
    fn new() -> Self {
        let agents: Vec<Arc<dyn Agent>> = vec![
            Arc::new(TriageAgent::new()),
            Arc::new(DataAgent::new()),
            Arc::new(OptimizationAgent::new()),
            Arc::new(ActionsAgent::new()),
            Arc::new(ReportingAgent::new()),
        ];
        Self {
            agents,
            llm: None,
            tools: None,
            sink: None,
            checkpoints: CheckpointManager::disabled(),
            event_timeout: DEFAULT_DELIVERY_TIMEOUT,
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

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_checkpoints(mut self, checkpoints: CheckpointManager) -> Self {
        self.checkpoints = checkpoints;
        self
    }

    pub fn with_event_timeout(mut self, timeout: Duration) -> Self {
        self.event_timeout = timeout;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Replaces the agent for the stage the given agent claims. The
    /// pipeline order itself never changes.
    pub fn override_stage(mut self, agent: Arc<dyn Agent>) -> Self {
        if let Some(slot) = self.agents.iter_mut().find(|a| a.stage() == agent.stage()) {
            *slot = agent;
        }
        self
    }

    pub fn build(self) -> Supervisor {
        Supervisor {
            agents: self.agents,
            llm: self.llm,
            tools: self.tools,
            sink: self.sink,
            checkpoints: self.checkpoints,
            event_timeout: self.event_timeout,
            tool_timeout: self.tool_timeout,
        }
    }
}

impl Default for SupervisorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs requests through the five-stage pipeline.
///
/// The supervisor is stateless across runs and can be shared behind an
/// `Arc`; each call to [`run`](Supervisor::run) owns its state.
pub struct Supervisor {
    agents: Vec<Arc<dyn Agent>>,
    llm: Option<Arc<dyn LlmClient>>,
    tools: Option<Arc<dyn ToolDispatcher>>,
    sink: Option<Arc<dyn EventSink>>,
    checkpoints: CheckpointManager,
    event_timeout: Duration,
    tool_timeout: Duration,
}

impl Supervisor {
    pub fn builder() -> SupervisorBuilder {
        SupervisorBuilder::new()
    }

    fn context_for(&self, state: &SharedState) -> (EventEmitter, AgentContext) {
        let emitter = match &self.sink {
            Some(sink) => EventEmitter::new(state.run_id(), state.thread_id(), sink.clone()),
            None => EventEmitter::detached(state.run_id(), state.thread_id()),
        }
        .with_delivery_timeout(self.event_timeout);

        let mut ctx = AgentContext::new(emitter.clone()).with_tool_timeout(self.tool_timeout);
        if let Some(llm) = &self.llm {
            ctx = ctx.with_llm(llm.clone());
        }
        if let Some(tools) = &self.tools {
            ctx = ctx.with_tools(tools.clone());
        }
        (emitter, ctx)
    }

    /// Executes one run end to end.
    ///
    /// Returns `Ok` for completed and halted runs alike; a halt is a
    /// normal outcome, not an error. `Err` means a stage started
    /// executing and failed.
    pub async fn run(&self, request: RunRequest) -> Result<PipelineOutcome> {
        let start = Instant::now();
        let mut state = SharedState::new(request)?;
        let (emitter, ctx) = self.context_for(&state);

        info!(
            run_id = %state.run_id(),
            user_id = %state.user_id(),
            stages = self.agents.len(),
            "Starting pipeline run"
        );

        let mut stages: Vec<StageReport> = self
            .agents
            .iter()
            .map(|agent| StageReport::pending(agent.stage(), agent.name()))
            .collect();

        for (i, agent) in self.agents.iter().enumerate() {
            let stage_start = Instant::now();
            info!(run_id = %state.run_id(), stage = %agent.stage(), "Entering stage");

            if !agent.validate_preconditions(&mut state) {
                let reason = format!("{} requires {}", agent.name(), agent.required_inputs());
                warn!(
                    run_id = %state.run_id(),
                    stage = %agent.stage(),
                    reason = %reason,
                    "Stage preconditions not met, halting run"
                );
                emitter.notify_error(agent.name(), &reason).await;

                stages[i].status = AgentStatus::Failed;
                stages[i].duration_ms = stage_start.elapsed().as_millis() as u64;
                stages[i].error = Some(reason.clone());
                self.checkpoints.save(&state, CheckpointKind::Failure).await;

                let halted = StageFailure {
                    stage: agent.stage(),
                    agent: agent.name().to_string(),
                    reason,
                };
                return Ok(PipelineOutcome {
                    state,
                    stages,
                    success: false,
                    halted: Some(halted),
                    duration_ms: start.elapsed().as_millis() as u64,
                });
            }

            stages[i].status = AgentStatus::Running;
            match agent.execute_core_logic(&mut state, &ctx).await {
                Ok(()) => {
                    stages[i].status = AgentStatus::Completed;
                    stages[i].duration_ms = stage_start.elapsed().as_millis() as u64;
                    if i + 1 < self.agents.len() {
                        self.checkpoints
                            .save(&state, CheckpointKind::PhaseTransition)
                            .await;
                    }
                }
                Err(e) => {
                    error!(
                        run_id = %state.run_id(),
                        stage = %agent.stage(),
                        error = %e,
                        "Stage failed"
                    );
                    stages[i].status = AgentStatus::Failed;
                    stages[i].duration_ms = stage_start.elapsed().as_millis() as u64;
                    stages[i].error = Some(e.to_string());
                    self.checkpoints.save(&state, CheckpointKind::Failure).await;
                    // The agent already published its error event.
                    return Err(e);
                }
            }
        }

        self.checkpoints.save(&state, CheckpointKind::Final).await;
        info!(
            run_id = %state.run_id(),
            steps = state.step_count(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Pipeline run completed"
        );

        Ok(PipelineOutcome {
            state,
            stages,
            success: true,
            halted: None,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}
