//! Per-run mutable state shared across the pipeline stages.
//!
//! Exactly one [`SharedState`] exists per run. The supervisor owns it
//! for the lifetime of the run and lends it to one agent at a time, so
//! mutation is strictly sequential and no locking is needed. States
//! from different runs never share storage: every container is freshly
//! allocated in the constructor, which is what keeps concurrent runs
//! for different users isolated from each other.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::message::Message;
use crate::results::{
    ActionPlanResult, DataResult, OptimizationsResult, ReportResult, TriageResult,
};

/// Upper bound on `step_count`. Hitting it means a runaway loop, which
/// surfaces as an error instead of saturating silently.
pub const MAX_STEP_COUNT: u32 = 10_000;

/// The five pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Triage,
    Data,
    Optimization,
    Actions,
    Reporting,
}

impl Stage {
    /// Fixed execution order of the pipeline.
    pub const ORDER: [Stage; 5] = [
        Stage::Triage,
        Stage::Data,
        Stage::Optimization,
        Stage::Actions,
        Stage::Reporting,
    ];

    /// Conventional agent name for the stage, as it appears in events
    /// and failure reports.
    pub fn agent_name(&self) -> &'static str {
        match self {
            Stage::Triage => "triage_agent",
            Stage::Data => "data_agent",
            Stage::Optimization => "optimization_agent",
            Stage::Actions => "actions_agent",
            Stage::Reporting => "reporting_agent",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Triage => "triage",
            Stage::Data => "data",
            Stage::Optimization => "optimization",
            Stage::Actions => "actions",
            Stage::Reporting => "reporting",
        };
        write!(f, "{}", name)
    }
}

/// Errors raised by state construction and mutation guards.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("required field is empty: {0}")]
    MissingField(&'static str),

    #[error("{0} result is already set")]
    ResultAlreadySet(Stage),

    #[error("step count limit of {} exceeded", MAX_STEP_COUNT)]
    StepLimitExceeded,
}

/// Inputs that start a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub user_request: String,
    pub user_id: String,
    pub thread_id: String,
    pub run_id: String,
}

impl RunRequest {
    pub fn new(
        user_request: impl Into<String>,
        user_id: impl Into<String>,
        thread_id: impl Into<String>,
    ) -> Self {
        Self {
            user_request: user_request.into(),
            user_id: user_id.into(),
            thread_id: thread_id.into(),
            run_id: format!("run_{}", uuid::Uuid::new_v4()),
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }
}

/// Mutable working record for a single pipeline run.
///
/// Identity fields are fixed at construction. Result slots are
/// write-once: the setter for a slot that already holds a value
/// returns [`StateError::ResultAlreadySet`], so downstream defaults
/// can fill an empty slot but never overwrite a real result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedState {
    user_id: String,
    thread_id: String,
    run_id: String,
    user_request: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    triage_result: Option<TriageResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data_result: Option<DataResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    optimizations_result: Option<OptimizationsResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    action_plan_result: Option<ActionPlanResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    report_result: Option<ReportResult>,

    step_count: u32,
    messages: Vec<Message>,
    metadata: Map<String, Value>,
    quality_metrics: HashMap<String, f64>,
}

impl SharedState {
    /// Creates a fresh state for one run.
    ///
    /// Identity fields must be non-empty. An empty `user_request` is
    /// accepted here; rejecting it is the triage agent's precondition,
    /// not a construction error.
    pub fn new(request: RunRequest) -> Result<Self, StateError> {
        if request.user_id.trim().is_empty() {
            return Err(StateError::MissingField("user_id"));
        }
        if request.thread_id.trim().is_empty() {
            return Err(StateError::MissingField("thread_id"));
        }
        if request.run_id.trim().is_empty() {
            return Err(StateError::MissingField("run_id"));
        }

        Ok(Self {
            user_id: request.user_id,
            thread_id: request.thread_id,
            run_id: request.run_id,
            user_request: request.user_request,
            triage_result: None,
            data_result: None,
            optimizations_result: None,
            action_plan_result: None,
            report_result: None,
            step_count: 0,
            messages: Vec::new(),
            metadata: Map::new(),
            quality_metrics: HashMap::new(),
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn user_request(&self) -> &str {
        &self.user_request
    }

    pub fn triage_result(&self) -> Option<&TriageResult> {
        self.triage_result.as_ref()
    }

    pub fn data_result(&self) -> Option<&DataResult> {
        self.data_result.as_ref()
    }

    pub fn optimizations_result(&self) -> Option<&OptimizationsResult> {
        self.optimizations_result.as_ref()
    }

    pub fn action_plan_result(&self) -> Option<&ActionPlanResult> {
        self.action_plan_result.as_ref()
    }

    pub fn report_result(&self) -> Option<&ReportResult> {
        self.report_result.as_ref()
    }

    pub fn set_triage_result(&mut self, result: TriageResult) -> Result<(), StateError> {
        if self.triage_result.is_some() {
            return Err(StateError::ResultAlreadySet(Stage::Triage));
        }
        self.triage_result = Some(result);
        Ok(())
    }

    pub fn set_data_result(&mut self, result: DataResult) -> Result<(), StateError> {
        if self.data_result.is_some() {
            return Err(StateError::ResultAlreadySet(Stage::Data));
        }
        self.data_result = Some(result);
        Ok(())
    }

    pub fn set_optimizations_result(
        &mut self,
        result: OptimizationsResult,
    ) -> Result<(), StateError> {
        if self.optimizations_result.is_some() {
            return Err(StateError::ResultAlreadySet(Stage::Optimization));
        }
        self.optimizations_result = Some(result);
        Ok(())
    }

    pub fn set_action_plan_result(&mut self, result: ActionPlanResult) -> Result<(), StateError> {
        if self.action_plan_result.is_some() {
            return Err(StateError::ResultAlreadySet(Stage::Actions));
        }
        self.action_plan_result = Some(result);
        Ok(())
    }

    pub fn set_report_result(&mut self, result: ReportResult) -> Result<(), StateError> {
        if self.report_result.is_some() {
            return Err(StateError::ResultAlreadySet(Stage::Reporting));
        }
        self.report_result = Some(result);
        Ok(())
    }

    pub fn step_count(&self) -> u32 {
        self.step_count
    }

    /// Increments the step counter. The counter only moves forward and
    /// is bounded by [`MAX_STEP_COUNT`].
    pub fn advance_step(&mut self) -> Result<u32, StateError> {
        if self.step_count >= MAX_STEP_COUNT {
            return Err(StateError::StepLimitExceeded);
        }
        self.step_count += 1;
        Ok(self.step_count)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.metadata
    }

    /// Mutable access to the nested `execution_context` object inside
    /// metadata, created on first use.
    pub fn execution_context_mut(&mut self) -> &mut Map<String, Value> {
        let entry = self
            .metadata
            .entry("execution_context".to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        entry
            .as_object_mut()
            .expect("execution_context was just forced to an object")
    }

    pub fn quality_metrics(&self) -> &HashMap<String, f64> {
        &self.quality_metrics
    }

    /// Records a quality metric for this run, such as a stage's
    /// confidence score.
    pub fn record_quality(&mut self, metric: impl Into<String>, value: f64) {
        self.quality_metrics.insert(metric.into(), value);
    }
}
