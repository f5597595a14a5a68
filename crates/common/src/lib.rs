//! Common types shared across Pentarch crates.
//!
//! This crate provides the foundational pieces every other crate
//! builds on: the per-run shared state, stage result payloads,
//! lifecycle events with their emitter, and the common error type.

pub mod error;
pub mod event;
pub mod message;
pub mod results;
pub mod state;
pub mod tools;

pub use error::{PentarchError, Result};
pub use event::{
    BroadcastSink, EventEmitter, EventSink, EventType, PipelineEvent, ToolStatus,
    DEFAULT_DELIVERY_TIMEOUT,
};
pub use message::{now_millis, Message, MessageRole};
pub use results::{
    clamp_confidence, ActionItem, ActionPlanResult, DataResult, OptimizationsResult, Priority,
    Recommendation, ReportResult, TriageCategory, TriageResult,
};
pub use state::{RunRequest, SharedState, Stage, StateError, MAX_STEP_COUNT};
pub use tools::ToolDispatcher;
