//! Run supervision for the Pentarch pipeline.
//!
//! The supervisor is the layer that:
//! 1. Accepts a run request and creates its isolated state
//! 2. Walks the five stages in fixed order, gating each on its preconditions
//! 3. Halts with a structured reason when a gate fails, propagates stage errors
//! 4. Snapshots state at phase transitions through the checkpoint manager
//!
//! # Architecture
//!
//! ```text
//! RunRequest
//!     │
//!     ▼
//! ┌──────────────────┐     events      ┌────────────┐
//! │    Supervisor    │────────────────▶│ EventSink  │
//! │   (this crate)   │                 └────────────┘
//! └────────┬─────────┘     snapshots   ┌────────────────┐
//!          │          ────────────────▶│ CheckpointStore│
//!          ▼                           └────────────────┘
//!  Triage ▶ Data ▶ Optimization ▶ Actions ▶ Reporting
//! ```

pub mod checkpoint;
pub mod config;
pub mod pipeline;
pub mod report;

pub use checkpoint::{
    CheckpointKind, CheckpointManager, CheckpointSnapshot, CheckpointStore,
    InMemoryCheckpointStore, DEFAULT_SAVE_TIMEOUT,
};
pub use config::{CheckpointConfig, EventsConfig, PipelineConfig};
pub use pipeline::{Supervisor, SupervisorBuilder};
pub use report::{AgentStatus, PipelineOutcome, StageFailure, StageReport};
