//! The five pipeline stage agents.
//!
//! Each stage is an [`Agent`] that reads the shared run state, does
//! its piece of the work and writes exactly one result slot:
//!
//! - **Triage Agent**: Classifies the request into a category and priority
//! - **Data Agent**: Gathers usage and cost data through the tool dispatcher
//! - **Optimization Agent**: Turns classification and data into recommendations
//! - **Actions Agent**: Drafts a concrete, executable action plan
//! - **Reporting Agent**: Assembles the final report for the user
//!
//! # Architecture
//!
//! Stages run strictly in order, each gated by its own preconditions:
//!
//! ```text
//! ┌────────┐   ┌──────┐   ┌──────────────┐   ┌─────────┐   ┌───────────┐
//! │ Triage │──▶│ Data │──▶│ Optimization │──▶│ Actions │──▶│ Reporting │
//! └────┬───┘   └───┬──┘   └──────┬───────┘   └────┬────┘   └─────┬─────┘
//!      │           │            │                 │              │
//!      ▼           ▼            ▼                 ▼              ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │              SharedState (write-once result slots)               │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every agent follows the same event discipline: one `agent_started`,
//! at least two `agent_thinking`, a `tool_completed` for every
//! `tool_executing`, and exactly one of `agent_completed` or `error`.

pub mod actions;
pub mod context;
pub mod data;
pub mod extract;
pub mod optimization;
pub mod reporting;
pub mod traits;
pub mod triage;

pub use actions::ActionsAgent;
pub use context::AgentContext;
pub use data::DataAgent;
pub use optimization::OptimizationAgent;
pub use reporting::ReportingAgent;
pub use traits::Agent;
pub use triage::TriageAgent;
