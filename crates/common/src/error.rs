//! Error types for Pentarch.

use thiserror::Error;

use crate::state::{Stage, StateError};

#[derive(Error, Debug)]
pub enum PentarchError {
    #[error("{stage} preconditions not met: {reason}")]
    Precondition { stage: Stage, reason: String },

    #[error("{agent} requires a configured {dependency} but none was provided")]
    DependencyMissing {
        agent: &'static str,
        dependency: &'static str,
    },

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Tool '{tool}' failed: {reason}")]
    Tool { tool: String, reason: String },

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PentarchError>;
