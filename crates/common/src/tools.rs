//! External tool dispatch seam.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Executes named tools on behalf of agents.
///
/// Agents never talk to tool backends directly; every dispatch goes
/// through the agent context so it is wrapped in the
/// executing/completed event pair.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// Runs `tool` with `params` and returns its JSON output.
    async fn dispatch(&self, tool: &str, params: Value) -> Result<Value>;
}
