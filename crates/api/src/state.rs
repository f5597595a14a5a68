//! Application state for the API server.

use pentarch_common::PipelineEvent;
use pentarch_supervisor::Supervisor;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Shared application state for the API server.
pub struct AppState {
    /// The supervisor that executes pipeline runs.
    pub supervisor: Arc<Supervisor>,

    /// Fan-out channel carrying every pipeline event. The supervisor's
    /// event sink publishes here and each WebSocket client subscribes.
    pub events: broadcast::Sender<PipelineEvent>,

    /// Server start time (for health checks)
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Create new application state around a supervisor and the event
    /// channel its sink publishes to.
    pub fn new(supervisor: Arc<Supervisor>, events: broadcast::Sender<PipelineEvent>) -> Self {
        Self {
            supervisor,
            events,
            start_time: std::time::Instant::now(),
        }
    }

    /// Get the uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
