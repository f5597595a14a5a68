//! Best-effort run checkpointing.
//!
//! The supervisor snapshots the run state at phase transitions, on
//! failures and at the end of a run. Saving is fire-and-forget: a
//! broken or slow store is logged and the run continues. Nothing in
//! the pipeline ever waits on a checkpoint beyond the save timeout.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pentarch_common::{now_millis, Result, SharedState};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Default ceiling on how long one checkpoint save may take.
pub const DEFAULT_SAVE_TIMEOUT: Duration = Duration::from_secs(2);

/// Why a checkpoint was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointKind {
    /// A stage completed and the next one is about to run.
    PhaseTransition,
    /// The run halted or a stage failed.
    Failure,
    /// The run finished.
    Final,
}

/// One saved snapshot of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointSnapshot {
    pub checkpoint_id: String,
    pub run_id: String,
    pub kind: CheckpointKind,
    /// Timestamp (Unix millis)
    pub created_at: u64,
    pub state: SharedState,
}

impl CheckpointSnapshot {
    fn capture(state: &SharedState, kind: CheckpointKind) -> Self {
        Self {
            checkpoint_id: format!("ckpt_{}", uuid::Uuid::new_v4()),
            run_id: state.run_id().to_string(),
            kind,
            created_at: now_millis(),
            state: state.clone(),
        }
    }
}

/// Storage seam for checkpoints.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn persist(&self, snapshot: CheckpointSnapshot) -> Result<()>;

    /// Most recent snapshot for a run, if any.
    async fn latest(&self, run_id: &str) -> Result<Option<CheckpointSnapshot>>;
}

/// Keeps snapshots in memory, newest last per run.
pub struct InMemoryCheckpointStore {
    snapshots: RwLock<HashMap<String, Vec<CheckpointSnapshot>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self {
            snapshots: RwLock::new(HashMap::new()),
        }
    }

    /// Number of snapshots recorded for a run.
    pub async fn count(&self, run_id: &str) -> usize {
        self.snapshots
            .read()
            .await
            .get(run_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl Default for InMemoryCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn persist(&self, snapshot: CheckpointSnapshot) -> Result<()> {
        let mut snapshots = self.snapshots.write().await;
        snapshots
            .entry(snapshot.run_id.clone())
            .or_default()
            .push(snapshot);
        Ok(())
    }

    async fn latest(&self, run_id: &str) -> Result<Option<CheckpointSnapshot>> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots.get(run_id).and_then(|runs| runs.last().cloned()))
    }
}

/// Saves snapshots without ever failing the run.
///
/// `save` reports whether the snapshot landed; callers use the bool
/// for logging at most. Without a store every save is a no-op.
#[derive(Clone)]
pub struct CheckpointManager {
    store: Option<Arc<dyn CheckpointStore>>,
    save_timeout: Duration,
}

impl CheckpointManager {
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            store: Some(store),
            save_timeout: DEFAULT_SAVE_TIMEOUT,
        }
    }

    /// Manager that drops every snapshot.
    pub fn disabled() -> Self {
        Self {
            store: None,
            save_timeout: DEFAULT_SAVE_TIMEOUT,
        }
    }

    pub fn with_save_timeout(mut self, timeout: Duration) -> Self {
        self.save_timeout = timeout;
        self
    }

    pub async fn save(&self, state: &SharedState, kind: CheckpointKind) -> bool {
        let Some(store) = &self.store else {
            return false;
        };

        let snapshot = CheckpointSnapshot::capture(state, kind);
        let checkpoint_id = snapshot.checkpoint_id.clone();

        match tokio::time::timeout(self.save_timeout, store.persist(snapshot)).await {
            Ok(Ok(())) => {
                debug!(
                    run_id = %state.run_id(),
                    checkpoint_id = %checkpoint_id,
                    kind = ?kind,
                    "Checkpoint saved"
                );
                true
            }
            Ok(Err(e)) => {
                warn!(run_id = %state.run_id(), error = %e, "Checkpoint save failed");
                false
            }
            Err(_) => {
                warn!(
                    run_id = %state.run_id(),
                    timeout_ms = self.save_timeout.as_millis() as u64,
                    "Checkpoint save timed out"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pentarch_common::{PentarchError, RunRequest};

    struct FailingStore;

    #[async_trait]
    impl CheckpointStore for FailingStore {
        async fn persist(&self, _snapshot: CheckpointSnapshot) -> Result<()> {
            Err(PentarchError::Config("disk full".to_string()))
        }
        async fn latest(&self, _run_id: &str) -> Result<Option<CheckpointSnapshot>> {
            Ok(None)
        }
    }

    struct StuckStore;

    #[async_trait]
    impl CheckpointStore for StuckStore {
        async fn persist(&self, _snapshot: CheckpointSnapshot) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
        async fn latest(&self, _run_id: &str) -> Result<Option<CheckpointSnapshot>> {
            Ok(None)
        }
    }

    fn test_state() -> SharedState {
        SharedState::new(RunRequest::new("request", "user-1", "thread-1")).unwrap()
    }

    #[tokio::test]
    async fn test_save_and_read_back_latest() {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let manager = CheckpointManager::new(store.clone());
        let state = test_state();

        assert!(manager.save(&state, CheckpointKind::PhaseTransition).await);
        assert!(manager.save(&state, CheckpointKind::Final).await);
        assert_eq!(store.count(state.run_id()).await, 2);

        let latest = store.latest(state.run_id()).await.unwrap().unwrap();
        assert_eq!(latest.kind, CheckpointKind::Final);
        assert_eq!(latest.run_id, state.run_id());
        assert_eq!(latest.state.user_id(), "user-1");
    }

    #[tokio::test]
    async fn test_failing_store_returns_false() {
        let manager = CheckpointManager::new(Arc::new(FailingStore));
        assert!(!manager.save(&test_state(), CheckpointKind::Failure).await);
    }

    #[tokio::test]
    async fn test_stuck_store_hits_the_save_timeout() {
        let manager = CheckpointManager::new(Arc::new(StuckStore))
            .with_save_timeout(Duration::from_millis(20));

        let start = std::time::Instant::now();
        assert!(!manager.save(&test_state(), CheckpointKind::Final).await);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_disabled_manager_is_a_no_op() {
        let manager = CheckpointManager::disabled();
        assert!(!manager.save(&test_state(), CheckpointKind::Final).await);
    }

    #[tokio::test]
    async fn test_snapshot_serializes_with_full_state() {
        let state = test_state();
        let snapshot = CheckpointSnapshot::capture(&state, CheckpointKind::PhaseTransition);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["kind"], "phase_transition");
        assert_eq!(json["run_id"], state.run_id());
        assert_eq!(json["state"]["user_id"], "user-1");
        assert!(json["checkpoint_id"].as_str().unwrap().starts_with("ckpt_"));
    }
}
