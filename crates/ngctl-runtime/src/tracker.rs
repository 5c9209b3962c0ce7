use std::sync::Arc;

use ngctl_core::ReconcileError;
use ngctl_core::state::ClusterState;
use tracing::warn;

use crate::store::StateStore;

/// Holds the current snapshot and writes every transition through the
/// store.
///
/// Intermediate writes are best-effort: a failure is logged and counted but
/// never aborts the step that produced it. [`StateTracker::commit`] is the
/// strict variant used for terminal outcomes.
pub struct StateTracker {
    current: ClusterState,
    store: Arc<dyn StateStore>,
    persist_failures: u32,
    last_persist_error: Option<String>,
}

impl StateTracker {
    pub fn new(initial: ClusterState, store: Arc<dyn StateStore>) -> Self {
        Self {
            current: initial,
            store,
            persist_failures: 0,
            last_persist_error: None,
        }
    }

    pub fn current(&self) -> &ClusterState {
        &self.current
    }

    /// Replace the snapshot with `f(current)` and persist it best-effort.
    pub fn update(&mut self, f: impl FnOnce(&ClusterState) -> ClusterState) {
        self.current = f(&self.current);
        if let Err(e) = self.store.persist(&self.current) {
            self.persist_failures += 1;
            warn!(
                node_group = %self.current.node_group_name,
                failures = self.persist_failures,
                error = %e,
                "failed to persist state snapshot"
            );
            self.last_persist_error = Some(e.to_string());
        }
    }

    /// Persist the current snapshot, surfacing any failure.
    ///
    /// A failure is also counted, and stays readable through
    /// [`StateTracker::last_persist_error`] until a later commit succeeds.
    pub fn commit(&mut self) -> Result<(), ReconcileError> {
        if let Err(e) = self.store.persist(&self.current) {
            self.persist_failures += 1;
            self.last_persist_error = Some(e.to_string());
            return Err(ReconcileError::persistence(e.to_string()));
        }
        self.last_persist_error = None;
        Ok(())
    }

    pub fn persist_failures(&self) -> u32 {
        self.persist_failures
    }

    pub fn last_persist_error(&self) -> Option<&str> {
        self.last_persist_error.as_deref()
    }

    pub fn into_state(self) -> ClusterState {
        self.current
    }
}
