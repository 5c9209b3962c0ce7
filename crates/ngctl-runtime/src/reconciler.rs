//! Top-level create/delete sequencing for one node group.

use std::path::PathBuf;
use std::sync::Arc;

use ngctl_core::ReconcileError;
use ngctl_core::config::Timing;
use ngctl_core::request::NodeGroupRequest;
use ngctl_core::stack::StackStatus;
use ngctl_core::state::ClusterState;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::cancel::{self, CancelHandle, CancelSignal};
use crate::membership::MembershipVerifier;
use crate::poller::PollOutcome;
use crate::shell::CommandRunner;
use crate::stack::{StackClient, StackProvisioner};
use crate::store::StateStore;
use crate::tracker::StateTracker;

/// How a reconciliation pass ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Completed,
    Cancelled,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub outcome: Outcome,
    pub state: ClusterState,
    /// Snapshots that could not be written, the final one included.
    pub persist_failures: u32,
    /// Set when the final snapshot could not be written. The stored state
    /// then lags behind `state`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_persist_error: Option<String>,
}

/// Which status field a failure belongs in.
#[derive(Debug, Clone, Copy)]
enum Stage {
    Stack,
    Membership,
}

/// Drives a node group through create (provision, then verify membership)
/// or delete, persisting every transition.
pub struct Reconciler<C: StackClient, R: CommandRunner> {
    provisioner: StackProvisioner<C>,
    verifier: MembershipVerifier<R>,
    store: Arc<dyn StateStore>,
    timing: Timing,
    kubeconfig: PathBuf,
    cancel: CancelHandle,
    signal: CancelSignal,
}

impl<C: StackClient, R: CommandRunner> Reconciler<C, R> {
    pub fn new(
        provisioner: StackProvisioner<C>,
        verifier: MembershipVerifier<R>,
        store: Arc<dyn StateStore>,
        timing: Timing,
        kubeconfig: PathBuf,
    ) -> Self {
        let (cancel, signal) = cancel::channel();
        Self {
            provisioner,
            verifier,
            store,
            timing,
            kubeconfig,
            cancel,
            signal,
        }
    }

    /// Handle that stops the in-flight pass at its next sleep or iteration.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub async fn create(&self, req: &NodeGroupRequest) -> Result<ReconcileReport, ReconcileError> {
        let mut tracker = StateTracker::new(self.initial_state(req)?, Arc::clone(&self.store));
        info!(stack = %req.stack_name, cluster = %req.cluster_name, max_size = req.max_size, "creating node group");
        let result = self.run_create(req, &mut tracker).await;
        self.finish(tracker, result)
    }

    pub async fn delete(&self, req: &NodeGroupRequest) -> Result<ReconcileReport, ReconcileError> {
        let mut tracker = StateTracker::new(self.initial_state(req)?, Arc::clone(&self.store));
        info!(stack = %req.stack_name, "deleting node group");
        let result = match self
            .provisioner
            .delete(req.max_size, &mut tracker, &self.signal)
            .await
        {
            Ok(outcome) => Ok(outcome_of(outcome)),
            Err(e) => Err(record(&mut tracker, Stage::Stack, e)),
        };
        self.finish(tracker, result)
    }

    async fn run_create(
        &self,
        req: &NodeGroupRequest,
        tracker: &mut StateTracker,
    ) -> Result<Outcome, ReconcileError> {
        req.validate().map_err(|e| record(tracker, Stage::Stack, e))?;

        let role = match self.provisioner.create(req, tracker, &self.signal).await {
            Ok(PollOutcome::Done(role)) => role,
            Ok(PollOutcome::Cancelled) => return Ok(Outcome::Cancelled),
            Err(e) => return Err(record(tracker, Stage::Stack, e)),
        };

        let state = tracker.current();
        if StackStatus::classify(&state.stack_status) != StackStatus::Complete || state.role_arn.is_empty() {
            let err = ReconcileError::validation(format!(
                "stack {:?} is not ready for membership (status {:?})",
                req.stack_name, state.stack_status
            ));
            return Err(record(tracker, Stage::Membership, err));
        }

        let budget = self.timing.fleet_timeout(req.max_size);
        match self
            .verifier
            .verify(&role, req.max_size, &self.kubeconfig, budget, tracker, &self.signal)
            .await
        {
            Ok(outcome) => Ok(outcome_of(outcome)),
            Err(e) => Err(record(tracker, Stage::Membership, e)),
        }
    }

    /// Resume from the stored snapshot. A snapshot owned by another node
    /// group is never overwritten: it may be the only record of a live stack.
    fn initial_state(&self, req: &NodeGroupRequest) -> Result<ClusterState, ReconcileError> {
        let loaded = self
            .store
            .load()
            .map_err(|e| ReconcileError::persistence(e.to_string()))?;
        match loaded {
            Some(state) if state.node_group_name == req.stack_name => {
                info!(stack = %req.stack_name, created = state.created, "loaded previous state");
                Ok(state)
            }
            Some(state) => Err(ReconcileError::validation(format!(
                "state store holds node group {:?} (created: {}), not {:?}; give each node group its own state file",
                state.node_group_name, state.created, req.stack_name
            ))),
            None => Ok(ClusterState::new(&req.stack_name, &req.key_pair_name)),
        }
    }

    fn finish(
        &self,
        mut tracker: StateTracker,
        result: Result<Outcome, ReconcileError>,
    ) -> Result<ReconcileReport, ReconcileError> {
        match result {
            Ok(outcome) => {
                if let Err(persist) = tracker.commit() {
                    warn!(error = %persist, "failed to persist final state");
                }
                info!(stack = %tracker.current().node_group_name, %outcome, "reconcile finished");
                Ok(ReconcileReport {
                    outcome,
                    persist_failures: tracker.persist_failures(),
                    final_persist_error: tracker.last_persist_error().map(str::to_string),
                    state: tracker.into_state(),
                })
            }
            Err(err) => {
                if let Err(persist) = tracker.commit() {
                    warn!(error = %persist, "failed to persist final state");
                }
                error!(stack = %tracker.current().node_group_name, error = %err, "reconcile failed");
                Err(err)
            }
        }
    }
}

fn outcome_of<T>(outcome: PollOutcome<T>) -> Outcome {
    match outcome {
        PollOutcome::Done(_) => Outcome::Completed,
        PollOutcome::Cancelled => Outcome::Cancelled,
    }
}

/// Overwrite the stage's status field with the error text.
fn record(tracker: &mut StateTracker, stage: Stage, err: ReconcileError) -> ReconcileError {
    let text = err.to_string();
    match stage {
        Stage::Stack => tracker.update(|s| s.with_stack_status(text)),
        Stage::Membership => tracker.update(|s| s.with_membership_status(text)),
    }
    err
}
