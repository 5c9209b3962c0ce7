use std::time::Duration;

use async_trait::async_trait;
use ngctl_core::ReconcileError;
use ngctl_core::config::Timing;
use ngctl_core::request::NodeGroupRequest;
use ngctl_core::stack::{DELETE_COMPLETE, StackStatus};
use ngctl_core::time::format_elapsed;
use tokio::time::Instant;
use tracing::{info, warn};

use super::client::{CreateStackInput, StackClient, StackError};
use crate::cancel::CancelSignal;
use crate::poller::{self, PollConfig, PollOutcome, Probe, ProbeOutcome};
use crate::templates;
use crate::tracker::StateTracker;

/// Status recorded between an accepted delete and the first describe.
pub const DELETE_REQUESTED: &str = "DELETE_REQUESTED";

/// Creates and deletes the node-group stack, recording every observation
/// through the tracker.
pub struct StackProvisioner<C: StackClient> {
    client: C,
    timing: Timing,
}

impl<C: StackClient> StackProvisioner<C> {
    pub fn new(client: C, timing: Timing) -> Self {
        Self { client, timing }
    }

    /// Submit the stack, wait for it to complete, and return the ARN of the
    /// role its instances assume.
    ///
    /// If the tracker shows an earlier create was already accepted, the
    /// submit and warm-up are skipped and only the wait is resumed.
    pub async fn create(
        &self,
        req: &NodeGroupRequest,
        tracker: &mut StateTracker,
        cancel: &CancelSignal,
    ) -> Result<PollOutcome<String>, ReconcileError> {
        req.validate()?;

        if tracker.current().created {
            info!(stack = %req.stack_name, "stack already submitted, resuming wait");
        } else if self.submit(req, tracker, cancel).await? {
            return Ok(PollOutcome::Cancelled);
        }

        let config = PollConfig::new(
            Duration::from_secs(self.timing.create_poll_secs),
            Duration::from_secs(self.timing.create_retry_secs),
            self.timing.fleet_timeout(req.max_size),
        );
        let start = Instant::now();
        let mut probe = CreateProbe {
            client: &self.client,
            name: &req.stack_name,
            tracker,
            role: None,
        };
        let outcome = poller::poll("stack creation", config, cancel, &mut probe).await?;
        if let PollOutcome::Done(role) = &outcome {
            info!(
                stack = %req.stack_name,
                role = %role,
                elapsed = %format_elapsed(start.elapsed()),
                "stack created"
            );
        }
        Ok(outcome)
    }

    /// Submit the create and sit out the warm-up. Returns `true` if
    /// cancelled during the warm-up.
    async fn submit(
        &self,
        req: &NodeGroupRequest,
        tracker: &mut StateTracker,
        cancel: &CancelSignal,
    ) -> Result<bool, ReconcileError> {
        let input = CreateStackInput {
            name: req.stack_name.clone(),
            tags: req.tags(),
            template_body: templates::render_stack_template(req)?,
            parameters: req.parameters(),
            capabilities: req.capabilities(),
        };
        if let Err(e) = self.client.create_stack(&input).await {
            let text = e.to_string();
            tracker.update(|s| s.with_both_statuses(text.clone()));
            return Err(ReconcileError::transient(text));
        }
        tracker.update(|s| s.with_created(true));
        info!(stack = %req.stack_name, "stack create accepted");

        let warmup = Duration::from_secs(self.timing.create_warmup_secs);
        info!(stack = %req.stack_name, wait = %format_elapsed(warmup), "waiting for initial provisioning");
        Ok(cancel.sleep(warmup).await)
    }

    /// Delete the stack recorded in the tracker and wait until it is gone.
    ///
    /// A no-op unless a previous create was accepted. `created` is cleared
    /// afterwards whatever the outcome.
    pub async fn delete(
        &self,
        fleet_size: u32,
        tracker: &mut StateTracker,
        cancel: &CancelSignal,
    ) -> Result<PollOutcome<()>, ReconcileError> {
        if !tracker.current().created {
            info!(stack = %tracker.current().node_group_name, "nothing to delete");
            return Ok(PollOutcome::Done(()));
        }
        let result = self.delete_inner(fleet_size, tracker, cancel).await;
        tracker.update(|s| s.with_created(false));
        result
    }

    async fn delete_inner(
        &self,
        fleet_size: u32,
        tracker: &mut StateTracker,
        cancel: &CancelSignal,
    ) -> Result<PollOutcome<()>, ReconcileError> {
        let name = tracker.current().node_group_name.clone();
        if name.is_empty() {
            return Err(ReconcileError::validation("cannot delete a stack without a name"));
        }

        match self.client.delete_stack(&name).await {
            Ok(()) => {}
            Err(StackError::NotFound(_)) => {
                tracker.update(|s| s.with_both_statuses(DELETE_COMPLETE));
                info!(stack = %name, "stack already gone");
                return Ok(PollOutcome::Done(()));
            }
            Err(e) => {
                let text = e.to_string();
                tracker.update(|s| s.with_both_statuses(text.clone()));
                return Err(ReconcileError::transient(text));
            }
        }
        tracker.update(|s| s.with_stack_status(DELETE_REQUESTED));

        let settle = Duration::from_secs(self.timing.delete_settle_secs);
        info!(stack = %name, wait = %format_elapsed(settle), "stack delete accepted");
        if cancel.sleep(settle).await {
            return Ok(PollOutcome::Cancelled);
        }

        let config = PollConfig::new(
            Duration::from_secs(self.timing.delete_poll_secs),
            Duration::from_secs(self.timing.delete_retry_secs),
            self.timing.fleet_timeout(fleet_size),
        );
        let start = Instant::now();
        let mut probe = DeleteProbe {
            client: &self.client,
            name: &name,
            tracker,
        };
        let outcome = poller::poll("stack deletion", config, cancel, &mut probe).await?;
        if outcome == PollOutcome::Done(()) {
            info!(stack = %name, elapsed = %format_elapsed(start.elapsed()), "stack deleted");
        }
        Ok(outcome)
    }
}

struct CreateProbe<'a, C> {
    client: &'a C,
    name: &'a str,
    tracker: &'a mut StateTracker,
    role: Option<String>,
}

#[async_trait]
impl<'a, C: StackClient> Probe for CreateProbe<'a, C> {
    type Output = String;

    async fn probe(&mut self) -> ProbeOutcome<String> {
        let state = match self.client.describe_stack(self.name).await {
            Ok(state) => state,
            Err(e) => {
                let text = e.to_string();
                self.tracker.update(|s| s.with_stack_status(text.clone()));
                return ProbeOutcome::Transient(text);
            }
        };

        self.tracker.update(|s| s.with_stack_status(state.raw_status.clone()));
        if let Some(role) = state.node_instance_role() {
            if self.role.as_deref() != Some(role) {
                self.tracker.update(|s| s.with_role_arn(role));
                self.role = Some(role.to_string());
            }
        }

        if state.status.is_terminal_failure() {
            warn!(stack = %self.name, status = %state.raw_status, "stack failed");
            return ProbeOutcome::Failed(ReconcileError::TerminalStack {
                name: self.name.to_string(),
                status: state.raw_status,
            });
        }
        if state.status != StackStatus::Complete {
            return ProbeOutcome::InProgress(state.raw_status);
        }
        match &self.role {
            Some(role) => ProbeOutcome::Done(role.clone()),
            None => ProbeOutcome::Failed(ReconcileError::RoleNotFound(self.name.to_string())),
        }
    }
}

struct DeleteProbe<'a, C> {
    client: &'a C,
    name: &'a str,
    tracker: &'a mut StateTracker,
}

#[async_trait]
impl<'a, C: StackClient> Probe for DeleteProbe<'a, C> {
    type Output = ();

    async fn probe(&mut self) -> ProbeOutcome<()> {
        match self.client.describe_stack(self.name).await {
            Ok(state) => {
                self.tracker
                    .update(|s| s.with_both_statuses(state.raw_status.clone()));
                ProbeOutcome::InProgress(state.raw_status)
            }
            Err(StackError::NotFound(_)) => {
                self.tracker.update(|s| s.with_both_statuses(DELETE_COMPLETE));
                ProbeOutcome::Done(())
            }
            Err(e) => {
                let text = e.to_string();
                self.tracker.update(|s| s.with_both_statuses(text.clone()));
                ProbeOutcome::Transient(text)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cancel;
    use crate::mock::{self, ROLE_ARN, ScriptedStackClient};
    use crate::store::MemoryStateStore;
    use ngctl_core::state::ClusterState;

    fn setup(client: ScriptedStackClient) -> (StackProvisioner<ScriptedStackClient>, MemoryStateStore, StateTracker) {
        let store = MemoryStateStore::new();
        let tracker = StateTracker::new(ClusterState::new("demo-ng", "demo-key"), Arc::new(store.clone()));
        (StackProvisioner::new(client, Timing::default()), store, tracker)
    }

    fn created_tracker(store: &MemoryStateStore) -> StateTracker {
        StateTracker::new(
            ClusterState::new("demo-ng", "demo-key").with_created(true),
            Arc::new(store.clone()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_captures_role_on_completion() {
        let client = ScriptedStackClient::new()
            .describe(mock::stack("CREATE_IN_PROGRESS"))
            .describe(mock::stack("CREATE_IN_PROGRESS"))
            .describe(mock::stack_with_role("CREATE_COMPLETE", ROLE_ARN));
        let (prov, store, mut tracker) = setup(client.clone());

        let outcome = prov
            .create(&mock::request(), &mut tracker, &CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Done(ROLE_ARN.to_string()));
        assert_eq!(client.describe_calls(), 3);

        let state = tracker.current();
        assert!(state.created);
        assert_eq!(state.role_arn, ROLE_ARN);
        assert_eq!(state.stack_status, "CREATE_COMPLETE");

        let statuses: Vec<_> = store.history().iter().map(|s| s.stack_status.clone()).collect();
        assert_eq!(
            statuses.iter().filter(|s| *s == "CREATE_IN_PROGRESS").count(),
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_submits_request_fields() {
        let client = ScriptedStackClient::new()
            .describe(mock::stack_with_role("CREATE_COMPLETE", ROLE_ARN));
        let (prov, _store, mut tracker) = setup(client.clone());
        prov.create(&mock::request(), &mut tracker, &CancelSignal::never())
            .await
            .unwrap();

        let inputs = client.created_inputs();
        assert_eq!(inputs.len(), 1);
        let input = &inputs[0];
        assert_eq!(input.name, "demo-ng");
        assert_eq!(input.capabilities, vec!["CAPABILITY_IAM".to_string()]);
        assert!(input.tags.iter().any(|t| t.key == "HOSTNAME" && t.value == "builder-1"));
        assert!(input.parameters.iter().any(|p| p.key == "Subnets" && p.value == "subnet-a,subnet-b"));
        assert!(input.template_body.contains("NodeInstanceRole"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_stops_on_failed_status() {
        let client = ScriptedStackClient::new()
            .describe(mock::stack("CREATE_IN_PROGRESS"))
            .describe(mock::stack("CREATE_FAILED"))
            .describe(mock::stack_with_role("CREATE_COMPLETE", ROLE_ARN));
        let (prov, _store, mut tracker) = setup(client.clone());

        let err = prov
            .create(&mock::request(), &mut tracker, &CancelSignal::never())
            .await
            .unwrap_err();
        match err {
            ReconcileError::TerminalStack { name, status } => {
                assert_eq!(name, "demo-ng");
                assert_eq!(status, "CREATE_FAILED");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(client.describe_calls(), 2);
        assert_eq!(tracker.current().stack_status, "CREATE_FAILED");
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_rollback_is_terminal() {
        let client = ScriptedStackClient::new().describe(mock::stack("ROLLBACK_COMPLETE"));
        let (prov, _store, mut tracker) = setup(client);
        let err = prov
            .create(&mock::request(), &mut tracker, &CancelSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::TerminalStack { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_without_role_output() {
        let client = ScriptedStackClient::new().describe(mock::stack("CREATE_COMPLETE"));
        let (prov, _store, mut tracker) = setup(client);
        let err = prov
            .create(&mock::request(), &mut tracker, &CancelSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::RoleNotFound(name) if name == "demo-ng"));
        assert!(tracker.current().role_arn.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_keeps_role_seen_before_completion() {
        let client = ScriptedStackClient::new()
            .describe(mock::stack_with_role("CREATE_IN_PROGRESS", ROLE_ARN))
            .describe(mock::stack("CREATE_COMPLETE"));
        let (prov, _store, mut tracker) = setup(client);
        let outcome = prov
            .create(&mock::request(), &mut tracker, &CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Done(ROLE_ARN.to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_retries_describe_errors() {
        let client = ScriptedStackClient::new()
            .describe(Err(StackError::Api("Throttling: Rate exceeded".into())))
            .describe(Err(StackError::NotFound("demo-ng".into())))
            .describe(mock::stack_with_role("CREATE_COMPLETE", ROLE_ARN));
        let (prov, store, mut tracker) = setup(client.clone());
        let outcome = prov
            .create(&mock::request(), &mut tracker, &CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Done(ROLE_ARN.to_string()));
        assert!(
            store
                .history()
                .iter()
                .any(|s| s.stack_status.contains("Rate exceeded"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_submit_error_recorded_in_both_statuses() {
        let client = ScriptedStackClient::new()
            .create_result(Err(StackError::Api("AlreadyExistsException".into())));
        let (prov, _store, mut tracker) = setup(client.clone());
        let err = prov
            .create(&mock::request(), &mut tracker, &CancelSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::TransientApi(_)));
        let state = tracker.current();
        assert!(!state.created);
        assert_eq!(state.stack_status, "AlreadyExistsException");
        assert_eq!(state.membership_status, "AlreadyExistsException");
        assert_eq!(client.describe_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_validates_before_submitting() {
        let client = ScriptedStackClient::new();
        let (prov, store, mut tracker) = setup(client.clone());
        let req = NodeGroupRequest {
            key_pair_name: String::new(),
            ..mock::request()
        };
        let err = prov
            .create(&req, &mut tracker, &CancelSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Validation(_)));
        assert!(client.created_inputs().is_empty());
        assert!(store.history().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_cancelled_during_warmup() {
        let client = ScriptedStackClient::new();
        let (prov, _store, mut tracker) = setup(client.clone());
        let (handle, signal) = cancel::channel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            handle.cancel();
        });

        let start = Instant::now();
        let outcome = prov
            .create(&mock::request(), &mut tracker, &signal)
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(120));
        assert_eq!(client.describe_calls(), 0);
        assert!(tracker.current().created);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_resumes_without_resubmitting() {
        let client = ScriptedStackClient::new().describe(mock::stack_with_role("CREATE_COMPLETE", ROLE_ARN));
        let store = MemoryStateStore::new();
        let mut tracker = created_tracker(&store);
        let prov = StackProvisioner::new(client.clone(), Timing::default());

        let start = Instant::now();
        let outcome = prov
            .create(&mock::request(), &mut tracker, &CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Done(ROLE_ARN.to_string()));
        assert!(client.created_inputs().is_empty());
        // No warm-up on resume.
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_times_out_with_last_status() {
        let client = ScriptedStackClient::new().describe_fallback(mock::stack("CREATE_IN_PROGRESS"));
        let (prov, _store, mut tracker) = setup(client);
        let err = prov
            .create(&mock::request(), &mut tracker, &CancelSignal::never())
            .await
            .unwrap_err();
        match err {
            ReconcileError::Timeout { last_status, elapsed_secs, .. } => {
                assert_eq!(last_status, "CREATE_IN_PROGRESS");
                // 5 min + 2 min per node for a 3-node fleet.
                assert!(elapsed_secs >= 660);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_is_noop_when_not_created() {
        let client = ScriptedStackClient::new();
        let (prov, store, mut tracker) = setup(client.clone());
        let outcome = prov
            .delete(3, &mut tracker, &CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Done(()));
        assert_eq!(client.delete_calls(), 0);
        assert!(store.history().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_waits_for_stack_to_disappear() {
        let client = ScriptedStackClient::new()
            .describe(mock::stack("DELETE_IN_PROGRESS"))
            .describe(Err(StackError::Api("Throttling".into())))
            .describe(Err(StackError::NotFound("demo-ng".into())));
        let store = MemoryStateStore::new();
        let mut tracker = created_tracker(&store);
        let prov = StackProvisioner::new(client.clone(), Timing::default());

        let outcome = prov
            .delete(3, &mut tracker, &CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Done(()));
        assert_eq!(client.delete_calls(), 1);
        assert_eq!(client.describe_calls(), 3);

        let state = tracker.current();
        assert!(!state.created);
        assert_eq!(state.stack_status, DELETE_COMPLETE);
        assert_eq!(state.membership_status, DELETE_COMPLETE);
        assert!(store.history().iter().any(|s| s.stack_status == DELETE_REQUESTED));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_twice_second_is_noop() {
        let client = ScriptedStackClient::new().describe(Err(StackError::NotFound("demo-ng".into())));
        let store = MemoryStateStore::new();
        let mut tracker = created_tracker(&store);
        let prov = StackProvisioner::new(client.clone(), Timing::default());

        prov.delete(3, &mut tracker, &CancelSignal::never())
            .await
            .unwrap();
        let outcome = prov
            .delete(3, &mut tracker, &CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Done(()));
        assert_eq!(client.delete_calls(), 1);
        assert!(!store.latest().unwrap().created);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_submit_error_still_clears_created() {
        let client = ScriptedStackClient::new().delete_result(Err(StackError::Api("AccessDenied".into())));
        let store = MemoryStateStore::new();
        let mut tracker = created_tracker(&store);
        let prov = StackProvisioner::new(client.clone(), Timing::default());

        let err = prov
            .delete(3, &mut tracker, &CancelSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::TransientApi(_)));
        let state = store.latest().unwrap();
        assert!(!state.created);
        assert_eq!(state.stack_status, "AccessDenied");
        assert_eq!(client.describe_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_of_missing_stack_completes() {
        let client = ScriptedStackClient::new().delete_result(Err(StackError::NotFound("demo-ng".into())));
        let store = MemoryStateStore::new();
        let mut tracker = created_tracker(&store);
        let prov = StackProvisioner::new(client.clone(), Timing::default());

        let outcome = prov
            .delete(3, &mut tracker, &CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Done(()));
        assert_eq!(tracker.current().stack_status, DELETE_COMPLETE);
        assert_eq!(client.describe_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_cancelled_during_settle_clears_created() {
        let client = ScriptedStackClient::new();
        let store = MemoryStateStore::new();
        let mut tracker = created_tracker(&store);
        let prov = StackProvisioner::new(client.clone(), Timing::default());
        let (handle, signal) = cancel::channel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            handle.cancel();
        });

        let outcome = prov.delete(3, &mut tracker, &signal).await.unwrap();
        assert_eq!(outcome, PollOutcome::Cancelled);
        assert_eq!(client.describe_calls(), 0);
        assert!(!tracker.current().created);
    }
}
