use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use ngctl_core::ReconcileError;
use ngctl_core::config::Timing;
use ngctl_core::node;
use ngctl_core::time::format_elapsed;
use tokio::time::Instant;
use tracing::{info, warn};

use super::kubectl::{Kubectl, KubectlError};
use crate::cancel::CancelSignal;
use crate::poller::{self, PollConfig, PollOutcome, Probe, ProbeOutcome};
use crate::shell::CommandRunner;
use crate::templates;
use crate::tracker::StateTracker;

/// Maps the fleet's role into the control plane and waits until the
/// expected number of nodes report Ready.
pub struct MembershipVerifier<R: CommandRunner> {
    kubectl: Kubectl<R>,
    timing: Timing,
}

impl<R: CommandRunner> MembershipVerifier<R> {
    pub fn new(kubectl: Kubectl<R>, timing: Timing) -> Self {
        Self { kubectl, timing }
    }

    pub async fn verify(
        &self,
        role_arn: &str,
        expected_ready: u32,
        kubeconfig: &Path,
        timeout: Duration,
        tracker: &mut StateTracker,
        cancel: &CancelSignal,
    ) -> Result<PollOutcome<()>, ReconcileError> {
        if role_arn.is_empty() {
            return Err(ReconcileError::validation(
                "membership verification needs the node instance role",
            ));
        }

        // Removed when dropped, whichever way this function returns.
        let auth_map = templates::write_temp("ngctl-aws-auth-", &templates::render_auth_map(role_arn)?)?;

        let config = PollConfig::new(
            Duration::from_secs(self.timing.membership_poll_secs),
            Duration::from_secs(self.timing.membership_retry_secs),
            timeout,
        );
        let start = Instant::now();
        let mut probe = MembershipProbe {
            kubectl: &self.kubectl,
            kubeconfig,
            auth_map: auth_map.path(),
            expected: expected_ready as usize,
            applied: false,
            tracker,
        };
        let outcome = poller::poll("node readiness", config, cancel, &mut probe).await?;
        if outcome == PollOutcome::Done(()) {
            info!(
                ready = expected_ready,
                elapsed = %format_elapsed(start.elapsed()),
                "node group joined the cluster"
            );
        }
        Ok(outcome)
    }
}

struct MembershipProbe<'a, R: CommandRunner> {
    kubectl: &'a Kubectl<R>,
    kubeconfig: &'a Path,
    auth_map: &'a Path,
    expected: usize,
    applied: bool,
    tracker: &'a mut StateTracker,
}

impl<R: CommandRunner> MembershipProbe<'_, R> {
    fn transient(&mut self, what: &str, err: KubectlError) -> ProbeOutcome<()> {
        let text = err.to_string();
        warn!(error = %text, "{}", what);
        self.tracker.update(|s| s.with_membership_status(text.clone()));
        ProbeOutcome::Transient(text)
    }
}

fn unsupported(output: String) -> ProbeOutcome<()> {
    ProbeOutcome::Failed(ReconcileError::CommandUnsupported(output))
}

#[async_trait]
impl<'a, R: CommandRunner> Probe for MembershipProbe<'a, R> {
    type Output = ();

    async fn probe(&mut self) -> ProbeOutcome<()> {
        if !self.applied {
            match self.kubectl.apply(self.kubeconfig, self.auth_map).await {
                Ok(output) => {
                    info!(output = %output, "identity mapping applied");
                    self.applied = true;
                }
                Err(KubectlError::UnsupportedFlag(output)) => return unsupported(output),
                Err(e) => return self.transient("failed to apply identity mapping", e),
            }
        }

        let nodes = match self.kubectl.get_nodes(self.kubeconfig).await {
            Ok(nodes) => nodes,
            Err(KubectlError::UnsupportedFlag(output)) => return unsupported(output),
            Err(e) => return self.transient("failed to list nodes", e),
        };
        let ready = node::count_ready(&nodes);
        let status = format!("{}/{} READY", ready, self.expected);
        self.tracker.update(|s| s.with_membership_status(status.clone()));
        info!(nodes = nodes.len(), ready, expected = self.expected, "node readiness");

        if ready == self.expected {
            ProbeOutcome::Done(())
        } else {
            ProbeOutcome::InProgress(status)
        }
    }
}
