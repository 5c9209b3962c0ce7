//! Bounded retry-with-timeout used by every wait loop.

use std::time::Duration;

use async_trait::async_trait;
use ngctl_core::ReconcileError;
use ngctl_core::time::format_elapsed;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cancel::CancelSignal;

/// What a single probe observed.
#[derive(Debug)]
pub enum ProbeOutcome<T> {
    /// The call itself failed but may succeed later. Sleep the retry
    /// interval and try again.
    Transient(String),
    /// The target is converging. Sleep the poll interval and try again.
    InProgress(String),
    /// Terminal success.
    Done(T),
    /// Terminal failure; no further retries.
    Failed(ReconcileError),
}

/// One observation step of a wait loop.
///
/// Probes keep their own state between calls (captured outputs, an
/// "already applied" flag, ...), hence `&mut self`.
#[async_trait]
pub trait Probe: Send {
    type Output: Send;

    async fn probe(&mut self) -> ProbeOutcome<Self::Output>;
}

/// How a poll loop ended without error.
#[derive(Debug, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Done(T),
    Cancelled,
}

/// Sleep between probes and the overall budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Sleep after an in-progress observation.
    pub interval: Duration,
    /// Sleep after a transient failure.
    pub retry_interval: Duration,
    /// Wall-clock budget measured from the start of the loop.
    pub timeout: Duration,
}

impl PollConfig {
    pub fn new(interval: Duration, retry_interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            retry_interval,
            timeout,
        }
    }
}

/// Drive `probe` until it reports done/failed, the budget runs out, or
/// `cancel` fires.
///
/// The loop may overrun `timeout` by at most one probe call plus one sleep.
/// Cancellation yields `Ok(PollOutcome::Cancelled)`.
pub async fn poll<P: Probe>(
    what: &str,
    config: PollConfig,
    cancel: &CancelSignal,
    probe: &mut P,
) -> Result<PollOutcome<P::Output>, ReconcileError> {
    let start = Instant::now();
    let mut last_status = String::new();
    let mut attempt: u32 = 0;

    while start.elapsed() < config.timeout {
        if cancel.is_cancelled() {
            debug!(what, "poll cancelled");
            return Ok(PollOutcome::Cancelled);
        }
        attempt += 1;

        let delay = match probe.probe().await {
            ProbeOutcome::Done(value) => return Ok(PollOutcome::Done(value)),
            ProbeOutcome::Failed(err) => return Err(err),
            ProbeOutcome::Transient(status) => {
                warn!(
                    what,
                    attempt,
                    status = %status,
                    elapsed = %format_elapsed(start.elapsed()),
                    "probe failed, retrying"
                );
                last_status = status;
                config.retry_interval
            }
            ProbeOutcome::InProgress(status) => {
                debug!(
                    what,
                    attempt,
                    status = %status,
                    elapsed = %format_elapsed(start.elapsed()),
                    "still converging"
                );
                last_status = status;
                config.interval
            }
        };

        if cancel.sleep(delay).await {
            debug!(what, "poll cancelled during sleep");
            return Ok(PollOutcome::Cancelled);
        }
    }

    Err(ReconcileError::Timeout {
        what: what.to_string(),
        elapsed_secs: start.elapsed().as_secs(),
        last_status,
    })
}
