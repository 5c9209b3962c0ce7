//! Error taxonomy for node-group reconciliation.

use thiserror::Error;

/// Every way a create/delete/verify pass can end unsuccessfully.
///
/// Cancellation is deliberately absent: an interrupted reconciliation is a
/// clean outcome, not an error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReconcileError {
    /// A required field was missing before create/delete.
    #[error("validation error: {0}")]
    Validation(String),

    /// An infra or control-plane call failed for a recoverable reason.
    #[error("transient API error: {0}")]
    TransientApi(String),

    /// The stack reached a failure or rollback status.
    #[error("stack {name:?} failed with status {status:?}")]
    TerminalStack { name: String, status: String },

    /// The stack completed but never exposed its node instance role.
    #[error("stack {0:?} completed without a NodeInstanceRole output")]
    RoleNotFound(String),

    /// The control-plane CLI rejected a flag (client/binary version skew).
    #[error("control-plane CLI does not support the requested flag: {0}")]
    CommandUnsupported(String),

    /// The wait budget ran out before the target state was reached.
    #[error("timed out after {elapsed_secs}s waiting for {what} (last status {last_status:?})")]
    Timeout {
        what: String,
        elapsed_secs: u64,
        last_status: String,
    },

    /// A state snapshot could not be written.
    #[error("failed to persist state: {0}")]
    Persistence(String),

    /// A template could not be rendered or written.
    #[error("template error: {0}")]
    Template(String),
}

impl ReconcileError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::TransientApi(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template(msg.into())
    }

    /// Whether retrying the same operation could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientApi(_) | Self::Timeout { .. })
    }
}
