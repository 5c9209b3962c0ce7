use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Stack output holding the ARN of the role the fleet's instances assume.
pub const NODE_INSTANCE_ROLE_OUTPUT: &str = "NodeInstanceRole";

/// Raw status recorded once a stack is confirmed gone.
pub const DELETE_COMPLETE: &str = "DELETE_COMPLETE";

/// Closed set of stack states the reconciler reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StackStatus {
    Pending,
    InProgress,
    Complete,
    Failed,
    Rollback,
    NotFound,
}

impl StackStatus {
    /// Map a raw provider status string onto the closed set.
    ///
    /// Rollback is checked before the generic failure/complete suffixes so
    /// that `ROLLBACK_COMPLETE` is not mistaken for success.
    pub fn classify(raw: &str) -> Self {
        if raw.is_empty() {
            return Self::Pending;
        }
        if raw == DELETE_COMPLETE {
            return Self::NotFound;
        }
        if raw.contains("ROLLBACK") {
            return Self::Rollback;
        }
        if failure_pattern().is_match(raw) {
            return Self::Failed;
        }
        if raw.ends_with("_IN_PROGRESS") {
            return Self::InProgress;
        }
        if raw.ends_with("_COMPLETE") {
            return Self::Complete;
        }
        Self::Pending
    }

    /// Failure or rollback: the stack will not converge on its own.
    pub fn is_terminal_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Rollback)
    }
}

impl std::fmt::Display for StackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in-progress"),
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
            Self::Rollback => write!(f, "rollback"),
            Self::NotFound => write!(f, "not-found"),
        }
    }
}

fn failure_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z_]*_FAILED$").expect("static regex"))
}

/// One describe-stack observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackState {
    pub status: StackStatus,
    /// Status exactly as the provider reported it, e.g. `CREATE_IN_PROGRESS`.
    pub raw_status: String,
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

impl StackState {
    pub fn from_raw(raw_status: &str, outputs: BTreeMap<String, String>) -> Self {
        Self {
            status: StackStatus::classify(raw_status),
            raw_status: raw_status.to_string(),
            outputs,
        }
    }

    /// The fleet's execution role, when the stack has published it.
    pub fn node_instance_role(&self) -> Option<&str> {
        self.outputs
            .get(NODE_INSTANCE_ROLE_OUTPUT)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}
