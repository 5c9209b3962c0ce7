use serde::{Deserialize, Serialize};

use crate::time;

/// Persisted snapshot of one node group's reconciliation progress.
///
/// Snapshots are values: every transition builds a new one (see the
/// `with_*` helpers) and hands it to the state store, so a restarted
/// process can read the last one and decide whether to resume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterState {
    pub node_group_name: String,
    pub key_pair_name: String,
    /// Last raw stack status or describe error text.
    #[serde(default)]
    pub stack_status: String,
    /// Last membership progress indicator or apply/list error text.
    #[serde(default)]
    pub membership_status: String,
    /// ARN of the fleet's execution role, once the stack publishes it.
    #[serde(default)]
    pub role_arn: String,
    /// True from create acceptance until delete finishes (either way).
    #[serde(default)]
    pub created: bool,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl ClusterState {
    pub fn new(node_group_name: &str, key_pair_name: &str) -> Self {
        Self {
            node_group_name: node_group_name.to_string(),
            key_pair_name: key_pair_name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_stack_status(&self, status: impl Into<String>) -> Self {
        Self {
            stack_status: status.into(),
            ..self.clone()
        }
        .touched()
    }

    pub fn with_membership_status(&self, status: impl Into<String>) -> Self {
        Self {
            membership_status: status.into(),
            ..self.clone()
        }
        .touched()
    }

    /// Record the same status text in both fields (used for errors that
    /// affect the whole node group).
    pub fn with_both_statuses(&self, status: impl Into<String>) -> Self {
        let status = status.into();
        Self {
            stack_status: status.clone(),
            membership_status: status,
            ..self.clone()
        }
        .touched()
    }

    pub fn with_role_arn(&self, arn: impl Into<String>) -> Self {
        Self {
            role_arn: arn.into(),
            ..self.clone()
        }
        .touched()
    }

    pub fn with_created(&self, created: bool) -> Self {
        Self {
            created,
            ..self.clone()
        }
        .touched()
    }

    fn touched(mut self) -> Self {
        self.updated_at = Some(time::utc_now());
        self
    }

    /// One-line human summary used by the CLI next to errors.
    pub fn summary(&self) -> String {
        format!(
            "stack {:?}: stack status {:?}, membership {:?}, created={}",
            self.node_group_name,
            display_or_dash(&self.stack_status),
            display_or_dash(&self.membership_status),
            self.created
        )
    }
}

fn display_or_dash(s: &str) -> &str {
    if s.is_empty() { "-" } else { s }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_produce_new_snapshots() {
        let base = ClusterState::new("demo-ng", "demo-key");
        let next = base.with_stack_status("CREATE_IN_PROGRESS");
        assert_eq!(base.stack_status, "");
        assert_eq!(next.stack_status, "CREATE_IN_PROGRESS");
        assert_eq!(next.node_group_name, "demo-ng");
        assert!(next.updated_at.is_some());
        assert!(base.updated_at.is_none());
    }

    #[test]
    fn test_both_statuses_overwrites_each_field() {
        let state = ClusterState::new("demo-ng", "demo-key")
            .with_stack_status("CREATE_COMPLETE")
            .with_membership_status("3/3 READY")
            .with_both_statuses("AccessDenied");
        assert_eq!(state.stack_status, "AccessDenied");
        assert_eq!(state.membership_status, "AccessDenied");
    }

    #[test]
    fn test_deserialize_tolerates_missing_fields() {
        let state: ClusterState =
            serde_json::from_str(r#"{"node_group_name":"ng","key_pair_name":"k"}"#).unwrap();
        assert!(!state.created);
        assert!(state.role_arn.is_empty());
    }

    #[test]
    fn test_summary_dashes_empty_fields() {
        let summary = ClusterState::new("demo-ng", "k").summary();
        assert!(summary.contains("\"-\""));
        assert!(summary.contains("created=false"));
    }
}
