use ngctl_core::state::ClusterState;

use crate::ui;

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable table (default).
    #[default]
    Table,
    /// JSON output.
    Json,
}

impl OutputFormat {
    /// Parse from CLI string argument.
    pub fn from_str_arg(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Table,
        }
    }
}

/// Render a node group snapshot in the specified output format.
pub fn render_state(state: &ClusterState, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            ui::status_header(&format!("node group {}", state.node_group_name));
            for (label, value) in state_rows(state) {
                ui::status_line(label, &value);
            }
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(state).unwrap_or_default()
            );
        }
    }
}

fn state_rows(state: &ClusterState) -> Vec<(&'static str, String)> {
    let or_dash = |s: &str| {
        if s.is_empty() {
            "-".to_string()
        } else {
            s.to_string()
        }
    };
    vec![
        ("Key pair:", or_dash(&state.key_pair_name)),
        ("Created:", if state.created { "yes" } else { "no" }.to_string()),
        ("Stack status:", or_dash(&state.stack_status)),
        ("Membership:", or_dash(&state.membership_status)),
        ("Role ARN:", or_dash(&state.role_arn)),
        (
            "Updated:",
            state.updated_at.clone().unwrap_or_else(|| "-".to_string()),
        ),
    ]
}
