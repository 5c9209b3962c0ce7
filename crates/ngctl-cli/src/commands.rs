use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

use crate::logging::{self, LogFormat};
use crate::output::{self, OutputFormat};
use crate::ui;

use ngctl_core::config::Config;
use ngctl_core::state::ClusterState;
use ngctl_runtime::membership::{Kubectl, MembershipVerifier};
use ngctl_runtime::shell::{self, HostRunner};
use ngctl_runtime::stack::{AwsCliStackClient, StackProvisioner};
use ngctl_runtime::store::{FileStateStore, StateStore};
use ngctl_runtime::{Outcome, Reconciler};

#[derive(Parser)]
#[command(
    name = "ngctl",
    version,
    about = "Provision, verify, and tear down Kubernetes worker node groups"
)]
struct Cli {
    /// Output format: table, json
    #[arg(long, short = 'o', global = true, default_value = "table")]
    output: String,

    /// Log format: human, json
    #[arg(long, global = true, default_value = "human")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the node group stack and wait for its nodes to join the cluster
    Create {
        /// Path to the node group config file (TOML)
        #[arg(long, short = 'c')]
        config: PathBuf,
    },
    /// Delete the node group stack created by a previous `create`
    Delete {
        /// Path to the node group config file (TOML)
        #[arg(long, short = 'c')]
        config: PathBuf,
    },
    /// Show the last recorded state of the node group
    Status {
        /// Path to the node group config file (TOML)
        #[arg(long, short = 'c')]
        config: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Create,
    Delete,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

// ============================================================================
// Command dispatch
// ============================================================================

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    logging::init(LogFormat::from_str_arg(&cli.log_format));
    let out_fmt = OutputFormat::from_str_arg(&cli.output);

    match cli.command {
        Commands::Create { config } => cmd_reconcile(Action::Create, &config, out_fmt),
        Commands::Delete { config } => cmd_reconcile(Action::Delete, &config, out_fmt),
        Commands::Status { config } => cmd_status(&config, out_fmt),
    }
}

// ============================================================================
// Handlers
// ============================================================================

fn cmd_reconcile(action: Action, config_path: &Path, out_fmt: OutputFormat) -> Result<()> {
    let config = load_config(config_path)?;
    let runtime = build_runtime()?;
    let req = config.request(&runtime.block_on(shell::local_hostname(&HostRunner)));
    let timing = config.timing.clone();

    let aws = resolve_tool(&config.tools.aws)?;
    // Delete never talks to the control plane.
    let kubectl = match action {
        Action::Create => resolve_tool(&config.tools.kubectl)?,
        Action::Delete => config.tools.kubectl.clone(),
    };
    debug!(aws = %aws, kubectl = %kubectl, hostname = %req.hostname, "resolved tools");

    let store = Arc::new(FileStateStore::new(config.state_path(config_path)));
    let client = AwsCliStackClient::new(
        HostRunner,
        &aws,
        config.cluster.region.clone(),
        Duration::from_secs(timing.api_call_timeout_secs),
    );
    let kubectl = Kubectl::new(
        HostRunner,
        &kubectl,
        Duration::from_secs(timing.apply_timeout_secs),
        Duration::from_secs(timing.get_nodes_timeout_secs),
    );
    let reconciler = Reconciler::new(
        StackProvisioner::new(client, timing.clone()),
        MembershipVerifier::new(kubectl, timing.clone()),
        store.clone(),
        timing,
        config.cluster.kubeconfig.clone(),
    );

    let handle = reconciler.cancel_handle();
    ctrlc::set_handler(move || handle.cancel()).context("Failed to install Ctrl-C handler")?;

    ui::info(&format!(
        "{} node group {} in cluster {} (state: {})",
        match action {
            Action::Create => "Creating",
            Action::Delete => "Deleting",
        },
        req.stack_name,
        req.cluster_name,
        store.path().display()
    ));

    let result = runtime.block_on(async {
        match action {
            Action::Create => reconciler.create(&req).await,
            Action::Delete => reconciler.delete(&req).await,
        }
    });

    match result {
        Ok(report) => {
            match report.outcome {
                Outcome::Completed => ui::success(&format!("{} of {} completed", action, req.stack_name)),
                Outcome::Cancelled => ui::warn(&format!(
                    "{} of {} cancelled; run it again to resume",
                    action, req.stack_name
                )),
            }
            if report.persist_failures > 0 {
                ui::warn(&format!(
                    "{} state snapshot(s) could not be written",
                    report.persist_failures
                ));
            }
            if let Some(err) = &report.final_persist_error {
                ui::warn(&format!(
                    "final state was not saved to {} ({}); `ngctl status` shows an older snapshot",
                    store.path().display(),
                    err
                ));
            }
            output::render_state(&report.state, out_fmt);
            Ok(())
        }
        Err(err) => {
            if let Ok(Some(state)) = store.load() {
                ui::error(&format!("last recorded {}", state.summary()));
            }
            if err.is_retryable() {
                ui::info(&format!("run 'ngctl {}' again to resume", action));
            }
            Err(anyhow::Error::new(err).context(format!("{} of {} failed", action, req.stack_name)))
        }
    }
}

fn cmd_status(config_path: &Path, out_fmt: OutputFormat) -> Result<()> {
    let config = load_config(config_path)?;
    match load_state(&config, config_path)? {
        Some(state) => output::render_state(&state, out_fmt),
        None => ui::info(&format!(
            "No state recorded for node group {} (run 'ngctl create')",
            config.node_group.name
        )),
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn load_config(path: &Path) -> Result<Config> {
    Config::from_file(path).with_context(|| format!("Failed to load config {}", path.display()))
}

fn load_state(config: &Config, config_path: &Path) -> Result<Option<ClusterState>> {
    let store = FileStateStore::new(config.state_path(config_path));
    store
        .load()
        .with_context(|| format!("Failed to read state {}", store.path().display()))
}

/// Resolve a tool name or path to an executable, failing early with a
/// readable message instead of a spawn error mid-reconcile.
fn resolve_tool(name: &str) -> Result<String> {
    let path = which::which(name).with_context(|| format!("'{}' not found in PATH", name))?;
    Ok(path.display().to_string())
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .with_context(|| "Failed to create tokio runtime")
}
