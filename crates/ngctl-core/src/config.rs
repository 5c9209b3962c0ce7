use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::request::NodeGroupRequest;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level reconciler configuration loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub cluster: ClusterConfig,
    pub node_group: NodeGroupConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub timing: Timing,
}

/// The control plane the node group joins.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    pub name: String,
    /// Tag key stamped on the stack; the value is the cluster name.
    #[serde(default = "default_tag")]
    pub tag: String,
    pub kubeconfig: PathBuf,
    #[serde(default)]
    pub region: Option<String>,
    /// Where the state snapshot lives. Defaults next to the config file.
    #[serde(default)]
    pub state_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeGroupConfig {
    pub name: String,
    pub key_pair_name: String,
    pub image_id: String,
    #[serde(default = "default_instance_type")]
    pub instance_type: String,
    #[serde(default = "default_size")]
    pub min_size: u32,
    #[serde(default = "default_size")]
    pub max_size: u32,
    #[serde(default = "default_volume_size")]
    pub volume_size_gb: u32,
    pub vpc_id: String,
    pub subnet_ids: Vec<String>,
    pub security_group_id: String,
    #[serde(default)]
    pub enable_ssh: bool,
    /// Recorded as the provenance tag. Defaults to the local hostname.
    #[serde(default)]
    pub hostname: Option<String>,
}

/// External binaries the reconciler shells out to.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_kubectl")]
    pub kubectl: String,
    #[serde(default = "default_aws")]
    pub aws: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            kubectl: default_kubectl(),
            aws: default_aws(),
        }
    }
}

/// Delays, poll intervals, and budgets (all in seconds).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Known minimum provisioning time before the first describe.
    pub create_warmup_secs: u64,
    /// Pause after submitting a delete before the first describe.
    pub delete_settle_secs: u64,
    pub create_poll_secs: u64,
    pub create_retry_secs: u64,
    pub delete_poll_secs: u64,
    pub delete_retry_secs: u64,
    pub membership_poll_secs: u64,
    pub membership_retry_secs: u64,
    /// Budget = base + per_node * max_size.
    pub timeout_base_secs: u64,
    pub timeout_per_node_secs: u64,
    pub apply_timeout_secs: u64,
    pub get_nodes_timeout_secs: u64,
    pub api_call_timeout_secs: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            create_warmup_secs: 120,
            delete_settle_secs: 60,
            create_poll_secs: 15,
            create_retry_secs: 5,
            delete_poll_secs: 5,
            delete_retry_secs: 10,
            membership_poll_secs: 15,
            membership_retry_secs: 5,
            timeout_base_secs: 300,
            timeout_per_node_secs: 120,
            apply_timeout_secs: 10,
            get_nodes_timeout_secs: 30,
            api_call_timeout_secs: 60,
        }
    }
}

impl Timing {
    /// Wait budget that grows with the fleet so larger groups get more time.
    pub fn fleet_timeout(&self, fleet_size: u32) -> Duration {
        Duration::from_secs(self.timeout_base_secs + self.timeout_per_node_secs * fleet_size as u64)
    }
}

fn default_tag() -> String {
    "ngctl".to_string()
}
fn default_instance_type() -> String {
    "m5.large".to_string()
}
fn default_size() -> u32 {
    1
}
fn default_volume_size() -> u32 {
    20
}
fn default_kubectl() -> String {
    "kubectl".to_string()
}
fn default_aws() -> String {
    "aws".to_string()
}

impl Config {
    /// Load config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse config from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster.name.is_empty() {
            return Err(ConfigError::Invalid("cluster.name must not be empty".into()));
        }
        if self.node_group.name.is_empty() {
            return Err(ConfigError::Invalid("node_group.name must not be empty".into()));
        }
        if self.node_group.max_size == 0 {
            return Err(ConfigError::Invalid("node_group.max_size must be at least 1".into()));
        }
        if self.node_group.min_size > self.node_group.max_size {
            return Err(ConfigError::Invalid(format!(
                "node_group.min_size ({}) exceeds max_size ({})",
                self.node_group.min_size, self.node_group.max_size
            )));
        }
        if self.node_group.subnet_ids.is_empty() {
            return Err(ConfigError::Invalid(
                "node_group.subnet_ids must list at least one subnet".into(),
            ));
        }
        Ok(())
    }

    /// Build the immutable request. `local_hostname` is used when the
    /// config does not pin one.
    pub fn request(&self, local_hostname: &str) -> NodeGroupRequest {
        let ng = &self.node_group;
        NodeGroupRequest {
            stack_name: ng.name.clone(),
            cluster_name: self.cluster.name.clone(),
            tag_key: self.cluster.tag.clone(),
            tag_value: self.cluster.name.clone(),
            enable_ssh: ng.enable_ssh,
            hostname: ng
                .hostname
                .clone()
                .unwrap_or_else(|| local_hostname.to_string()),
            min_size: ng.min_size,
            max_size: ng.max_size,
            image_id: ng.image_id.clone(),
            instance_type: ng.instance_type.clone(),
            volume_size_gb: ng.volume_size_gb,
            vpc_id: ng.vpc_id.clone(),
            subnet_ids: ng.subnet_ids.clone(),
            security_group_id: ng.security_group_id.clone(),
            key_pair_name: ng.key_pair_name.clone(),
        }
    }

    /// Effective state file: explicit `cluster.state_file`, else
    /// `<config dir>/<node group>.state.json`.
    pub fn state_path(&self, config_path: &Path) -> PathBuf {
        if let Some(path) = &self.cluster.state_file {
            return path.clone();
        }
        let dir = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        dir.join(format!("{}.state.json", self.node_group.name))
    }
}
