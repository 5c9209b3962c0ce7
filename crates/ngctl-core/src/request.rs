use serde::{Deserialize, Serialize};

use crate::error::ReconcileError;

/// Tag key stamped on every stack so operators can see which host created it.
pub const HOSTNAME_TAG: &str = "HOSTNAME";

/// Capability acknowledgment required because the stack creates IAM roles.
pub const CAPABILITY_IAM: &str = "CAPABILITY_IAM";

/// A key/value pair passed to the infrastructure API (tags and parameters).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Everything needed to provision one node group. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeGroupRequest {
    pub stack_name: String,
    pub cluster_name: String,
    pub tag_key: String,
    pub tag_value: String,
    pub enable_ssh: bool,
    pub hostname: String,
    pub min_size: u32,
    pub max_size: u32,
    pub image_id: String,
    pub instance_type: String,
    pub volume_size_gb: u32,
    pub vpc_id: String,
    pub subnet_ids: Vec<String>,
    pub security_group_id: String,
    pub key_pair_name: String,
}

impl NodeGroupRequest {
    /// Fail fast on the fields the stack cannot be created without.
    pub fn validate(&self) -> Result<(), ReconcileError> {
        if self.key_pair_name.is_empty() {
            return Err(ReconcileError::validation(
                "cannot create node group without key pair name",
            ));
        }
        if self.stack_name.is_empty() {
            return Err(ReconcileError::validation(
                "cannot create node group with empty stack name",
            ));
        }
        if self.min_size > self.max_size {
            return Err(ReconcileError::validation(format!(
                "min size {} exceeds max size {}",
                self.min_size, self.max_size
            )));
        }
        Ok(())
    }

    /// Stack parameters, derived one-to-one from the request.
    pub fn parameters(&self) -> Vec<KeyValue> {
        vec![
            KeyValue::new("ClusterName", &self.cluster_name),
            KeyValue::new("NodeGroupName", &self.stack_name),
            KeyValue::new("KeyName", &self.key_pair_name),
            KeyValue::new("NodeImageId", &self.image_id),
            KeyValue::new("NodeInstanceType", &self.instance_type),
            KeyValue::new("NodeAutoScalingGroupMinSize", self.min_size.to_string()),
            KeyValue::new("NodeAutoScalingGroupMaxSize", self.max_size.to_string()),
            KeyValue::new("NodeVolumeSize", self.volume_size_gb.to_string()),
            KeyValue::new("VpcId", &self.vpc_id),
            KeyValue::new("Subnets", self.subnet_ids.join(",")),
            KeyValue::new("ClusterControlPlaneSecurityGroup", &self.security_group_id),
        ]
    }

    /// Provenance tags: the configured tag pair plus the submitting hostname.
    pub fn tags(&self) -> Vec<KeyValue> {
        vec![
            KeyValue::new(&self.tag_key, &self.tag_value),
            KeyValue::new(HOSTNAME_TAG, &self.hostname),
        ]
    }

    pub fn capabilities(&self) -> Vec<String> {
        vec![CAPABILITY_IAM.to_string()]
    }
}

#[cfg(test)]
pub(crate) fn fixture() -> NodeGroupRequest {
    NodeGroupRequest {
        stack_name: "demo-ng".to_string(),
        cluster_name: "demo".to_string(),
        tag_key: "ngctl".to_string(),
        tag_value: "demo".to_string(),
        enable_ssh: false,
        hostname: "builder-1".to_string(),
        min_size: 1,
        max_size: 3,
        image_id: "ami-0123456789".to_string(),
        instance_type: "m5.large".to_string(),
        volume_size_gb: 40,
        vpc_id: "vpc-1".to_string(),
        subnet_ids: vec!["subnet-a".to_string(), "subnet-b".to_string()],
        security_group_id: "sg-1".to_string(),
        key_pair_name: "demo-key".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_fixture() {
        assert!(fixture().validate().is_ok());
    }

    #[test]
    fn test_validate_requires_key_pair() {
        let req = NodeGroupRequest {
            key_pair_name: String::new(),
            ..fixture()
        };
        let err = req.validate().unwrap_err();
        assert!(matches!(err, ReconcileError::Validation(_)));
        assert!(err.to_string().contains("key pair"));
    }

    #[test]
    fn test_validate_requires_stack_name() {
        let req = NodeGroupRequest {
            stack_name: String::new(),
            ..fixture()
        };
        assert!(matches!(
            req.validate(),
            Err(ReconcileError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_inverted_sizes() {
        let req = NodeGroupRequest {
            min_size: 5,
            max_size: 2,
            ..fixture()
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_parameters_join_subnets() {
        let params = fixture().parameters();
        assert_eq!(params.len(), 11);
        let subnets = params.iter().find(|p| p.key == "Subnets").unwrap();
        assert_eq!(subnets.value, "subnet-a,subnet-b");
        let max = params
            .iter()
            .find(|p| p.key == "NodeAutoScalingGroupMaxSize")
            .unwrap();
        assert_eq!(max.value, "3");
    }

    #[test]
    fn test_tags_include_hostname() {
        let tags = fixture().tags();
        assert_eq!(tags[0], KeyValue::new("ngctl", "demo"));
        assert_eq!(tags[1], KeyValue::new(HOSTNAME_TAG, "builder-1"));
    }
}
