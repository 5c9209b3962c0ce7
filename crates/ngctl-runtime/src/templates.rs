use std::io::Write;

use ngctl_core::ReconcileError;
use ngctl_core::request::NodeGroupRequest;
use tempfile::NamedTempFile;

const NODEGROUP_TEMPLATE: &str = include_str!("../templates/nodegroup.yaml.tera");
const AWS_AUTH_TEMPLATE: &str = include_str!("../templates/aws-auth.yaml.tera");

fn render(name: &str, source: &str, ctx: &tera::Context) -> Result<String, ReconcileError> {
    let mut tera = tera::Tera::default();
    tera.add_raw_template(name, source)
        .map_err(|e| ReconcileError::template(format!("failed to parse {}: {}", name, e)))?;
    tera.render(name, ctx)
        .map_err(|e| ReconcileError::template(format!("failed to render {}: {}", name, e)))
}

/// Render the node-group stack template body for `req`.
pub fn render_stack_template(req: &NodeGroupRequest) -> Result<String, ReconcileError> {
    let mut ctx = tera::Context::new();
    ctx.insert("description", &format!("{}-node-group-stack", req.cluster_name));
    ctx.insert("tag_key", &req.tag_key);
    ctx.insert("tag_value", &req.tag_value);
    ctx.insert("hostname", &req.hostname);
    ctx.insert("enable_ssh", &req.enable_ssh);
    render("nodegroup.yaml", NODEGROUP_TEMPLATE, &ctx)
}

/// Render the identity-mapping document that lets instances assuming
/// `role_arn` register as nodes.
pub fn render_auth_map(role_arn: &str) -> Result<String, ReconcileError> {
    if role_arn.is_empty() {
        return Err(ReconcileError::template("role ARN must not be empty"));
    }
    let mut ctx = tera::Context::new();
    ctx.insert("role_arn", role_arn);
    render("aws-auth.yaml", AWS_AUTH_TEMPLATE, &ctx)
}

/// Write `content` to a fresh temp file. The file is removed when the
/// returned handle is dropped, so callers hold it for as long as the path
/// is in use.
pub fn write_temp(prefix: &str, content: &str) -> Result<NamedTempFile, ReconcileError> {
    let mut tmp = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".yaml")
        .tempfile()
        .map_err(|e| ReconcileError::template(format!("failed to create temp file: {}", e)))?;
    tmp.write_all(content.as_bytes())
        .and_then(|_| tmp.flush())
        .map_err(|e| ReconcileError::template(format!("failed to write temp file: {}", e)))?;
    Ok(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock;

    #[test]
    fn test_stack_template_without_ssh() {
        let body = render_stack_template(&mock::request()).unwrap();
        assert!(body.contains("Description: 'demo-node-group-stack'"));
        assert!(body.contains("Value: 'builder-1'"));
        assert!(body.contains("NodeInstanceRole:"));
        assert!(!body.contains("ClusterControlPlaneSecurityGroupIngress22"));
    }

    #[test]
    fn test_stack_template_with_ssh() {
        let req = NodeGroupRequest {
            enable_ssh: true,
            ..mock::request()
        };
        let body = render_stack_template(&req).unwrap();
        assert!(body.contains("ClusterControlPlaneSecurityGroupIngress22"));
        assert!(body.contains("FromPort: 22"));
    }

    #[test]
    fn test_stack_template_keeps_cfn_substitutions() {
        let body = render_stack_template(&mock::request()).unwrap();
        assert!(body.contains("${ClusterName}"));
        assert!(body.contains("${AWS::StackName}"));
    }

    #[test]
    fn test_auth_map_binds_role() {
        let doc = render_auth_map("arn:aws:iam::123:role/ng-NodeInstanceRole").unwrap();
        assert!(doc.contains("rolearn: arn:aws:iam::123:role/ng-NodeInstanceRole"));
        assert!(doc.contains("username: system:node:{{EC2PrivateDNSName}}"));
        assert!(doc.contains("system:bootstrappers"));
        assert!(doc.contains("name: aws-auth"));
    }

    #[test]
    fn test_auth_map_requires_role() {
        assert!(matches!(
            render_auth_map(""),
            Err(ReconcileError::Template(_))
        ));
    }

    #[test]
    fn test_write_temp_removed_on_drop() {
        let tmp = write_temp("ngctl-test-", "hello").unwrap();
        let path = tmp.path().to_path_buf();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
        drop(tmp);
        assert!(!path.exists());
    }
}
