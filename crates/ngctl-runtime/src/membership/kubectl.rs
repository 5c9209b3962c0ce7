use std::path::Path;
use std::time::Duration;

use ngctl_core::node::{self, NodeRecord};
use thiserror::Error;
use tracing::debug;

use crate::shell::{CommandOutput, CommandRunner};

/// Marker kubectl prints when invoked with a flag it does not know.
const UNKNOWN_FLAG: &str = "unknown flag";

#[derive(Debug, Error)]
pub enum KubectlError {
    /// The installed kubectl does not understand our invocation. Retrying
    /// cannot help.
    #[error("kubectl does not support the invocation: {0}")]
    UnsupportedFlag(String),
    #[error("{0}")]
    Failed(String),
    #[error("failed to parse node list: {0}")]
    Parse(String),
}

/// Thin adapter over the `kubectl` binary.
pub struct Kubectl<R: CommandRunner> {
    runner: R,
    program: String,
    apply_timeout: Duration,
    get_nodes_timeout: Duration,
}

impl<R: CommandRunner> Kubectl<R> {
    pub fn new(runner: R, program: &str, apply_timeout: Duration, get_nodes_timeout: Duration) -> Self {
        Self {
            runner,
            program: program.to_string(),
            apply_timeout,
            get_nodes_timeout,
        }
    }

    /// `kubectl --kubeconfig=<kubeconfig> apply --filename=<file>`
    pub async fn apply(&self, kubeconfig: &Path, file: &Path) -> Result<String, KubectlError> {
        let args = vec![
            kubeconfig_arg(kubeconfig),
            "apply".to_string(),
            format!("--filename={}", file.display()),
        ];
        let output = self.run(&args, self.apply_timeout).await?;
        Ok(output.combined())
    }

    /// `kubectl --kubeconfig=<kubeconfig> get nodes -o json`
    pub async fn get_nodes(&self, kubeconfig: &Path) -> Result<Vec<NodeRecord>, KubectlError> {
        let args = vec![
            kubeconfig_arg(kubeconfig),
            "get".to_string(),
            "nodes".to_string(),
            "-o".to_string(),
            "json".to_string(),
        ];
        let output = self.run(&args, self.get_nodes_timeout).await?;
        node::parse_node_list(output.stdout.as_bytes()).map_err(|e| KubectlError::Parse(e.to_string()))
    }

    async fn run(&self, args: &[String], timeout: Duration) -> Result<CommandOutput, KubectlError> {
        let output = self
            .runner
            .run(&self.program, args, timeout)
            .await
            .map_err(|e| KubectlError::Failed(e.to_string()))?;
        if output.success {
            debug!(args = %args.join(" "), "kubectl succeeded");
            return Ok(output);
        }
        let text = output.failure_text();
        if text.contains(UNKNOWN_FLAG) {
            Err(KubectlError::UnsupportedFlag(output.combined()))
        } else {
            Err(KubectlError::Failed(text))
        }
    }
}

fn kubeconfig_arg(path: &Path) -> String {
    format!("--kubeconfig={}", path.display())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{self, ScriptedRunner};
    use crate::shell::CommandError;

    fn kubectl(runner: ScriptedRunner) -> Kubectl<ScriptedRunner> {
        Kubectl::new(runner, "kubectl", Duration::from_secs(10), Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_apply_args_and_timeout() {
        let runner = ScriptedRunner::new().push(CommandOutput::ok("configmap/aws-auth created"));
        let calls = runner.calls();
        let out = kubectl(runner)
            .apply(Path::new("/tmp/kubeconfig"), Path::new("/tmp/auth.yaml"))
            .await
            .unwrap();
        assert_eq!(out, "configmap/aws-auth created");

        let calls = calls.lock().unwrap();
        assert_eq!(
            calls[0].args,
            vec!["--kubeconfig=/tmp/kubeconfig", "apply", "--filename=/tmp/auth.yaml"]
        );
        assert_eq!(calls[0].timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_get_nodes_parses_records() {
        let runner = ScriptedRunner::new().push(CommandOutput::ok(&mock::node_list(2, 3)));
        let calls = runner.calls();
        let nodes = kubectl(runner)
            .get_nodes(Path::new("/tmp/kubeconfig"))
            .await
            .unwrap();
        assert_eq!(nodes.len(), 3);
        assert_eq!(node::count_ready(&nodes), 2);

        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].args[1..], ["get", "nodes", "-o", "json"]);
        assert_eq!(calls[0].timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_unknown_flag_is_unsupported() {
        let runner = ScriptedRunner::new().push(CommandOutput::failed(1, "Error: unknown flag: --foo"));
        let err = kubectl(runner)
            .get_nodes(Path::new("/tmp/kubeconfig"))
            .await
            .unwrap_err();
        assert!(matches!(err, KubectlError::UnsupportedFlag(msg) if msg.contains("--foo")));
    }

    #[tokio::test]
    async fn test_other_failures_and_bad_output() {
        let runner = ScriptedRunner::new()
            .push(CommandOutput::failed(1, "Unable to connect to the server"))
            .push(CommandOutput::ok("not json"));
        let kubectl = kubectl(runner);
        let path = Path::new("/tmp/kubeconfig");
        assert!(matches!(
            kubectl.get_nodes(path).await,
            Err(KubectlError::Failed(msg)) if msg.contains("Unable to connect")
        ));
        assert!(matches!(kubectl.get_nodes(path).await, Err(KubectlError::Parse(_))));
    }

    #[tokio::test]
    async fn test_runner_timeout_is_failure() {
        let runner = ScriptedRunner::new().push_err(CommandError::TimedOut {
            program: "kubectl".to_string(),
            timeout: Duration::from_secs(10),
        });
        let err = kubectl(runner)
            .apply(Path::new("/tmp/kubeconfig"), Path::new("/tmp/auth.yaml"))
            .await
            .unwrap_err();
        assert!(matches!(err, KubectlError::Failed(msg) if msg.contains("timed out after 10s")));
    }
}
