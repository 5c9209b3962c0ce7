use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("{program} timed out after {}s", .timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },
}

/// Captured result of an external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: &str) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: &str) -> Self {
        Self {
            success: false,
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    /// stdout followed by stderr, the way a terminal would show them.
    pub fn combined(&self) -> String {
        match (self.stdout.trim(), self.stderr.trim()) {
            (out, "") => out.to_string(),
            ("", err) => err.to_string(),
            (out, err) => format!("{}\n{}", out, err),
        }
    }

    /// Short description of a failure for status fields and errors.
    pub fn failure_text(&self) -> String {
        let exit = match self.code {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        };
        let output = self.combined();
        if output.is_empty() {
            exit
        } else {
            format!("{}: {}", exit, output)
        }
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }
}

/// Executes external commands (kubectl, aws). Swapped for a scripted fake
/// in tests.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, killing it if it outlives `timeout`.
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError>;
}

/// Runs commands on the local host.
#[derive(Debug, Default, Clone)]
pub struct HostRunner;

#[async_trait]
impl CommandRunner for HostRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError> {
        debug!(program, args = %args.join(" "), "running command");

        let child = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(timeout, child).await {
            Ok(Ok(output)) => Ok(CommandOutput::from(output)),
            Ok(Err(source)) => Err(CommandError::Spawn {
                program: program.to_string(),
                source,
            }),
            Err(_) => Err(CommandError::TimedOut {
                program: program.to_string(),
                timeout,
            }),
        }
    }
}

const HOSTNAME_TIMEOUT: Duration = Duration::from_secs(5);

/// Name of this machine, for the stack's provenance tag: `HOSTNAME` when
/// set, else the output of `hostname`, else `"unknown"`.
pub async fn local_hostname(runner: &dyn CommandRunner) -> String {
    resolve_hostname(std::env::var("HOSTNAME").ok(), runner).await
}

async fn resolve_hostname(env: Option<String>, runner: &dyn CommandRunner) -> String {
    if let Some(name) = env.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    match runner.run("hostname", &[], HOSTNAME_TIMEOUT).await {
        Ok(out) if out.success && !out.stdout.trim().is_empty() => out.stdout.trim().to_string(),
        Ok(out) => {
            debug!(output = %out.failure_text(), "hostname lookup failed");
            "unknown".to_string()
        }
        Err(e) => {
            debug!(error = %e, "hostname lookup failed");
            "unknown".to_string()
        }
    }
}
