//! Scripted fakes for the external seams, used by unit tests.
//!
//! Each fake keeps its script and call log behind an `Arc`, so a test can
//! hand one clone to the code under test and inspect another afterwards.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ngctl_core::request::NodeGroupRequest;
use ngctl_core::stack::{NODE_INSTANCE_ROLE_OUTPUT, StackState};

use crate::shell::{CommandError, CommandOutput, CommandRunner};
use crate::stack::client::{CreateStackInput, StackClient, StackError};

pub const ROLE_ARN: &str = "arn:aws:iam::123456789012:role/demo-ng-NodeInstanceRole";

pub fn request() -> NodeGroupRequest {
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

/// Describe response with a raw status and no outputs.
pub fn stack(raw: &str) -> Result<StackState, StackError> {
    Ok(StackState::from_raw(raw, BTreeMap::new()))
}

/// Describe response that publishes the node instance role.
pub fn stack_with_role(raw: &str, role: &str) -> Result<StackState, StackError> {
    let mut outputs = BTreeMap::new();
    outputs.insert(NODE_INSTANCE_ROLE_OUTPUT.to_string(), role.to_string());
    Ok(StackState::from_raw(raw, outputs))
}

/// `get nodes -o json` body with `ready` of `total` nodes Ready.
pub fn node_list(ready: usize, total: usize) -> String {
    let items: Vec<String> = (0..total)
        .map(|i| {
            let status = if i < ready { "True" } else { "False" };
            format!(
                r#"{{"metadata":{{"name":"ip-10-0-0-{}"}},"status":{{"conditions":[{{"type":"Ready","status":"{}"}}]}}}}"#,
                i, status
            )
        })
        .collect();
    format!(r#"{{"items":[{}]}}"#, items.join(","))
}

// ---------------------------------------------------------------------------
// CommandRunner
// ---------------------------------------------------------------------------

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
    /// Content of the `--filename=` argument at call time, if any.
    pub file_content: Option<String>,
}

type RunnerResult = Result<CommandOutput, CommandError>;

#[derive(Default)]
struct RunnerScript {
    responses: VecDeque<RunnerResult>,
    fallback: Option<CommandOutput>,
}

/// Replays queued responses in order, then the fallback (or a failure).
#[derive(Clone, Default)]
pub struct ScriptedRunner {
    script: Arc<Mutex<RunnerScript>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(self, output: CommandOutput) -> Self {
        self.script.lock().unwrap_or_else(|e| e.into_inner()).responses.push_back(Ok(output));
        self
    }

    pub fn push_err(self, err: CommandError) -> Self {
        self.script.lock().unwrap_or_else(|e| e.into_inner()).responses.push_back(Err(err));
        self
    }

    /// Response used once the queue is empty.
    pub fn fallback(self, output: CommandOutput) -> Self {
        self.script.lock().unwrap_or_else(|e| e.into_inner()).fallback = Some(output);
        self
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<RecordedCall>>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError> {
        let file_content = args
            .iter()
            .find_map(|a| a.strip_prefix("--filename="))
            .and_then(|path| std::fs::read_to_string(path).ok());
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(RecordedCall {
            program: program.to_string(),
            args: args.to_vec(),
            timeout,
            file_content,
        });

        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        match script.responses.pop_front() {
            Some(result) => result,
            None => Ok(script
                .fallback
                .clone()
                .unwrap_or_else(|| CommandOutput::failed(1, "no scripted response"))),
        }
    }
}

// ---------------------------------------------------------------------------
// StackClient
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StackScript {
    create: VecDeque<Result<(), StackError>>,
    describe: VecDeque<Result<StackState, StackError>>,
    describe_fallback: Option<Result<StackState, StackError>>,
    delete: VecDeque<Result<(), StackError>>,
    created: Vec<CreateStackInput>,
    describe_calls: u32,
    delete_calls: u32,
}

/// Scripted infrastructure API. Unscripted create/delete calls succeed;
/// unscripted describes return the fallback or `CREATE_IN_PROGRESS`.
#[derive(Clone, Default)]
pub struct ScriptedStackClient {
    script: Arc<Mutex<StackScript>>,
}

impl ScriptedStackClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_result(self, result: Result<(), StackError>) -> Self {
        self.script.lock().unwrap_or_else(|e| e.into_inner()).create.push_back(result);
        self
    }

    pub fn describe(self, result: Result<StackState, StackError>) -> Self {
        self.script.lock().unwrap_or_else(|e| e.into_inner()).describe.push_back(result);
        self
    }

    pub fn describe_fallback(self, result: Result<StackState, StackError>) -> Self {
        self.script.lock().unwrap_or_else(|e| e.into_inner()).describe_fallback = Some(result);
        self
    }

    pub fn delete_result(self, result: Result<(), StackError>) -> Self {
        self.script.lock().unwrap_or_else(|e| e.into_inner()).delete.push_back(result);
        self
    }

    pub fn created_inputs(&self) -> Vec<CreateStackInput> {
        self.script.lock().unwrap_or_else(|e| e.into_inner()).created.clone()
    }

    pub fn describe_calls(&self) -> u32 {
        self.script.lock().unwrap_or_else(|e| e.into_inner()).describe_calls
    }

    pub fn delete_calls(&self) -> u32 {
        self.script.lock().unwrap_or_else(|e| e.into_inner()).delete_calls
    }
}

#[async_trait]
impl StackClient for ScriptedStackClient {
    async fn create_stack(&self, input: &CreateStackInput) -> Result<(), StackError> {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        script.created.push(input.clone());
        script.create.pop_front().unwrap_or(Ok(()))
    }

    async fn describe_stack(&self, _name: &str) -> Result<StackState, StackError> {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        script.describe_calls += 1;
        match script.describe.pop_front() {
            Some(result) => result,
            None => script
                .describe_fallback
                .clone()
                .unwrap_or_else(|| stack("CREATE_IN_PROGRESS")),
        }
    }

    async fn delete_stack(&self, _name: &str) -> Result<(), StackError> {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        script.delete_calls += 1;
        script.delete.pop_front().unwrap_or(Ok(()))
    }
}
