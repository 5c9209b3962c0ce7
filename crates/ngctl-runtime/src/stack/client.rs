//! Infrastructure-as-code API seam.
//!
//! `StackClient` is the capability the provisioner consumes. The production
//! adapter drives the `aws cloudformation` CLI; it is the only place that
//! inspects provider error text.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use ngctl_core::request::KeyValue;
use ngctl_core::stack::StackState;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::shell::{CommandOutput, CommandRunner};
use crate::templates;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StackError {
    /// The stack is gone (or never existed).
    #[error("stack {0:?} does not exist")]
    NotFound(String),
    /// Any other provider or transport failure.
    #[error("{0}")]
    Api(String),
}

/// Everything a create-stack call carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateStackInput {
    pub name: String,
    pub tags: Vec<KeyValue>,
    pub template_body: String,
    pub parameters: Vec<KeyValue>,
    pub capabilities: Vec<String>,
}

#[async_trait]
pub trait StackClient: Send + Sync {
    /// Submit a create; `Ok` means accepted, not completed.
    async fn create_stack(&self, input: &CreateStackInput) -> Result<(), StackError>;

    async fn describe_stack(&self, name: &str) -> Result<StackState, StackError>;

    /// Submit a delete; `Ok` means accepted.
    async fn delete_stack(&self, name: &str) -> Result<(), StackError>;
}

/// `StackClient` backed by the `aws` CLI.
pub struct AwsCliStackClient<R: CommandRunner> {
    runner: R,
    aws: String,
    region: Option<String>,
    call_timeout: Duration,
}

impl<R: CommandRunner> AwsCliStackClient<R> {
    pub fn new(runner: R, aws: &str, region: Option<String>, call_timeout: Duration) -> Self {
        Self {
            runner,
            aws: aws.to_string(),
            region,
            call_timeout,
        }
    }

    fn base_args(&self, action: &str, name: &str) -> Vec<String> {
        let mut args = vec![
            "cloudformation".to_string(),
            action.to_string(),
            "--stack-name".to_string(),
            name.to_string(),
            "--output".to_string(),
            "json".to_string(),
        ];
        if let Some(region) = &self.region {
            args.push("--region".to_string());
            args.push(region.clone());
        }
        args
    }

    async fn call(&self, name: &str, args: Vec<String>) -> Result<CommandOutput, StackError> {
        let output = self
            .runner
            .run(&self.aws, &args, self.call_timeout)
            .await
            .map_err(|e| StackError::Api(e.to_string()))?;
        if output.success {
            Ok(output)
        } else {
            Err(classify_failure(name, &output.failure_text()))
        }
    }
}

/// Map CLI failure text onto the typed error.
pub fn classify_failure(name: &str, text: &str) -> StackError {
    if text.contains("does not exist") {
        StackError::NotFound(name.to_string())
    } else {
        StackError::Api(text.to_string())
    }
}

fn parameters_json(params: &[KeyValue]) -> String {
    let items: Vec<_> = params
        .iter()
        .map(|p| json!({"ParameterKey": p.key, "ParameterValue": p.value}))
        .collect();
    serde_json::Value::Array(items).to_string()
}

fn tags_json(tags: &[KeyValue]) -> String {
    let items: Vec<_> = tags
        .iter()
        .map(|t| json!({"Key": t.key, "Value": t.value}))
        .collect();
    serde_json::Value::Array(items).to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeStacksDoc {
    #[serde(default)]
    stacks: Vec<StackDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StackDoc {
    stack_status: String,
    #[serde(default)]
    outputs: Vec<OutputDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OutputDoc {
    output_key: String,
    #[serde(default)]
    output_value: String,
}

/// Parse `describe-stacks` JSON, which must describe exactly one stack.
pub fn parse_describe(name: &str, raw: &str) -> Result<StackState, StackError> {
    let doc: DescribeStacksDoc = serde_json::from_str(raw)
        .map_err(|e| StackError::Api(format!("failed to parse describe-stacks output: {}", e)))?;
    let mut stacks = doc.stacks;
    if stacks.len() != 1 {
        return Err(StackError::Api(format!(
            "{:?} expects 1 stack, got {}",
            name,
            stacks.len()
        )));
    }
    let stack = stacks.remove(0);
    let outputs: BTreeMap<String, String> = stack
        .outputs
        .into_iter()
        .map(|o| (o.output_key, o.output_value))
        .collect();
    Ok(StackState::from_raw(&stack.stack_status, outputs))
}

#[async_trait]
impl<R: CommandRunner> StackClient for AwsCliStackClient<R> {
    async fn create_stack(&self, input: &CreateStackInput) -> Result<(), StackError> {
        // The body can exceed argv limits, so hand it over as a file.
        let body = templates::write_temp("ngctl-stack-", &input.template_body)
            .map_err(|e| StackError::Api(e.to_string()))?;

        let mut args = self.base_args("create-stack", &input.name);
        args.push("--template-body".to_string());
        args.push(format!("file://{}", body.path().display()));
        args.push("--parameters".to_string());
        args.push(parameters_json(&input.parameters));
        args.push("--tags".to_string());
        args.push(tags_json(&input.tags));
        if !input.capabilities.is_empty() {
            args.push("--capabilities".to_string());
            args.extend(input.capabilities.iter().cloned());
        }

        self.call(&input.name, args).await.map(|_| ())
    }

    async fn describe_stack(&self, name: &str) -> Result<StackState, StackError> {
        let args = self.base_args("describe-stacks", name);
        let output = self.call(name, args).await?;
        parse_describe(name, &output.stdout)
    }

    async fn delete_stack(&self, name: &str) -> Result<(), StackError> {
        let args = self.base_args("delete-stack", name);
        self.call(name, args).await.map(|_| ())
    }
}
