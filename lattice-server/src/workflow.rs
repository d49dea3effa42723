//! HTTP bridge to the workflow engine.
//!
//! The engine itself is an external collaborator; this client speaks to a
//! thin REST facade in front of it: execute, describe, cancel, terminate.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use lattice_core::error::{LatticeError, Result};
use lattice_core::worker::{
    IdReusePolicy, StartWorkflowOptions, WorkflowClient, WorkflowDescription, WorkflowRun,
    WorkflowStatus,
};

pub struct HttpWorkflowClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpWorkflowClient {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.endpoint)
    }
}

#[derive(Serialize)]
struct ExecuteRequest {
    workflow_id: String,
    workflow_name: String,
    task_queue: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cron_schedule: Option<String>,
    id_reuse_policy: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    execution_timeout_ms: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_timeout_ms: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_timeout_ms: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_policy: Option<RetryPolicyBody>,
    arguments: Vec<serde_json::Value>,
}

#[derive(Serialize)]
struct RetryPolicyBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    initial_interval_ms: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    maximum_interval_ms: Option<u128>,
    maximum_attempts: i32,
    non_retryable_errors: Vec<String>,
}

#[derive(Deserialize)]
struct ExecuteResponse {
    workflow_id: String,
    run_id: String,
}

#[derive(Deserialize)]
struct DescribeResponse {
    workflow_id: String,
    status: String,
}

fn reuse_policy_name(policy: IdReusePolicy) -> &'static str {
    match policy {
        IdReusePolicy::AllowDuplicate => "ALLOW_DUPLICATE",
        IdReusePolicy::AllowDuplicateFailedOnly => "ALLOW_DUPLICATE_FAILED_ONLY",
        IdReusePolicy::RejectDuplicate => "REJECT_DUPLICATE",
        IdReusePolicy::TerminateIfRunning => "TERMINATE_IF_RUNNING",
    }
}

fn parse_status(raw: &str) -> WorkflowStatus {
    match raw {
        "RUNNING" => WorkflowStatus::Running,
        "COMPLETED" => WorkflowStatus::Completed,
        "FAILED" => WorkflowStatus::Failed,
        "CANCELED" => WorkflowStatus::Canceled,
        _ => WorkflowStatus::Terminated,
    }
}

/// Structured workflow arguments travel as JSON.
fn value_to_json(value: &prost_types::Value) -> serde_json::Value {
    use prost_types::value::Kind;

    match value.kind.as_ref() {
        None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
        Some(Kind::NumberValue(number)) => serde_json::Number::from_f64(*number)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Some(Kind::StringValue(string)) => serde_json::Value::String(string.clone()),
        Some(Kind::BoolValue(boolean)) => serde_json::Value::Bool(*boolean),
        Some(Kind::StructValue(structure)) => serde_json::Value::Object(
            structure
                .fields
                .iter()
                .map(|(key, value)| (key.clone(), value_to_json(value)))
                .collect(),
        ),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.iter().map(value_to_json).collect())
        }
    }
}

fn transport(err: reqwest::Error) -> LatticeError {
    LatticeError::Transport(format!("workflow engine: {err}"))
}

#[async_trait]
impl WorkflowClient for HttpWorkflowClient {
    async fn execute(
        &self,
        options: StartWorkflowOptions,
        workflow_name: String,
        arguments: Vec<prost_types::Value>,
    ) -> Result<WorkflowRun> {
        let body = ExecuteRequest {
            workflow_id: options.id,
            workflow_name,
            task_queue: options.task_queue,
            cron_schedule: options.cron_schedule,
            id_reuse_policy: reuse_policy_name(options.id_reuse_policy),
            execution_timeout_ms: options.execution_timeout.map(|d| d.as_millis()),
            run_timeout_ms: options.run_timeout.map(|d| d.as_millis()),
            task_timeout_ms: options.task_timeout.map(|d| d.as_millis()),
            retry_policy: options.retry_policy.map(|policy| RetryPolicyBody {
                initial_interval_ms: policy.initial_interval.map(|d| d.as_millis()),
                maximum_interval_ms: policy.maximum_interval.map(|d| d.as_millis()),
                maximum_attempts: policy.maximum_attempts,
                non_retryable_errors: policy.non_retryable_errors,
            }),
            arguments: arguments.iter().map(value_to_json).collect(),
        };

        debug!(workflow_id = %body.workflow_id, "executing workflow");

        let response = self
            .client
            .post(self.url("/workflows/execute"))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(LatticeError::Internal(format!(
                "workflow execute answered {}",
                response.status()
            )));
        }

        let reply: ExecuteResponse = response.json().await.map_err(transport)?;
        Ok(WorkflowRun {
            workflow_id: reply.workflow_id,
            run_id: reply.run_id,
        })
    }

    async fn describe(&self, workflow_id: String) -> Result<WorkflowDescription> {
        let response = self
            .client
            .get(self.url("/workflows/describe"))
            .query(&HashMap::from([("workflow_id", workflow_id.as_str())]))
            .send()
            .await
            .map_err(transport)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(LatticeError::NotFound(workflow_id));
        }
        if !response.status().is_success() {
            return Err(LatticeError::Internal(format!(
                "workflow describe answered {}",
                response.status()
            )));
        }

        let reply: DescribeResponse = response.json().await.map_err(transport)?;
        Ok(WorkflowDescription {
            workflow_id: reply.workflow_id,
            status: parse_status(&reply.status),
        })
    }

    async fn cancel(&self, workflow_id: String) -> Result<()> {
        let response = self
            .client
            .post(self.url("/workflows/cancel"))
            .json(&HashMap::from([("workflow_id", workflow_id.as_str())]))
            .send()
            .await
            .map_err(transport)?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(LatticeError::NotFound(workflow_id)),
            status if status.is_success() => Ok(()),
            status => Err(LatticeError::Internal(format!(
                "workflow cancel answered {status}"
            ))),
        }
    }

    async fn terminate(&self, workflow_id: String, reason: String) -> Result<()> {
        let response = self
            .client
            .post(self.url("/workflows/terminate"))
            .json(&HashMap::from([
                ("workflow_id", workflow_id.as_str()),
                ("reason", reason.as_str()),
            ]))
            .send()
            .await
            .map_err(transport)?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(LatticeError::NotFound(workflow_id)),
            status if status.is_success() => Ok(()),
            status => Err(LatticeError::Internal(format!(
                "workflow terminate answered {status}"
            ))),
        }
    }
}
