//! Workflow trigger manager.
//!
//! Projects `Trigger` (or `Process`-wrapped) resources into workflow
//! executions: updates store triggers by resource id, drops cancel or
//! terminate the derived workflow, and every batch re-invokes the remaining
//! triggers so converged state keeps the workflows running.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};
use uuid::Uuid;

use lattice_proto::types::{trigger, Process, Resource, Trigger};
use lattice_proto::AnyPayload;

use crate::error::{LatticeError, Result};
use crate::resource::WORKFLOW_ID_NAMESPACE;
use crate::sync::EventHandler;

/// How a workflow id collision with a running execution is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdReusePolicy {
    AllowDuplicate,
    AllowDuplicateFailedOnly,
    RejectDuplicate,
    TerminateIfRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
    Canceled,
    Terminated,
}

#[derive(Debug, Clone)]
pub struct WorkflowDescription {
    pub workflow_id: String,
    pub status: WorkflowStatus,
}

#[derive(Debug, Clone)]
pub struct WorkflowRun {
    pub workflow_id: String,
    pub run_id: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryPolicy {
    pub initial_interval: Option<Duration>,
    pub maximum_interval: Option<Duration>,
    pub maximum_attempts: i32,
    pub non_retryable_errors: Vec<String>,
}

/// Options for one workflow start, derived from a trigger.
#[derive(Debug, Clone)]
pub struct StartWorkflowOptions {
    pub id: String,
    pub task_queue: String,
    pub cron_schedule: Option<String>,
    pub id_reuse_policy: IdReusePolicy,
    pub execution_timeout: Option<Duration>,
    pub run_timeout: Option<Duration>,
    pub task_timeout: Option<Duration>,
    pub retry_policy: Option<RetryPolicy>,
}

/// The workflow engine surface the manager depends on. `describe` fails with
/// `NotFound` for unknown workflow ids.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorkflowClient: Send + Sync {
    async fn execute(
        &self,
        options: StartWorkflowOptions,
        workflow_name: String,
        arguments: Vec<prost_types::Value>,
    ) -> Result<WorkflowRun>;

    async fn describe(&self, workflow_id: String) -> Result<WorkflowDescription>;

    async fn cancel(&self, workflow_id: String) -> Result<()>;

    async fn terminate(&self, workflow_id: String, reason: String) -> Result<()>;
}

fn proto_duration(value: Option<prost_types::Duration>) -> Option<Duration> {
    let value = value?;
    if value.seconds <= 0 && value.nanos <= 0 {
        return None;
    }
    Some(Duration::new(value.seconds.max(0) as u64, value.nanos.max(0) as u32))
}

/// Derives the workflow id for a trigger from its id-suffix specification.
pub fn workflow_id_from_trigger(trigger: &Trigger) -> Result<String> {
    match trigger.id_suffix.as_ref() {
        Some(trigger::IdSuffix::ExactIdSuffix(suffix)) => {
            Ok(format!("{}{}", trigger.id_prefix, suffix))
        }
        Some(trigger::IdSuffix::IdSuffixBuilder(builder)) => {
            match trigger::IdBuilder::try_from(*builder)
                .unwrap_or(trigger::IdBuilder::Undefined)
            {
                trigger::IdBuilder::OnlyPrefix => Ok(trigger.id_prefix.clone()),
                trigger::IdBuilder::Random => {
                    Ok(format!("{}{}", trigger.id_prefix, Uuid::new_v4()))
                }
                trigger::IdBuilder::Unique => {
                    let unique =
                        Uuid::new_v5(&WORKFLOW_ID_NAMESPACE, trigger.id_prefix.as_bytes());
                    Ok(format!("{}{}", trigger.id_prefix, unique))
                }
                trigger::IdBuilder::Undefined => {
                    Err(LatticeError::InvalidArgument("invalid ID suffix".to_string()))
                }
            }
        }
        None => Err(LatticeError::InvalidArgument("invalid ID suffix".to_string())),
    }
}

/// Builds start options from a trigger: derived id, reuse policy default
/// `ALLOW_DUPLICATE_FAILED_ONLY`, cron schedule, timeouts and retry policy.
pub fn start_options_from_trigger(trigger: &Trigger) -> Result<StartWorkflowOptions> {
    let id = workflow_id_from_trigger(trigger)?;

    let retry_policy = trigger.retry_policy.as_ref().map(|policy| RetryPolicy {
        initial_interval: proto_duration(policy.initial_interval),
        maximum_interval: proto_duration(policy.maximum_backoff),
        maximum_attempts: policy.maximum_attempts,
        non_retryable_errors: policy.non_retryable_errors.clone(),
    });

    Ok(StartWorkflowOptions {
        id,
        task_queue: trigger.task_queue.clone(),
        cron_schedule: (!trigger.cron_schedule.is_empty()).then(|| trigger.cron_schedule.clone()),
        id_reuse_policy: IdReusePolicy::AllowDuplicateFailedOnly,
        execution_timeout: proto_duration(trigger.execution_timeout),
        run_timeout: proto_duration(trigger.run_timeout),
        task_timeout: proto_duration(trigger.task_timeout),
        retry_policy,
    })
}

pub struct TriggerManager<C> {
    client: C,
    task_queue: String,
    triggers: HashMap<String, Trigger>,
}

impl<C: WorkflowClient> TriggerManager<C> {
    pub fn new(client: C, task_queue: String) -> Self {
        Self {
            client,
            task_queue,
            triggers: HashMap::new(),
        }
    }

    pub fn trigger_count(&self) -> usize {
        self.triggers.len()
    }

    fn decode_trigger(resource: &Resource) -> Option<Trigger> {
        let spec = resource.spec.as_ref()?;

        if spec.type_url == Trigger::TYPE_URL {
            match Trigger::from_any(spec) {
                Ok(trigger) => return Some(trigger),
                Err(err) => {
                    warn!(id = %resource.id, error = %err, "skipping undecodable trigger");
                    return None;
                }
            }
        }

        if spec.type_url == Process::TYPE_URL {
            match Process::from_any(spec) {
                Ok(process) => return process.trigger,
                Err(err) => {
                    warn!(id = %resource.id, error = %err, "skipping undecodable process");
                    return None;
                }
            }
        }

        None
    }

    /// Starts (or skips) the workflow for one trigger, honoring its
    /// if-running action.
    pub async fn trigger(&self, trigger: &Trigger) -> Result<()> {
        let mut options = start_options_from_trigger(trigger)?;
        if options.task_queue.is_empty() {
            options.task_queue = self.task_queue.clone();
        }

        match self.client.describe(options.id.clone()).await {
            Err(LatticeError::NotFound(_)) => {}
            Err(err) => return Err(err),
            Ok(description) => {
                let action = match trigger.if_running.as_ref() {
                    Some(trigger::IfRunning::IfRunningAction(action)) => {
                        trigger::IfRunningAction::try_from(*action)
                            .unwrap_or(trigger::IfRunningAction::Undefined)
                    }
                    None => trigger::IfRunningAction::Undefined,
                };

                match action {
                    trigger::IfRunningAction::Abort => {
                        if description.status == WorkflowStatus::Running {
                            info!(
                                workflow_id = %options.id,
                                workflow_name = %trigger.name,
                                "workflow start aborted: an execution is already running"
                            );
                            return Ok(());
                        }
                        options.id_reuse_policy = IdReusePolicy::RejectDuplicate;
                    }
                    trigger::IfRunningAction::Overlap => {
                        options.id_reuse_policy = IdReusePolicy::TerminateIfRunning;
                    }
                    trigger::IfRunningAction::Undefined => {
                        return Err(LatticeError::InvalidArgument(
                            "invalid if running specification".to_string(),
                        ));
                    }
                }
            }
        }

        let arguments = trigger
            .arguments
            .as_ref()
            .map(|list| list.values.clone())
            .unwrap_or_default();

        let run = self
            .client
            .execute(options, trigger.name.clone(), arguments)
            .await?;

        info!(
            workflow_id = %run.workflow_id,
            run_id = %run.run_id,
            workflow_name = %trigger.name,
            "workflow execution started"
        );

        Ok(())
    }

    async fn handle_drop(&self, trigger: &Trigger) -> Result<()> {
        let workflow_id = workflow_id_from_trigger(trigger)?;

        let action = match trigger.on_drop.as_ref() {
            Some(trigger::OnDrop::OnDropAction(action)) => {
                trigger::OnDropAction::try_from(*action)
                    .unwrap_or(trigger::OnDropAction::Undefined)
            }
            None => trigger::OnDropAction::Undefined,
        };

        let result = match action {
            trigger::OnDropAction::Undefined | trigger::OnDropAction::DoNothing => return Ok(()),
            trigger::OnDropAction::Cancel => self.client.cancel(workflow_id).await,
            trigger::OnDropAction::Terminate => {
                self.client
                    .terminate(workflow_id, "enforced by workflow trigger".to_string())
                    .await
            }
        };

        match result {
            // A workflow that no longer exists already satisfies the intent.
            Err(LatticeError::NotFound(_)) | Ok(()) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl<C: WorkflowClient> EventHandler for TriggerManager<C> {
    async fn before_batch(&mut self) -> Result<()> {
        Ok(())
    }

    async fn on_updated(&mut self, resource: Resource) -> Result<()> {
        if let Some(trigger) = Self::decode_trigger(&resource) {
            self.triggers.insert(resource.id, trigger);
        }
        Ok(())
    }

    async fn on_dropped(&mut self, resource: Resource) -> Result<()> {
        let Some(trigger) = self.triggers.remove(&resource.id) else {
            return Ok(());
        };
        self.handle_drop(&trigger).await
    }

    async fn after_batch(&mut self) -> Result<()> {
        for (resource_id, trigger) in &self.triggers {
            if let Err(err) = self.trigger(trigger).await {
                error!(resource_id, error = %err, "trigger error");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::*;

    fn base_trigger() -> Trigger {
        Trigger {
            name: "sync".to_string(),
            task_queue: "queue".to_string(),
            id_prefix: "sync/".to_string(),
            id_suffix: Some(trigger::IdSuffix::IdSuffixBuilder(
                trigger::IdBuilder::Unique as i32,
            )),
            if_running: Some(trigger::IfRunning::IfRunningAction(
                trigger::IfRunningAction::Abort as i32,
            )),
            ..Default::default()
        }
    }

    fn trigger_resource(id: &str, trigger: &Trigger) -> Resource {
        Resource {
            namespace: "default".to_string(),
            id: id.to_string(),
            name: trigger.name.clone(),
            spec: Some(trigger.to_any()),
            version: None,
        }
    }

    #[test]
    fn unique_ids_are_deterministic() {
        let trigger = base_trigger();

        let first = workflow_id_from_trigger(&trigger).unwrap();
        let second = workflow_id_from_trigger(&trigger).unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("sync/"));

        // Knowing the namespace pins the value across processes.
        let expected = format!(
            "sync/{}",
            Uuid::new_v5(&WORKFLOW_ID_NAMESPACE, b"sync/")
        );
        assert_eq!(first, expected);
    }

    #[test]
    fn id_suffix_variants() {
        let mut trigger = base_trigger();

        trigger.id_suffix = Some(trigger::IdSuffix::ExactIdSuffix("main".to_string()));
        assert_eq!(workflow_id_from_trigger(&trigger).unwrap(), "sync/main");

        trigger.id_suffix = Some(trigger::IdSuffix::IdSuffixBuilder(
            trigger::IdBuilder::OnlyPrefix as i32,
        ));
        assert_eq!(workflow_id_from_trigger(&trigger).unwrap(), "sync/");

        trigger.id_suffix = Some(trigger::IdSuffix::IdSuffixBuilder(
            trigger::IdBuilder::Random as i32,
        ));
        let first = workflow_id_from_trigger(&trigger).unwrap();
        let second = workflow_id_from_trigger(&trigger).unwrap();
        assert_ne!(first, second);

        trigger.id_suffix = None;
        assert!(workflow_id_from_trigger(&trigger).is_err());
    }

    #[tokio::test]
    async fn abort_skips_running_workflows() {
        let mut client = MockWorkflowClient::new();
        client.expect_describe().returning(|workflow_id| {
            Ok(WorkflowDescription {
                workflow_id,
                status: WorkflowStatus::Running,
            })
        });
        client.expect_execute().never();

        let manager = TriggerManager::new(client, "queue".to_string());
        manager.trigger(&base_trigger()).await.unwrap();
    }

    #[tokio::test]
    async fn abort_with_finished_workflow_rejects_duplicates() {
        let mut client = MockWorkflowClient::new();
        client.expect_describe().returning(|workflow_id| {
            Ok(WorkflowDescription {
                workflow_id,
                status: WorkflowStatus::Completed,
            })
        });
        client
            .expect_execute()
            .withf(|options, name, _| {
                options.id_reuse_policy == IdReusePolicy::RejectDuplicate && name == "sync"
            })
            .returning(|options, _, _| {
                Ok(WorkflowRun {
                    workflow_id: options.id,
                    run_id: "run-1".to_string(),
                })
            });

        let manager = TriggerManager::new(client, "queue".to_string());
        manager.trigger(&base_trigger()).await.unwrap();
    }

    #[tokio::test]
    async fn overlap_terminates_running_workflows() {
        let mut client = MockWorkflowClient::new();
        client.expect_describe().returning(|workflow_id| {
            Ok(WorkflowDescription {
                workflow_id,
                status: WorkflowStatus::Running,
            })
        });
        client
            .expect_execute()
            .withf(|options, _, _| {
                options.id_reuse_policy == IdReusePolicy::TerminateIfRunning
            })
            .returning(|options, _, _| {
                Ok(WorkflowRun {
                    workflow_id: options.id,
                    run_id: "run-1".to_string(),
                })
            });

        let mut trigger = base_trigger();
        trigger.if_running = Some(trigger::IfRunning::IfRunningAction(
            trigger::IfRunningAction::Overlap as i32,
        ));

        let manager = TriggerManager::new(client, "queue".to_string());
        manager.trigger(&trigger).await.unwrap();
    }

    #[tokio::test]
    async fn fresh_workflows_use_failed_only_reuse() {
        let mut client = MockWorkflowClient::new();
        client
            .expect_describe()
            .returning(|id| Err(LatticeError::NotFound(id)));
        client
            .expect_execute()
            .withf(|options, _, _| {
                options.id_reuse_policy == IdReusePolicy::AllowDuplicateFailedOnly
                    && options.task_queue == "queue"
            })
            .returning(|options, _, _| {
                Ok(WorkflowRun {
                    workflow_id: options.id,
                    run_id: "run-1".to_string(),
                })
            });

        let manager = TriggerManager::new(client, "fallback".to_string());
        manager.trigger(&base_trigger()).await.unwrap();
    }

    #[tokio::test]
    async fn dropping_a_trigger_cancels_its_workflow() {
        let expected_id = workflow_id_from_trigger(&base_trigger()).unwrap();

        let mut client = MockWorkflowClient::new();
        client
            .expect_cancel()
            .with(eq(expected_id))
            .times(1)
            .returning(|_| Ok(()));

        let mut trigger = base_trigger();
        trigger.on_drop = Some(trigger::OnDrop::OnDropAction(
            trigger::OnDropAction::Cancel as i32,
        ));

        let mut manager = TriggerManager::new(client, "queue".to_string());
        manager.before_batch().await.unwrap();
        manager
            .on_updated(trigger_resource("t-1", &trigger))
            .await
            .unwrap();

        manager
            .on_dropped(Resource {
                id: "t-1".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(manager.trigger_count(), 0);
    }

    #[tokio::test]
    async fn cancel_tolerates_missing_workflows() {
        let mut client = MockWorkflowClient::new();
        client
            .expect_cancel()
            .returning(|id| Err(LatticeError::NotFound(id)));

        let mut trigger = base_trigger();
        trigger.on_drop = Some(trigger::OnDrop::OnDropAction(
            trigger::OnDropAction::Cancel as i32,
        ));

        let mut manager = TriggerManager::new(client, "queue".to_string());
        manager
            .on_updated(trigger_resource("t-1", &trigger))
            .await
            .unwrap();
        manager
            .on_dropped(Resource {
                id: "t-1".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn after_batch_retriggers_remaining_triggers() {
        let mut client = MockWorkflowClient::new();
        client
            .expect_describe()
            .returning(|id| Err(LatticeError::NotFound(id)));
        client
            .expect_execute()
            .times(2)
            .returning(|options, _, _| {
                Ok(WorkflowRun {
                    workflow_id: options.id,
                    run_id: "run".to_string(),
                })
            });

        let mut manager = TriggerManager::new(client, "queue".to_string());
        let mut second = base_trigger();
        second.id_prefix = "other/".to_string();

        manager.before_batch().await.unwrap();
        manager
            .on_updated(trigger_resource("t-1", &base_trigger()))
            .await
            .unwrap();
        manager
            .on_updated(trigger_resource("t-2", &second))
            .await
            .unwrap();
        manager.after_batch().await.unwrap();
    }

    #[tokio::test]
    async fn process_wrapped_triggers_are_stored() {
        let client = MockWorkflowClient::new();
        let mut manager = TriggerManager::new(client, "queue".to_string());

        let process = Process {
            name: "proc".to_string(),
            trigger: Some(base_trigger()),
        };
        manager
            .on_updated(Resource {
                id: "p-1".to_string(),
                spec: Some(process.to_any()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(manager.trigger_count(), 1);
    }
}
