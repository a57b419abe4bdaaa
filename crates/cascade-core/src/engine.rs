//! # Workflow Engine
//!
//! The single-threaded cooperative loop that drives a workflow run. For
//! each step in document order the engine gates on `when`, interpolates
//! `input` against a context snapshot, resolves the action target to a
//! module instance, dispatches with the step's retry policy, records the
//! result under `steps.<id>`, and picks the next step — honoring
//! forward-only `on_failure_step` jumps, the once-per-run global failure
//! handler, and the terminal `on_success`/`on_failure` branches.
//!
//! A run owns its context and module instances; the approval manager is
//! the only thing it shares with other runs. Suspension is cooperative:
//! an approval gate (or a module returning `waiting_for_input`) parks the
//! `run()` future on a oneshot channel until a submission or expiry wakes
//! it. Callers treat the spawned future plus the `workflow_uid` as the
//! run handle.
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use cascade_core::prelude::*;
//! # async fn demo(registry: Arc<ModuleRegistry>) -> Result<()> {
//! let doc = WorkflowDocument::from_yaml_str(r#"
//! workflow:
//!   name: greet
//!   trigger: {type: ad-hoc}
//!   steps:
//!     - {id: hello, action: echo.say, input: {value: "hi"}}
//! "#)?;
//! let approvals = Arc::new(ApprovalManager::new());
//! let config = Arc::new(EngineConfig::default());
//! let engine = WorkflowEngine::new(doc, serde_json::json!({}), registry, approvals, config)?;
//! let outcome = engine.run().await?;
//! assert_eq!(outcome.status, RunStatus::Succeeded);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::approvals::{ApprovalManager, ApprovalOutcome};
use crate::config::EngineConfig;
use crate::context::Context;
use crate::delegate::{DelegateSpec, RemoteDelegator};
use crate::document::{ActionTarget, Step, StepKind, WorkflowDocument};
use crate::error::{EngineError, Result};
use crate::matching::interpolate;
use crate::modules::{CallContext, WorkflowModule};
use crate::registry::ModuleRegistry;
use crate::result::{StepResult, StepStatus};

/// Terminal status of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

/// What a completed run hands back to its caller.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowOutcome {
    pub workflow_uid: Uuid,
    pub workflow: String,
    pub status: RunStatus,
    /// The terminal failure message, when the run failed.
    pub message: Option<String>,
    /// Final context snapshot, including every recorded step result.
    pub context: Value,
}

/// Outcome of one step list: `None` until a step terminally fails.
struct ListRun {
    failure: Option<String>,
}

/// One workflow instance. Construct with [`WorkflowEngine::new`], then
/// consume with [`WorkflowEngine::run`].
pub struct WorkflowEngine {
    document: WorkflowDocument,
    context: Context,
    registry: Arc<ModuleRegistry>,
    approvals: Arc<ApprovalManager>,
    config: Arc<EngineConfig>,
    uid: Uuid,
    deadline: Option<DateTime<Utc>>,
    ephemeral: HashMap<String, Arc<dyn WorkflowModule>>,
    global_handler_ran: bool,
}

impl WorkflowEngine {
    /// Validates the document and prepares the run context. The context
    /// starts with `payload`, `workflow_uid`, and the configured `env`
    /// export; module instances materialize when [`run`](Self::run)
    /// starts.
    pub fn new(
        document: WorkflowDocument,
        payload: Value,
        registry: Arc<ModuleRegistry>,
        approvals: Arc<ApprovalManager>,
        config: Arc<EngineConfig>,
    ) -> Result<Self> {
        document.validate()?;
        let uid = Uuid::new_v4();
        let mut context = Context::new(uid, payload);
        let mut env = Map::new();
        for key in &config.env_export {
            if let Ok(value) = std::env::var(key) {
                env.insert(key.clone(), Value::String(value));
            }
        }
        context.set("env", Value::Object(env));
        Ok(Self {
            document,
            context,
            registry,
            approvals,
            config,
            uid,
            deadline: None,
            ephemeral: HashMap::new(),
            global_handler_ran: false,
        })
    }

    /// The uid approvals and callers correlate on.
    pub fn workflow_uid(&self) -> Uuid {
        self.uid
    }

    /// Injects a delegating parent's context snapshot under the reserved
    /// `parent` key.
    pub fn inject_parent(&mut self, snapshot: Value) {
        self.context.set("parent", snapshot);
    }

    /// Runs the workflow to its terminal status.
    ///
    /// `Err` is reserved for conditions that abort before step 1 —
    /// instantiation of a declared context module failing, chiefly. Every
    /// in-flight failure is routed through the document's failure policy
    /// and lands in the returned outcome.
    pub async fn run(mut self) -> Result<WorkflowOutcome> {
        info!(
            workflow = %self.document.name,
            workflow_uid = %self.uid,
            trigger = self.document.trigger.kind(),
            "workflow started"
        );
        self.registry
            .materialize(&self.document.context_modules, &mut self.context)?;
        self.deadline = self
            .document
            .deadline_minutes
            .map(|minutes| Utc::now() + ChronoDuration::milliseconds((minutes * 60_000.0) as i64));

        let steps = self.document.steps.clone();
        let main = self.run_list(&steps, false).await?;

        let branch = match &main.failure {
            None => self.document.on_success.clone(),
            Some(_) => self.document.on_failure.clone(),
        };
        if let Some(branch) = branch {
            let label = if main.failure.is_none() {
                "on_success"
            } else {
                "on_failure"
            };
            info!(workflow = %self.document.name, branch = label, "running terminal branch");
            let branch_run = self.run_list(&branch.steps, true).await?;
            if let Some(failure) = branch_run.failure {
                warn!(
                    workflow = %self.document.name,
                    branch = label,
                    failure = %failure,
                    "terminal branch step failed"
                );
            }
        }

        let (status, message) = match main.failure {
            None => (RunStatus::Succeeded, None),
            Some(failure) => (RunStatus::Failed, Some(failure)),
        };
        info!(
            workflow = %self.document.name,
            workflow_uid = %self.uid,
            status = ?status,
            "workflow finished"
        );
        Ok(WorkflowOutcome {
            workflow_uid: self.uid,
            workflow: self.document.name.clone(),
            status,
            message,
            context: self.context.snapshot(),
        })
    }

    /// Executes one step list, honoring `on_failure_step` jumps within it.
    /// Boxed so branch steps can recurse.
    fn run_list<'a>(
        &'a mut self,
        steps: &'a [Step],
        in_branch: bool,
    ) -> BoxFuture<'a, Result<ListRun>> {
        Box::pin(async move {
            let mut index = 0;
            while index < steps.len() {
                let step = &steps[index];
                let result = self.execute_step(step).await?;
                self.context.record_step(step.register_key(), &result);
                info!(
                    workflow = %self.document.name,
                    step = %step.id,
                    status = ?result.status,
                    "step finished"
                );
                match result.status {
                    StepStatus::Ok | StepStatus::Skipped => index += 1,
                    StepStatus::WaitingForInput => {
                        // Suspension resolves inside execute_step; a result
                        // leaking through means the resume channel died.
                        return Ok(ListRun {
                            failure: Some(format!("step '{}' never resumed", step.id)),
                        });
                    }
                    StepStatus::Fail | StepStatus::Timeout => {
                        if let Some(target) = &step.on_failure_step {
                            // Forward-only, verified at load.
                            let jump = steps
                                .iter()
                                .position(|s| &s.id == target)
                                .expect("on_failure_step validated at load");
                            warn!(
                                workflow = %self.document.name,
                                step = %step.id,
                                jump_to = %target,
                                "step failed, jumping to failure step"
                            );
                            index = jump;
                            continue;
                        }
                        if !in_branch {
                            self.run_global_failure_handler().await?;
                        }
                        return Ok(ListRun {
                            failure: Some(format!("step '{}' failed: {}", step.id, result.message)),
                        });
                    }
                }
            }
            Ok(ListRun { failure: None })
        })
    }

    async fn run_global_failure_handler(&mut self) -> Result<()> {
        if self.global_handler_ran {
            return Ok(());
        }
        let Some(handler) = self.document.global_failure_handler.clone() else {
            return Ok(());
        };
        self.global_handler_ran = true;
        info!(workflow = %self.document.name, step = %handler.id, "running global failure handler");
        let result = self.execute_step(&handler).await?;
        self.context.record_step(handler.register_key(), &result);
        Ok(())
    }

    async fn execute_step(&mut self, step: &Step) -> Result<StepResult> {
        if let Some(when) = &step.when {
            if !when.evaluate(&self.context.snapshot()) {
                return Ok(StepResult::skipped("when condition evaluated false"));
            }
        }
        match step.kind {
            StepKind::Action => self.execute_action(step).await,
            StepKind::Approval => {
                self.suspend(step, StepResult::waiting_for_input(json!({})))
                    .await
            }
            StepKind::Branch => {
                let nested = step.steps.clone();
                let run = self.run_list(&nested, true).await?;
                Ok(match run.failure {
                    None => StepResult::ok(
                        "branch completed",
                        json!({
                            "steps": nested.iter().map(|s| s.id.clone()).collect::<Vec<_>>()
                        }),
                    ),
                    Some(failure) => StepResult::fail(failure),
                })
            }
            StepKind::Delegate => self.execute_delegate(step).await,
        }
    }

    async fn execute_action(&mut self, step: &Step) -> Result<StepResult> {
        let action = step.action.as_deref().expect("action validated at load");
        let target = match ActionTarget::parse(action) {
            Ok(target) => target,
            Err(err) => return Ok(StepResult::fail(err.to_string())),
        };
        let instance = match self.resolve_instance(&target) {
            Ok(instance) => instance,
            Err(err) => return Ok(StepResult::fail(err.to_string())),
        };
        let args = match interpolate(
            &Value::Object(step.input.clone()),
            &self.context.snapshot(),
            self.config.strict_templating,
        ) {
            Ok(Value::Object(map)) => map,
            Ok(_) => Map::new(),
            Err(err) => return Ok(StepResult::fail(err.to_string())),
        };

        let max_attempts = step
            .retry
            .as_ref()
            .map(|retry| retry.max_attempts.max(1))
            .unwrap_or(1);
        let mut attempt = 1u32;
        loop {
            if self.deadline_passed() {
                return Ok(StepResult::fail("deadline exceeded"));
            }
            let call = CallContext::new(self.uid, self.context.snapshot());
            let dispatched =
                self.registry
                    .dispatch(action, &instance, target.method(), &args, &call);
            let result = match self.remaining_time() {
                Some(limit) => match tokio::time::timeout(limit, dispatched).await {
                    Ok(result) => result,
                    Err(_) => return Ok(StepResult::fail("deadline exceeded")),
                },
                None => dispatched.await,
            };

            if result.status == StepStatus::WaitingForInput {
                return self.suspend(step, result).await;
            }
            if result.status == StepStatus::Fail && attempt < max_attempts {
                let delay = step
                    .retry
                    .as_ref()
                    .map(|retry| retry.delay_seconds(attempt + 1))
                    .unwrap_or(0.0);
                warn!(
                    workflow = %self.document.name,
                    step = %step.id,
                    attempt,
                    max_attempts,
                    delay_seconds = delay,
                    "step failed, retrying"
                );
                if delay > 0.0 {
                    tokio::time::sleep(std::time::Duration::from_secs_f64(delay)).await;
                }
                attempt += 1;
                continue;
            }
            return Ok(result);
        }
    }

    /// Parks the run on the approval manager until a submission or expiry
    /// wakes it. The recorded in-flight result keeps `waiting_for_input`
    /// visible to observers; the returned result is the resumed one.
    async fn suspend(&mut self, step: &Step, pending: StepResult) -> Result<StepResult> {
        let snapshot = self.context.snapshot();
        let form_schema = match &step.form {
            Some(form) => interpolate(form, &snapshot, false).unwrap_or_else(|_| form.clone()),
            None => pending.data.clone().unwrap_or(Value::Null),
        };
        let created = self.approvals.create(
            self.uid,
            self.document.name.clone(),
            step.id.clone(),
            form_schema,
            step.assignees.clone(),
            step.timeout_minutes,
        );
        let (form_url, receiver) = match created {
            Ok(pair) => pair,
            Err(err) => return Ok(StepResult::fail(err.to_string())),
        };

        let mut data = match pending.data {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        data.insert("form_url".to_string(), Value::String(form_url));
        self.context.record_step(
            step.register_key(),
            &StepResult::waiting_for_input(Value::Object(data.clone())),
        );
        info!(
            workflow = %self.document.name,
            workflow_uid = %self.uid,
            step = %step.id,
            "workflow suspended on approval"
        );

        let outcome = match self.deadline {
            Some(deadline) => {
                let remaining = (deadline - Utc::now())
                    .to_std()
                    .unwrap_or(std::time::Duration::ZERO);
                tokio::select! {
                    outcome = receiver => outcome,
                    _ = tokio::time::sleep(remaining) => {
                        self.approvals.expire_due();
                        return Ok(StepResult::timeout(
                            "workflow deadline exceeded while suspended",
                        ));
                    }
                }
            }
            None => receiver.await,
        };

        match outcome {
            Ok(ApprovalOutcome::Submitted(form_data)) => {
                data.insert("form_data".to_string(), form_data);
                Ok(StepResult::ok("approval received", Value::Object(data)))
            }
            Ok(ApprovalOutcome::Expired) => Ok(StepResult::timeout(format!(
                "approval expired after {} minutes",
                step.timeout_minutes.unwrap_or(0.0)
            ))),
            Err(_) => Ok(StepResult::fail("approval resume channel closed")),
        }
    }

    async fn execute_delegate(&mut self, step: &Step) -> Result<StepResult> {
        let snapshot = self.context.snapshot();
        let render = |field: &Option<String>| -> Option<String> {
            field.as_ref().map(|raw| {
                match interpolate(&Value::String(raw.clone()), &snapshot, false) {
                    Ok(Value::String(rendered)) => rendered,
                    Ok(other) => other.to_string(),
                    Err(_) => raw.clone(),
                }
            })
        };
        let spec = DelegateSpec {
            repo: render(&step.repo).expect("repo validated at load"),
            branch: render(&step.branch).expect("branch validated at load"),
            path: render(&step.path).expect("path validated at load"),
            token: render(&step.token),
            run_conditions: step.run_conditions.clone(),
            condition_logic: step.condition_logic.clone(),
        };
        let delegator = RemoteDelegator::new(
            self.registry.clone(),
            self.approvals.clone(),
            self.config.clone(),
        );
        Ok(delegator.run(&spec, &self.context).await)
    }

    fn resolve_instance(&mut self, target: &ActionTarget) -> Result<Arc<dyn WorkflowModule>> {
        match target {
            ActionTarget::ContextInstance { id, .. } => {
                self.context.bound(id).ok_or_else(|| {
                    EngineError::resolution(
                        format!("context.{}", id),
                        "no materialized context module instance",
                    )
                })
            }
            ActionTarget::Module { module, .. } => {
                if let Some(instance) = self.ephemeral.get(module) {
                    return Ok(instance.clone());
                }
                let instance = self.registry.instantiate(module, &Value::Null)?;
                self.ephemeral.insert(module.clone(), instance.clone());
                Ok(instance)
            }
        }
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|deadline| Utc::now() >= deadline)
    }

    fn remaining_time(&self) -> Option<std::time::Duration> {
        self.deadline.map(|deadline| {
            (deadline - Utc::now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO)
        })
    }
}
