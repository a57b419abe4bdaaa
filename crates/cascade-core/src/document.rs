//! # Workflow Documents
//!
//! The immutable parsed form of a workflow YAML file: name, trigger,
//! declared context modules, the ordered step list, and the optional
//! failure handler and terminal branches. Documents are validated at load
//! time — structural validity is the engine's precondition, while semantic
//! validity (an action naming a module that exists) stays a runtime
//! concern surfaced as step failures.
//!
//! ```yaml
//! workflow:
//!   name: provision
//!   trigger: {type: api}
//!   context_modules:
//!     notifier: {module: slack_module.Slack, config: {webhook_url: "..."}}
//!   steps:
//!     - id: create
//!       action: api_module.call
//!       input: {method: POST, url: "https://svc/create"}
//!       retry: {max_attempts: 3, backoff_seconds: 2}
//!     - id: announce
//!       action: context.notifier.send_info_message
//!       when: {path: steps.create.status, operator: equals, value: ok}
//!       input: {channel: "#ops", title: "created"}
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::delegate::logic;
use crate::error::{EngineError, Result};
use crate::matching::{Condition, Operator};

/// Top-level YAML document: a single `workflow` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowFile {
    pub workflow: WorkflowDocument,
}

/// A parsed, validated workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowDocument {
    pub name: String,

    pub trigger: Trigger,

    /// Module instances materialized for this run, keyed by instance id
    /// and invocable through `context.<id>.<method>` actions.
    #[serde(default)]
    pub context_modules: BTreeMap<String, ContextModuleDecl>,

    pub steps: Vec<Step>,

    /// Runs once when a step fails with no step-local handler, before the
    /// workflow is marked failed.
    #[serde(default)]
    pub global_failure_handler: Option<Box<Step>>,

    /// Runs after the main list when no step terminally failed.
    #[serde(default)]
    pub on_success: Option<BranchSteps>,

    /// Runs after the main list when the workflow failed.
    #[serde(default)]
    pub on_failure: Option<BranchSteps>,

    /// Optional wall-clock budget for the whole run.
    #[serde(default)]
    pub deadline_minutes: Option<f64>,
}

/// What started the workflow, with per-variant parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Trigger {
    Api {
        #[serde(default)]
        route: Option<String>,
    },
    Git {
        #[serde(default)]
        repository: Option<String>,
        #[serde(default)]
        events: Vec<String>,
    },
    Scheduled {
        #[serde(default)]
        cron: Option<String>,
    },
    #[serde(rename = "ad-hoc")]
    AdHoc,
}

impl Trigger {
    pub fn kind(&self) -> &'static str {
        match self {
            Trigger::Api { .. } => "api",
            Trigger::Git { .. } => "git",
            Trigger::Scheduled { .. } => "scheduled",
            Trigger::AdHoc => "ad-hoc",
        }
    }
}

/// One `context_modules` entry: `module: "<name>.<class>"` plus static
/// instance config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContextModuleDecl {
    pub module: String,
    #[serde(default)]
    pub config: Value,
}

impl ContextModuleDecl {
    /// The module name half of `<name>.<class>`.
    pub fn module_name(&self) -> &str {
        self.module.split('.').next().unwrap_or(&self.module)
    }

    /// The class half of `<name>.<class>`, when present.
    pub fn class_name(&self) -> Option<&str> {
        self.module.split_once('.').map(|(_, class)| class)
    }
}

/// The step discriminator. Absent `type` means `action`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    #[default]
    Action,
    Approval,
    Branch,
    Delegate,
}

/// A single unit of work. Which fields apply depends on [`StepKind`];
/// [`WorkflowDocument::validate`] enforces the per-kind requirements.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    /// Unique within the document; the key steps use to reference each
    /// other's results (`${steps.<id>.data.*}`).
    pub id: String,

    #[serde(rename = "type", default)]
    pub kind: StepKind,

    /// Action target: `<instance>.<method>` or `context.<ctxid>.<method>`.
    #[serde(default)]
    pub action: Option<String>,

    /// Named arguments, interpolated against the context before dispatch.
    #[serde(default)]
    pub input: Map<String, Value>,

    #[serde(default)]
    pub retry: Option<RetryPolicy>,

    /// Step id to jump to when this step terminally fails. Forward-only.
    #[serde(default)]
    pub on_failure_step: Option<String>,

    /// Gate: when false, the step records `skipped` and nothing is
    /// dispatched.
    #[serde(default)]
    pub when: Option<Condition>,

    /// Context key override for the recorded result. Defaults to the step
    /// id; collisions are last-writer-wins.
    #[serde(default)]
    pub register_as: Option<String>,

    /// Approval: the form definition published at the form URL.
    #[serde(default)]
    pub form: Option<Value>,

    /// Approval: who is expected to submit.
    #[serde(default)]
    pub assignees: Vec<String>,

    /// Approval: minutes until the ticket expires.
    #[serde(default)]
    pub timeout_minutes: Option<f64>,

    /// Branch: nested steps executed inline.
    #[serde(default)]
    pub steps: Vec<Step>,

    /// Delegate: repository URL to clone.
    #[serde(default)]
    pub repo: Option<String>,

    /// Delegate: branch to clone.
    #[serde(default)]
    pub branch: Option<String>,

    /// Delegate: path of the workflow document inside the clone.
    #[serde(default)]
    pub path: Option<String>,

    /// Delegate: token embedded as basic-auth credentials in the clone URL.
    #[serde(default)]
    pub token: Option<String>,

    /// Delegate: positional conditions combined by `condition_logic`.
    #[serde(default)]
    pub run_conditions: Vec<RunCondition>,

    /// Delegate: boolean expression over run condition indices. Omitted
    /// means all must hold.
    #[serde(default)]
    pub condition_logic: Option<String>,
}

impl Step {
    /// The context key this step's result is recorded under.
    pub fn register_key(&self) -> &str {
        self.register_as.as_deref().unwrap_or(&self.id)
    }
}

/// One positional delegation run condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunCondition {
    pub path: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
}

/// Retry policy for `fail` results. `timeout` is never retried.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,

    #[serde(default)]
    pub backoff_seconds: f64,

    #[serde(default)]
    pub backoff: Backoff,
}

/// How `backoff_seconds` scales across attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    Fixed,
    #[default]
    Linear,
    Exponential,
}

impl RetryPolicy {
    /// Delay before attempt number `attempt` (1-based; the first retry is
    /// attempt 2).
    pub fn delay_seconds(&self, attempt: u32) -> f64 {
        let retries = attempt.saturating_sub(1);
        match self.backoff {
            Backoff::Fixed => self.backoff_seconds,
            Backoff::Linear => self.backoff_seconds * retries as f64,
            Backoff::Exponential => self.backoff_seconds * 2f64.powi(retries as i32 - 1),
        }
    }
}

/// A terminal `on_success`/`on_failure` branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BranchSteps {
    pub steps: Vec<Step>,
}

impl WorkflowDocument {
    /// Parses and validates a `workflow:` YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let file: WorkflowFile = serde_yaml::from_str(yaml)?;
        file.workflow.validate()?;
        Ok(file.workflow)
    }

    /// Parses and validates a document arriving as JSON (the ad-hoc
    /// trigger body).
    pub fn from_value(value: Value) -> Result<Self> {
        let file: WorkflowFile =
            serde_json::from_value(value).map_err(|e| EngineError::Validation {
                message: format!("invalid workflow document: {}", e),
            })?;
        file.workflow.validate()?;
        Ok(file.workflow)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    /// Structural validation: unique step ids, per-kind required fields,
    /// declared `context.<id>` targets, forward-only failure jumps, and
    /// well-formed delegation condition logic.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        self.validate_list(&self.steps, &mut seen)?;
        if let Some(handler) = &self.global_failure_handler {
            self.validate_step(handler, &mut seen)?;
            if handler.on_failure_step.is_some() {
                return Err(EngineError::validation(
                    "global_failure_handler cannot itself declare on_failure_step",
                ));
            }
        }
        for branch in [&self.on_success, &self.on_failure].into_iter().flatten() {
            self.validate_list(&branch.steps, &mut seen)?;
        }
        Ok(())
    }

    fn validate_list(&self, steps: &[Step], seen: &mut HashSet<String>) -> Result<()> {
        for (index, step) in steps.iter().enumerate() {
            self.validate_step(step, seen)?;
            if let Some(target) = &step.on_failure_step {
                let target_index = steps.iter().position(|s| &s.id == target);
                match target_index {
                    None => {
                        return Err(EngineError::resolution(
                            target.clone(),
                            format!("on_failure_step of '{}' names no step in its list", step.id),
                        ));
                    }
                    Some(t) if t <= index => {
                        return Err(EngineError::validation(format!(
                            "on_failure_step of '{}' must jump forward, but '{}' precedes it",
                            step.id, target
                        )));
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }

    fn validate_step(&self, step: &Step, seen: &mut HashSet<String>) -> Result<()> {
        if step.id.is_empty() {
            return Err(EngineError::validation("step id cannot be empty"));
        }
        if !seen.insert(step.id.clone()) {
            return Err(EngineError::validation(format!(
                "duplicate step id '{}'",
                step.id
            )));
        }
        match step.kind {
            StepKind::Action => {
                let action = step.action.as_deref().ok_or_else(|| {
                    EngineError::validation(format!("action step '{}' is missing 'action'", step.id))
                })?;
                let target = ActionTarget::parse(action)?;
                if let ActionTarget::ContextInstance { id, .. } = &target {
                    if !self.context_modules.contains_key(id) {
                        return Err(EngineError::resolution(
                            format!("context.{}", id),
                            format!("not declared in context_modules (step '{}')", step.id),
                        ));
                    }
                }
            }
            StepKind::Approval => {
                if step.form.is_none() {
                    return Err(EngineError::validation(format!(
                        "approval step '{}' is missing 'form'",
                        step.id
                    )));
                }
            }
            StepKind::Branch => {
                if step.steps.is_empty() {
                    return Err(EngineError::validation(format!(
                        "branch step '{}' has no nested steps",
                        step.id
                    )));
                }
                self.validate_list(&step.steps, seen)?;
            }
            StepKind::Delegate => {
                for (field, value) in [
                    ("repo", &step.repo),
                    ("branch", &step.branch),
                    ("path", &step.path),
                ] {
                    if value.is_none() {
                        return Err(EngineError::validation(format!(
                            "delegate step '{}' is missing '{}'",
                            step.id, field
                        )));
                    }
                }
                if let Some(expr) = &step.condition_logic {
                    logic::validate(expr, step.run_conditions.len())?;
                }
            }
        }
        Ok(())
    }
}

/// A parsed action target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionTarget {
    /// `context.<id>.<method>` — a declared context module instance.
    ContextInstance { id: String, method: String },
    /// `<module>.<method>` — an ephemeral instance of a registered module.
    Module { module: String, method: String },
}

impl ActionTarget {
    pub fn parse(action: &str) -> Result<Self> {
        if let Some(rest) = action.strip_prefix("context.") {
            let (id, method) = rest.split_once('.').ok_or_else(|| {
                EngineError::validation(format!(
                    "action '{}' must be 'context.<id>.<method>'",
                    action
                ))
            })?;
            if id.is_empty() || method.is_empty() {
                return Err(EngineError::validation(format!(
                    "action '{}' has an empty instance or method",
                    action
                )));
            }
            return Ok(Self::ContextInstance {
                id: id.to_string(),
                method: method.to_string(),
            });
        }
        let (module, method) = action.split_once('.').ok_or_else(|| {
            EngineError::validation(format!("action '{}' must be '<module>.<method>'", action))
        })?;
        if module.is_empty() || method.is_empty() {
            return Err(EngineError::validation(format!(
                "action '{}' has an empty module or method",
                action
            )));
        }
        Ok(Self::Module {
            module: module.to_string(),
            method: method.to_string(),
        })
    }

    pub fn method(&self) -> &str {
        match self {
            Self::ContextInstance { method, .. } | Self::Module { method, .. } => method,
        }
    }
}

impl std::fmt::Display for ActionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ContextInstance { id, method } => write!(f, "context.{}.{}", id, method),
            Self::Module { module, method } => write!(f, "{}.{}", module, method),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
workflow:
  name: demo
  trigger: {type: ad-hoc}
  steps:
    - id: first
      action: echo.say
      input: {value: "hello"}
"#;

    #[test]
    fn minimal_document_parses() {
        let doc = WorkflowDocument::from_yaml_str(MINIMAL).unwrap();
        assert_eq!(doc.name, "demo");
        assert_eq!(doc.trigger.kind(), "ad-hoc");
        assert_eq!(doc.steps.len(), 1);
        assert_eq!(doc.steps[0].kind, StepKind::Action);
        assert_eq!(doc.steps[0].register_key(), "first");
    }

    #[test]
    fn unknown_top_level_fields_are_rejected() {
        let yaml = r#"
workflow:
  name: demo
  trigger: {type: ad-hoc}
  steps: []
  marketplace: true
"#;
        assert!(WorkflowDocument::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn duplicate_step_ids_are_rejected() {
        let yaml = r#"
workflow:
  name: demo
  trigger: {type: ad-hoc}
  steps:
    - {id: a, action: echo.say}
    - {id: a, action: echo.say}
"#;
        let err = WorkflowDocument::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate step id"));
    }

    #[test]
    fn undeclared_context_target_is_rejected() {
        let yaml = r#"
workflow:
  name: demo
  trigger: {type: api}
  steps:
    - {id: a, action: context.notifier.send}
"#;
        let err = WorkflowDocument::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, EngineError::Resolution { .. }));
    }

    #[test]
    fn backward_failure_jump_is_rejected() {
        let yaml = r#"
workflow:
  name: demo
  trigger: {type: ad-hoc}
  steps:
    - {id: a, action: echo.say}
    - {id: b, action: echo.say, on_failure_step: a}
"#;
        let err = WorkflowDocument::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("jump forward"));
    }

    #[test]
    fn delegate_requires_repo_branch_path() {
        let yaml = r#"
workflow:
  name: demo
  trigger: {type: ad-hoc}
  steps:
    - {id: d, type: delegate, repo: "https://github.com/org/repo", branch: main}
"#;
        let err = WorkflowDocument::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("missing 'path'"));
    }

    #[test]
    fn condition_logic_is_validated_at_load() {
        let yaml = r#"
workflow:
  name: demo
  trigger: {type: ad-hoc}
  steps:
    - id: d
      type: delegate
      repo: "https://github.com/org/repo"
      branch: main
      path: wf.yaml
      run_conditions:
        - {path: payload.ready, operator: equals, value: true}
      condition_logic: "0 and 1"
"#;
        let err = WorkflowDocument::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }

    #[test]
    fn action_target_parsing() {
        assert_eq!(
            ActionTarget::parse("context.gitops.open_pr").unwrap(),
            ActionTarget::ContextInstance {
                id: "gitops".to_string(),
                method: "open_pr".to_string()
            }
        );
        assert_eq!(
            ActionTarget::parse("api_module.call").unwrap(),
            ActionTarget::Module {
                module: "api_module".to_string(),
                method: "call".to_string()
            }
        );
        assert!(ActionTarget::parse("no_dot").is_err());
        assert!(ActionTarget::parse("context.only").is_err());
    }

    #[test]
    fn retry_backoff_schedules() {
        let fixed = RetryPolicy {
            max_attempts: 3,
            backoff_seconds: 2.0,
            backoff: Backoff::Fixed,
        };
        assert_eq!(fixed.delay_seconds(2), 2.0);
        assert_eq!(fixed.delay_seconds(3), 2.0);

        let linear = RetryPolicy {
            max_attempts: 3,
            backoff_seconds: 2.0,
            backoff: Backoff::Linear,
        };
        assert_eq!(linear.delay_seconds(2), 2.0);
        assert_eq!(linear.delay_seconds(3), 4.0);

        let expo = RetryPolicy {
            max_attempts: 4,
            backoff_seconds: 2.0,
            backoff: Backoff::Exponential,
        };
        assert_eq!(expo.delay_seconds(2), 2.0);
        assert_eq!(expo.delay_seconds(3), 4.0);
        assert_eq!(expo.delay_seconds(4), 8.0);
    }

    #[test]
    fn nested_branch_steps_share_the_id_namespace() {
        let yaml = r#"
workflow:
  name: demo
  trigger: {type: ad-hoc}
  steps:
    - id: outer
      type: branch
      steps:
        - {id: inner, action: echo.say}
    - {id: inner, action: echo.say}
"#;
        let err = WorkflowDocument::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate step id"));
    }
}
