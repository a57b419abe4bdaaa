//! Approval gates: suspension, resume on submission, and expiry.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use cascade_core::approvals::ApprovalManager;
use cascade_core::config::EngineConfig;
use cascade_core::engine::{RunStatus, WorkflowEngine};
use cascade_core::document::WorkflowDocument;
use cascade_core::testing::{recording_registry, RecordingModule};
use cascade_core::registry::ModuleRegistry;

fn echo_registry() -> (ModuleRegistry, RecordingModule) {
    recording_registry("echo", &[("after", vec![]), ("form", vec![])])
}

fn spawn_engine(
    yaml: &str,
    registry: ModuleRegistry,
    approvals: Arc<ApprovalManager>,
) -> (
    uuid::Uuid,
    tokio::task::JoinHandle<cascade_core::error::Result<cascade_core::engine::WorkflowOutcome>>,
) {
    let document = WorkflowDocument::from_yaml_str(yaml).expect("valid document");
    let engine = WorkflowEngine::new(
        document,
        json!({}),
        Arc::new(registry),
        approvals,
        Arc::new(EngineConfig::default()),
    )
    .expect("engine construction");
    let uid = engine.workflow_uid();
    (uid, tokio::spawn(engine.run()))
}

async fn wait_for_ticket(approvals: &ApprovalManager, uid: uuid::Uuid) {
    for _ in 0..100 {
        if approvals.status(uid).is_some() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("approval ticket never appeared for {}", uid);
}

const GATED: &str = r#"
workflow:
  name: gated
  trigger: {type: api}
  steps:
    - id: gate
      type: approval
      form: {fields: [{name: choice, type: select, options: [approve, reject]}]}
      assignees: [ops@example.com]
      timeout_minutes: 5
    - id: after
      action: echo.after
      input: {choice: "${steps.gate.data.form_data.choice}"}
"#;

#[tokio::test]
async fn approval_gate_stalls_until_submission_resumes_it() {
    let (registry, module) = echo_registry();
    let approvals = Arc::new(ApprovalManager::new());
    let (uid, handle) = spawn_engine(GATED, registry, approvals.clone());

    wait_for_ticket(&approvals, uid).await;
    // Suspended: nothing past the gate has run.
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(module.calls_to("after"), 0);
    assert!(!handle.is_finished());

    approvals
        .submit(uid, json!({"choice": "approve"}))
        .expect("submission accepted");
    let outcome = handle.await.unwrap().unwrap();

    assert_eq!(outcome.status, RunStatus::Succeeded);
    assert_eq!(module.calls_to("after"), 1);
    let choice = cascade_core::matching::extract_json_path(
        &outcome.context,
        "steps.gate.data.form_data.choice",
    );
    assert_eq!(choice, Some(&json!("approve")));
    let seen = cascade_core::matching::extract_json_path(
        &outcome.context,
        "steps.after.data.choice",
    );
    assert_eq!(seen, Some(&json!("approve")));
}

#[tokio::test]
async fn expired_approval_times_the_step_out() {
    let (registry, module) = echo_registry();
    let approvals = Arc::new(ApprovalManager::new());
    let yaml = r#"
workflow:
  name: expiring
  trigger: {type: api}
  steps:
    - id: gate
      type: approval
      form: {fields: []}
      timeout_minutes: 0.0
    - {id: after, action: echo.after, input: {}}
"#;
    let (uid, handle) = spawn_engine(yaml, registry, approvals.clone());
    wait_for_ticket(&approvals, uid).await;

    assert_eq!(approvals.expire_due(), 1);
    let outcome = handle.await.unwrap().unwrap();

    assert_eq!(outcome.status, RunStatus::Failed);
    assert_eq!(module.calls_to("after"), 0);
    let status =
        cascade_core::matching::extract_json_path(&outcome.context, "steps.gate.status");
    assert_eq!(status, Some(&json!("timeout")));
}

#[tokio::test]
async fn module_returned_waiting_for_input_suspends_the_same_way() {
    let (registry, module) = echo_registry();
    module.script(
        "form",
        vec![cascade_core::result::StepResult::waiting_for_input(
            json!({"prompt": "sign off"}),
        )],
    );
    let approvals = Arc::new(ApprovalManager::new());
    let yaml = r#"
workflow:
  name: module-gated
  trigger: {type: api}
  steps:
    - {id: gate, action: echo.form, input: {}}
    - id: after
      action: echo.after
      input: {answer: "${steps.gate.data.form_data.answer}"}
"#;
    let (uid, handle) = spawn_engine(yaml, registry, approvals.clone());
    wait_for_ticket(&approvals, uid).await;
    assert_eq!(module.calls_to("after"), 0);

    approvals.submit(uid, json!({"answer": 42})).unwrap();
    let outcome = handle.await.unwrap().unwrap();

    assert_eq!(outcome.status, RunStatus::Succeeded);
    let answer = cascade_core::matching::extract_json_path(
        &outcome.context,
        "steps.after.data.answer",
    );
    assert_eq!(answer, Some(&json!(42)));
    // The module's own data survives alongside the merged form data.
    let prompt = cascade_core::matching::extract_json_path(
        &outcome.context,
        "steps.gate.data.prompt",
    );
    assert_eq!(prompt, Some(&json!("sign off")));
}

#[tokio::test]
async fn suspended_state_is_observable_while_waiting() {
    let (registry, _) = echo_registry();
    let approvals = Arc::new(ApprovalManager::new());
    let (uid, handle) = spawn_engine(GATED, registry, approvals.clone());
    wait_for_ticket(&approvals, uid).await;

    let ticket = approvals.status(uid).unwrap();
    assert_eq!(ticket.step_id, "gate");
    assert_eq!(ticket.assignees, vec!["ops@example.com"]);
    assert!(ticket.expires_at.is_some());
    let form = approvals.form_schema(uid).unwrap();
    assert_eq!(form["fields"][0]["name"], json!("choice"));

    approvals.submit(uid, json!({"choice": "reject"})).unwrap();
    let Value::Object(_) = handle.await.unwrap().unwrap().context else {
        panic!("context snapshot must be an object");
    };
}
