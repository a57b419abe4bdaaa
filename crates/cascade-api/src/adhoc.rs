//! Ad-hoc trigger endpoint.
//!
//! `POST /api/adhoc` accepts a workflow document inline, spawns an engine
//! run, and replies immediately with the `workflow_uid` handle. The run
//! continues in the background; `GET /api/adhoc/{uid}` reports where it
//! got to.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};
use uuid::Uuid;

use cascade_core::document::WorkflowDocument;
use cascade_core::engine::{RunStatus, WorkflowEngine};

use crate::state::{AppState, RunRecord, RunState};

/// Request payload for triggering a workflow ad hoc.
#[derive(Debug, Deserialize)]
pub struct AdhocTriggerRequest {
    /// The workflow document body (the content of the `workflow` key)
    pub workflow: Value,

    /// Trigger input exposed to steps as `payload`
    #[serde(default)]
    pub payload: Option<Value>,
}

/// Response for a trigger request.
#[derive(Debug, Serialize)]
pub struct AdhocTriggerResponse {
    pub workflow_uid: Uuid,
    pub status: RunState,
}

pub async fn trigger(
    state: web::Data<AppState>,
    body: web::Json<AdhocTriggerRequest>,
) -> HttpResponse {
    let body = body.into_inner();
    let document = match WorkflowDocument::from_value(json!({"workflow": body.workflow})) {
        Ok(document) => document,
        Err(err) => {
            return HttpResponse::BadRequest().json(json!({"error": err.to_string()}));
        }
    };
    let workflow_name = document.name.clone();

    let engine = match WorkflowEngine::new(
        document,
        body.payload.unwrap_or_else(|| json!({})),
        state.registry.clone(),
        state.approvals.clone(),
        state.config.clone(),
    ) {
        Ok(engine) => engine,
        Err(err) => {
            return HttpResponse::BadRequest().json(json!({"error": err.to_string()}));
        }
    };
    let uid = engine.workflow_uid();

    state.runs.write().await.insert(
        uid,
        RunRecord {
            workflow: workflow_name.clone(),
            state: RunState::Running,
            started_at: Utc::now(),
            finished_at: None,
            message: None,
        },
    );

    let shared = state.clone();
    tokio::spawn(async move {
        let finished = match engine.run().await {
            Ok(outcome) => match outcome.status {
                RunStatus::Succeeded => (RunState::Succeeded, outcome.message),
                RunStatus::Failed => (RunState::Failed, outcome.message),
            },
            Err(err) => {
                error!(workflow_uid = %uid, error = %err, "workflow aborted before step 1");
                (RunState::Failed, Some(err.to_string()))
            }
        };
        let mut runs = shared.runs.write().await;
        if let Some(record) = runs.get_mut(&uid) {
            record.state = finished.0;
            record.message = finished.1;
            record.finished_at = Some(Utc::now());
        }
    });

    info!(workflow = %workflow_name, workflow_uid = %uid, "ad-hoc workflow triggered");
    HttpResponse::Accepted().json(AdhocTriggerResponse {
        workflow_uid: uid,
        status: RunState::Running,
    })
}

pub async fn run_status(state: web::Data<AppState>, uid: web::Path<Uuid>) -> HttpResponse {
    let uid = uid.into_inner();
    match state.runs.read().await.get(&uid) {
        Some(record) => HttpResponse::Ok().json(record),
        None => HttpResponse::NotFound().json(json!({"error": "unknown workflow uid"})),
    }
}
