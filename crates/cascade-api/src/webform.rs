//! Approval web form endpoints.
//!
//! `GET /webform/{uid}` serves the form schema for a suspended run;
//! `POST /webform/{uid}` submits it and resumes the engine. Errors: 404
//! for an unknown uid, 409 when the ticket is already resolved (the stored
//! result is returned unchanged), 410 when it expired.

use actix_web::{web, HttpResponse};
use serde_json::{json, Value};
use uuid::Uuid;

use cascade_core::approvals::SubmitOutcome;
use cascade_core::error::EngineError;

use crate::state::AppState;

pub async fn get_form(state: web::Data<AppState>, uid: web::Path<Uuid>) -> HttpResponse {
    let uid = uid.into_inner();
    match state.approvals.form_schema(uid) {
        Ok(schema) => HttpResponse::Ok().json(json!({
            "workflow_uid": uid,
            "form": schema,
        })),
        Err(EngineError::Timeout { .. }) => HttpResponse::Gone().json(json!({
            "error": "approval expired",
        })),
        Err(_) => HttpResponse::NotFound().json(json!({
            "error": "unknown workflow uid",
        })),
    }
}

pub async fn submit_form(
    state: web::Data<AppState>,
    uid: web::Path<Uuid>,
    body: web::Json<Value>,
) -> HttpResponse {
    let uid = uid.into_inner();
    match state.approvals.submit(uid, body.into_inner()) {
        Ok(SubmitOutcome::Accepted) => HttpResponse::Ok().json(json!({
            "accepted": true,
        })),
        Ok(SubmitOutcome::AlreadyResolved { state, result }) => {
            HttpResponse::Conflict().json(json!({
                "accepted": false,
                "state": state,
                "result": result,
            }))
        }
        Ok(SubmitOutcome::Expired) => HttpResponse::Gone().json(json!({
            "accepted": false,
            "error": "approval expired",
        })),
        Err(_) => HttpResponse::NotFound().json(json!({
            "accepted": false,
            "error": "unknown workflow uid",
        })),
    }
}
