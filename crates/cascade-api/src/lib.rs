//! # Cascade API
//!
//! The HTTP surface of the engine: the ad-hoc trigger endpoint, the
//! approval web form endpoints that resume suspended runs, and a liveness
//! probe. Handlers share an [`state::AppState`] carrying the module
//! registry, the approval manager, and the engine configuration.

pub mod adhoc;
pub mod health;
pub mod startup;
pub mod state;
pub mod webform;

pub use startup::{configure, spawn_expiry_ticker};
pub use state::AppState;

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use actix_web::{test, web, App};
    use serde_json::{json, Value};
    use uuid::Uuid;

    use cascade_core::approvals::ApprovalManager;
    use cascade_core::config::EngineConfig;
    use cascade_core::testing::recording_registry;

    use super::*;

    fn app_state() -> web::Data<AppState> {
        let (registry, _) = recording_registry("echo", &[("say", vec![("value", true)])]);
        web::Data::new(AppState::new(
            Arc::new(registry),
            Arc::new(ApprovalManager::new()),
            Arc::new(EngineConfig::default()),
        ))
    }

    #[actix_web::test]
    async fn adhoc_trigger_starts_a_run_and_reports_status() {
        let state = app_state();
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .configure(startup::configure),
        )
        .await;

        let request = test::TestRequest::post()
            .uri("/api/adhoc")
            .set_json(json!({
                "workflow": {
                    "name": "demo",
                    "trigger": {"type": "ad-hoc"},
                    "steps": [
                        {"id": "greet", "action": "echo.say", "input": {"value": "hi"}}
                    ]
                },
                "payload": {"user": "ada"}
            }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, request).await;
        let uid: Uuid = serde_json::from_value(body["workflow_uid"].clone()).unwrap();

        // The spawned run is short; poll its status record briefly.
        let mut state_body = Value::Null;
        for _ in 0..50 {
            let request = test::TestRequest::get()
                .uri(&format!("/api/adhoc/{}", uid))
                .to_request();
            state_body = test::call_and_read_body_json(&app, request).await;
            if state_body["state"] != json!("running") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(state_body["state"], json!("succeeded"));
        assert_eq!(state_body["workflow"], json!("demo"));
    }

    #[actix_web::test]
    async fn invalid_documents_are_rejected_with_400() {
        let state = app_state();
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .configure(startup::configure),
        )
        .await;

        let request = test::TestRequest::post()
            .uri("/api/adhoc")
            .set_json(json!({
                "workflow": {
                    "name": "demo",
                    "trigger": {"type": "ad-hoc"},
                    "steps": [
                        {"id": "dup", "action": "echo.say"},
                        {"id": "dup", "action": "echo.say"}
                    ]
                }
            }))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), actix_web::http::StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn webform_endpoints_map_ticket_states_to_status_codes() {
        let state = app_state();
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .configure(startup::configure),
        )
        .await;

        // Unknown uid: 404 on both verbs.
        let unknown = Uuid::new_v4();
        let request = test::TestRequest::get()
            .uri(&format!("/webform/{}", unknown))
            .to_request();
        assert_eq!(
            test::call_service(&app, request).await.status(),
            actix_web::http::StatusCode::NOT_FOUND
        );

        // A pending ticket serves its form and accepts one submission.
        let uid = Uuid::new_v4();
        let (_, _receiver) = state
            .approvals
            .create(uid, "wf", "gate", json!({"fields": ["choice"]}), vec![], None)
            .unwrap();

        let request = test::TestRequest::get()
            .uri(&format!("/webform/{}", uid))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, request).await;
        assert_eq!(body["form"]["fields"][0], json!("choice"));

        let request = test::TestRequest::post()
            .uri(&format!("/webform/{}", uid))
            .set_json(json!({"choice": "approve"}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, request).await;
        assert_eq!(body["accepted"], json!(true));

        // Resubmission: 409 with the stored result unchanged.
        let request = test::TestRequest::post()
            .uri(&format!("/webform/{}", uid))
            .set_json(json!({"choice": "reject"}))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), actix_web::http::StatusCode::CONFLICT);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["result"]["choice"], json!("approve"));

        // Expired ticket: 410.
        let expired_uid = Uuid::new_v4();
        let (_, _rx) = state
            .approvals
            .create(expired_uid, "wf", "gate", json!({}), vec![], Some(0.0))
            .unwrap();
        state.approvals.expire_due();
        let request = test::TestRequest::post()
            .uri(&format!("/webform/{}", expired_uid))
            .set_json(json!({}))
            .to_request();
        assert_eq!(
            test::call_service(&app, request).await.status(),
            actix_web::http::StatusCode::GONE
        );
    }
}
