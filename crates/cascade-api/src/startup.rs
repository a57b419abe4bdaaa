//! Route wiring and the approval expiry ticker.

use std::sync::Arc;
use std::time::Duration;

use actix_web::web;
use tracing::debug;

use cascade_core::approvals::ApprovalManager;

use crate::{adhoc, health, webform};

/// Registers every route on an actix `App`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health::health))
        .service(
            web::scope("/api")
                .route("/adhoc", web::post().to(adhoc::trigger))
                .route("/adhoc/{uid}", web::get().to(adhoc::run_status)),
        )
        .service(
            web::scope("/webform")
                .route("/{uid}", web::get().to(webform::get_form))
                .route("/{uid}", web::post().to(webform::submit_form)),
        );
}

/// The external ticker driving approval expiry: sweeps the ticket store on
/// a fixed interval for the life of the process.
pub fn spawn_expiry_ticker(
    approvals: Arc<ApprovalManager>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let expired = approvals.expire_due();
            if expired > 0 {
                debug!(expired, "approval tickets expired");
            }
        }
    })
}
