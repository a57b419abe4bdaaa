use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use dotenvy::dotenv;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cascade_api::{configure, spawn_expiry_ticker, AppState};
use cascade_core::approvals::ApprovalManager;
use cascade_core::config::EngineConfig;

const EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(15);

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = EngineConfig::from_env()
        .and_then(|config| config.validate().map(|()| config))
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;
    let config = Arc::new(config);

    let mut registry = cascade_modules::builtin_registry()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;
    let discovered = registry
        .discover(&config.modules_dir)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;
    info!(
        modules = registry.module_names().len(),
        discovered, "module registry initialized"
    );

    let approvals = Arc::new(ApprovalManager::new());
    spawn_expiry_ticker(approvals.clone(), EXPIRY_SWEEP_INTERVAL);

    let state = web::Data::new(AppState::new(
        Arc::new(registry),
        approvals,
        config.clone(),
    ));

    let bind = (config.server.host.clone(), config.server.port);
    info!(host = %bind.0, port = bind.1, "starting server");

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .configure(configure)
    })
    .bind(bind)?
    .run()
    .await
}
