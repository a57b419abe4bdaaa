//! Shared application state for the HTTP surface.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use cascade_core::approvals::ApprovalManager;
use cascade_core::config::EngineConfig;
use cascade_core::registry::ModuleRegistry;

/// Lifecycle of a triggered run as seen by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Running,
    Succeeded,
    Failed,
}

/// Bookkeeping for one triggered run.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub workflow: String,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
}

/// Process-wide state shared by every handler.
pub struct AppState {
    pub registry: Arc<ModuleRegistry>,
    pub approvals: Arc<ApprovalManager>,
    pub config: Arc<EngineConfig>,
    pub runs: RwLock<HashMap<Uuid, RunRecord>>,
}

impl AppState {
    pub fn new(
        registry: Arc<ModuleRegistry>,
        approvals: Arc<ApprovalManager>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            registry,
            approvals,
            config,
            runs: RwLock::new(HashMap::new()),
        }
    }
}
