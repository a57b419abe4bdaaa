//! # Cascade Core
//!
//! The core of the Cascade workflow automation engine: a declarative
//! runtime that executes the ordered steps of a YAML workflow document,
//! routes results through a shared per-run context, resolves `${...}`
//! references between steps, dispatches actions to modules discovered via
//! manifests, suspends on human-approval gates, and delegates subtrees of
//! work to workflows hosted in remote repositories.
//!
//! ## Core Concepts
//!
//! - **[`WorkflowDocument`]** — the immutable, validated form of a
//!   workflow YAML file
//! - **[`WorkflowEngine`]** — one run: the cooperative step loop
//! - **[`Context`]** — per-run key/value state, written only by the engine
//! - **[`ModuleRegistry`]** — manifests plus build-time factories, and the
//!   dispatch contract
//! - **[`ApprovalManager`]** — uid-indexed suspension store shared across
//!   runs
//! - **[`RemoteDelegator`]** — clone-and-run for delegated workflows
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cascade_core::prelude::*;
//!
//! # async fn demo(registry: Arc<ModuleRegistry>) -> Result<()> {
//! let document = WorkflowDocument::from_yaml_str(r#"
//! workflow:
//!   name: hello
//!   trigger: {type: ad-hoc}
//!   steps:
//!     - {id: greet, action: echo.say, input: {value: "hello"}}
//! "#)?;
//!
//! let approvals = Arc::new(ApprovalManager::new());
//! let config = Arc::new(EngineConfig::default());
//! let engine = WorkflowEngine::new(
//!     document,
//!     serde_json::json!({"user": "ada"}),
//!     registry,
//!     approvals,
//!     config,
//! )?;
//! let outcome = engine.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod approvals;
pub mod config;
pub mod context;
pub mod delegate;
pub mod document;
pub mod engine;
pub mod error;
pub mod matching;
pub mod modules;
pub mod registry;
pub mod result;
pub mod testing;

pub use approvals::{ApprovalManager, ApprovalOutcome, ApprovalState, ApprovalTicket, SubmitOutcome};
pub use config::EngineConfig;
pub use context::Context;
pub use delegate::{DelegateSpec, RemoteDelegator};
pub use document::{Step, StepKind, Trigger, WorkflowDocument};
pub use engine::{RunStatus, WorkflowEngine, WorkflowOutcome};
pub use error::{EngineError, Result};
pub use modules::{CallContext, ModuleFactory, WorkflowModule};
pub use registry::{ModuleManifest, ModuleRegistry};
pub use result::{StepResult, StepStatus};

/// Current version of the engine core.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports.
pub mod prelude {
    pub use crate::{
        ApprovalManager, CallContext, Context, EngineConfig, EngineError, ModuleFactory,
        ModuleManifest, ModuleRegistry, Result, RunStatus, Step, StepResult, StepStatus,
        WorkflowDocument, WorkflowEngine, WorkflowModule, WorkflowOutcome,
    };
    pub use async_trait::async_trait;
    pub use serde_json::{json, Value};
    pub use uuid::Uuid;
}
