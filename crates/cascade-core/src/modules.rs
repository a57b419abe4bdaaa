//! # Module Capability
//!
//! Modules are the pluggable units actions dispatch to. Each module
//! implements one uniform capability — [`WorkflowModule::invoke`] with a
//! late-bound method name and argument map — and is described by a manifest
//! that is the authority on its method signatures (see
//! [`crate::registry`]). Construction goes through a [`ModuleFactory`]
//! selected by the manifest's `name`, so the set of loadable modules is
//! fixed at build time while workflows stay free to pick instances and
//! methods by string.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::Result;
use crate::result::StepResult;

/// Read-only view handed to a module for one invocation: the workflow uid
/// and a context snapshot taken after the most recent write.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub workflow_uid: Uuid,
    pub context: Value,
}

impl CallContext {
    pub fn new(workflow_uid: Uuid, context: Value) -> Self {
        Self {
            workflow_uid,
            context,
        }
    }

    /// Dotted-path lookup into the context snapshot.
    pub fn get(&self, path: &str) -> Option<&Value> {
        crate::matching::extract_json_path(&self.context, path)
    }
}

/// The uniform capability every module exposes.
///
/// `invoke` receives the method name from the action target and the
/// interpolated argument map. The dispatcher has already checked the method
/// against the manifest and verified required arguments are present, so
/// implementations may deserialize `args` directly. Returning `Err` is the
/// "module raised" case — the dispatcher translates it into a `fail` step
/// result. A module returning loosely-shaped data can funnel it through
/// [`StepResult::from_return_value`] to get the standard wrap rule.
#[async_trait]
pub trait WorkflowModule: Send + Sync {
    /// The manifest `name` this instance was created from.
    fn module_name(&self) -> &str;

    async fn invoke(
        &self,
        method: &str,
        args: &Map<String, Value>,
        call: &CallContext,
    ) -> Result<StepResult>;
}

/// Constructs module instances from static per-instance config.
///
/// One factory is registered per module name at build time; the registry
/// calls it once per `context_modules` entry (and once per bare-target
/// module) for each workflow run. Instances live for the run and are
/// dropped with the context.
pub trait ModuleFactory: Send + Sync {
    fn create(&self, config: &Value) -> Result<Arc<dyn WorkflowModule>>;
}

impl<F> ModuleFactory for F
where
    F: Fn(&Value) -> Result<Arc<dyn WorkflowModule>> + Send + Sync,
{
    fn create(&self, config: &Value) -> Result<Arc<dyn WorkflowModule>> {
        self(config)
    }
}
