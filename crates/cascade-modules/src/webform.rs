//! Web form module.
//!
//! `approval_form` publishes the form route for the current run and
//! suspends the workflow by returning `waiting_for_input`. The actual
//! approval happens in the engine when the submission arrives at that URL.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use cascade_core::error::{EngineError, Result};
use cascade_core::modules::{CallContext, WorkflowModule};
use cascade_core::result::StepResult;

pub const MODULE_NAME: &str = "webform";

pub struct WebformModule;

impl WebformModule {
    pub fn from_config(_config: &Value) -> Result<Self> {
        Ok(Self)
    }
}

#[async_trait]
impl WorkflowModule for WebformModule {
    fn module_name(&self) -> &str {
        MODULE_NAME
    }

    async fn invoke(
        &self,
        method: &str,
        _args: &Map<String, Value>,
        call: &CallContext,
    ) -> Result<StepResult> {
        match method {
            "approval_form" => {
                debug!(workflow_uid = %call.workflow_uid, "publishing approval form route");
                Ok(StepResult::waiting_for_input(json!({
                    "form_url": format!("/webform/{}", call.workflow_uid),
                })))
            }
            other => Err(EngineError::Dispatch {
                target: format!("{}.{}", MODULE_NAME, other),
                message: "method not implemented".to_string(),
            }),
        }
    }
}
