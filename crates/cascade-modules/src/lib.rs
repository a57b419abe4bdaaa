//! # Cascade Modules
//!
//! The built-in workflow modules and their compiled-in manifests:
//!
//! - [`api`] — one-shot HTTP calls and blocking polls
//! - [`command`] — shell execution with optional POSIX privilege drop
//! - [`webform`] — approval form publication
//! - [`slack`] — incoming-webhook notifications
//!
//! [`builtin_registry`] wires every module's factory to its manifest. The
//! manifests here are the compiled-in defaults; a deployment can override
//! them by placing `module.yaml` files under the configured modules
//! directory and calling [`ModuleRegistry::discover`].

use std::sync::Arc;

use serde_json::Value;

use cascade_core::error::Result;
use cascade_core::modules::WorkflowModule;
use cascade_core::registry::{ModuleManifest, ModuleRegistry};

pub mod api;
pub mod command;
pub mod slack;
pub mod webform;

pub use api::ApiModule;
pub use command::CommandModule;
pub use slack::SlackModule;
pub use webform::WebformModule;

/// A registry holding every built-in module.
pub fn builtin_registry() -> Result<ModuleRegistry> {
    let mut registry = ModuleRegistry::new();
    registry.register(
        ModuleManifest::from_yaml_str(include_str!("../manifests/api_module/module.yaml"))?,
        |config: &Value| -> Result<Arc<dyn WorkflowModule>> {
            Ok(Arc::new(ApiModule::from_config(config)?))
        },
    )?;
    registry.register(
        ModuleManifest::from_yaml_str(include_str!("../manifests/command_module/module.yaml"))?,
        |config: &Value| -> Result<Arc<dyn WorkflowModule>> {
            Ok(Arc::new(CommandModule::from_config(config)?))
        },
    )?;
    registry.register(
        ModuleManifest::from_yaml_str(include_str!("../manifests/webform/module.yaml"))?,
        |config: &Value| -> Result<Arc<dyn WorkflowModule>> {
            Ok(Arc::new(WebformModule::from_config(config)?))
        },
    )?;
    registry.register(
        ModuleManifest::from_yaml_str(include_str!("../manifests/slack_module/module.yaml"))?,
        |config: &Value| -> Result<Arc<dyn WorkflowModule>> {
            Ok(Arc::new(SlackModule::from_config(config)?))
        },
    )?;
    Ok(registry)
}
