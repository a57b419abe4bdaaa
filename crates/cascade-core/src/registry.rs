//! # Module Registry & Dispatcher
//!
//! The registry maps module names to `(manifest, factory)` pairs. Factories
//! are registered at build time; manifests ship compiled-in with the
//! built-in modules and can be overridden by `module.yaml` files discovered
//! under the configured modules directory. The manifest is the authority
//! for argument validation: dispatch rejects unknown methods and missing
//! required arguments before a module ever runs.
//!
//! Dispatch never returns an error for module-level failures — the §7
//! boundary rule is that user-visible failure is always a step result, so
//! unknown methods, missing arguments, and module errors all come back as
//! `fail` results naming the unresolved symbol or the underlying failure.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::context::Context;
use crate::document::ContextModuleDecl;
use crate::error::{EngineError, Result};
use crate::modules::{CallContext, ModuleFactory, WorkflowModule};
use crate::result::StepResult;

/// A module's self-description, parsed from `module.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleManifest {
    pub name: String,
    pub class: String,
    pub version: String,
    pub author: String,
    #[serde(default)]
    pub methods: Vec<MethodSpec>,
}

/// One invocable method and its signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodSpec {
    pub name: String,
    #[serde(default)]
    pub arguments: Vec<ArgumentSpec>,
    /// Declared return shape. Consumed by scaffolding tools; the engine
    /// does not enforce it.
    #[serde(default)]
    pub returns: Value,
}

/// One declared argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgumentSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub arg_type: Option<String>,
    #[serde(default)]
    pub required: bool,
}

impl ModuleManifest {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn method(&self, name: &str) -> Option<&MethodSpec> {
        self.methods.iter().find(|m| m.name == name)
    }
}

struct RegistryEntry {
    manifest: ModuleManifest,
    factory: Box<dyn ModuleFactory>,
}

/// Module name → (manifest, factory). Shared read-only across workflow
/// runs.
#[derive(Default)]
pub struct ModuleRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module under its manifest name. Duplicate names are a
    /// validation error.
    pub fn register(
        &mut self,
        manifest: ModuleManifest,
        factory: impl ModuleFactory + 'static,
    ) -> Result<()> {
        let name = manifest.name.clone();
        if self.entries.contains_key(&name) {
            return Err(EngineError::validation(format!(
                "module '{}' is already registered",
                name
            )));
        }
        self.entries.insert(
            name,
            RegistryEntry {
                manifest,
                factory: Box::new(factory),
            },
        );
        Ok(())
    }

    pub fn manifest(&self, name: &str) -> Option<&ModuleManifest> {
        self.entries.get(name).map(|e| &e.manifest)
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Scans `modules_dir` for subdirectories carrying a `module.yaml` and
    /// overrides the stored manifest for every module whose factory is
    /// registered. Manifests without a matching factory are skipped with a
    /// warning — there is no code to run them.
    ///
    /// Returns the number of manifests loaded.
    pub fn discover(&mut self, modules_dir: &Path) -> Result<usize> {
        if !modules_dir.is_dir() {
            debug!(dir = %modules_dir.display(), "modules directory absent, keeping built-in manifests");
            return Ok(0);
        }
        let mut loaded = 0;
        for entry in std::fs::read_dir(modules_dir)? {
            let entry = entry?;
            let manifest_path = entry.path().join("module.yaml");
            if !manifest_path.is_file() {
                continue;
            }
            let raw = std::fs::read_to_string(&manifest_path)?;
            let manifest = ModuleManifest::from_yaml_str(&raw).map_err(|e| {
                EngineError::validation(format!(
                    "manifest {} is invalid: {}",
                    manifest_path.display(),
                    e
                ))
            })?;
            match self.entries.get_mut(&manifest.name) {
                Some(existing) => {
                    debug!(module = %manifest.name, path = %manifest_path.display(), "manifest loaded");
                    existing.manifest = manifest;
                    loaded += 1;
                }
                None => {
                    warn!(
                        module = %manifest.name,
                        path = %manifest_path.display(),
                        "manifest names a module with no registered implementation, skipping"
                    );
                }
            }
        }
        Ok(loaded)
    }

    /// Constructs one instance of `name` with the given static config.
    pub fn instantiate(&self, name: &str, config: &Value) -> Result<Arc<dyn WorkflowModule>> {
        let entry = self.entries.get(name).ok_or_else(|| {
            EngineError::resolution(name.to_string(), "module is not registered")
        })?;
        entry.factory.create(config)
    }

    /// Materializes every `context_modules` declaration into the run's
    /// context. Any failure here aborts the workflow before step 1.
    pub fn materialize(
        &self,
        declarations: &std::collections::BTreeMap<String, ContextModuleDecl>,
        context: &mut Context,
    ) -> Result<()> {
        for (id, decl) in declarations {
            let module_name = decl.module_name();
            let manifest = self.manifest(module_name).ok_or_else(|| {
                EngineError::resolution(
                    decl.module.clone(),
                    format!("context module '{}' names an unregistered module", id),
                )
            })?;
            if let Some(class) = decl.class_name() {
                if class != manifest.class {
                    return Err(EngineError::validation(format!(
                        "context module '{}' declares class '{}' but '{}' provides '{}'",
                        id, class, module_name, manifest.class
                    )));
                }
            }
            let instance = self.instantiate(module_name, &decl.config)?;
            context.bind(id.clone(), instance);
        }
        Ok(())
    }

    /// Invokes `method` on `instance`, applying the manifest contract.
    ///
    /// `target` is the original action string, used in diagnostics.
    pub async fn dispatch(
        &self,
        target: &str,
        instance: &Arc<dyn WorkflowModule>,
        method: &str,
        args: &Map<String, Value>,
        call: &CallContext,
    ) -> StepResult {
        let module_name = instance.module_name();
        let Some(manifest) = self.manifest(module_name) else {
            return StepResult::fail(format!(
                "module '{}' has no manifest registered",
                module_name
            ));
        };
        let Some(spec) = manifest.method(method) else {
            return StepResult::fail(format!(
                "unknown method '{}' on module '{}'",
                method, module_name
            ));
        };

        let missing: Vec<&str> = spec
            .arguments
            .iter()
            .filter(|arg| arg.required && !args.contains_key(&arg.name))
            .map(|arg| arg.name.as_str())
            .collect();
        if !missing.is_empty() {
            return StepResult::fail(format!(
                "missing required arguments for '{}': {}",
                target,
                missing.join(", ")
            ));
        }

        match instance.invoke(method, args, call).await {
            Ok(result) => result,
            Err(err) => {
                warn!(action = %target, error = %err, "module invocation failed");
                StepResult::fail(format!("'{}' raised: {}", target, err))
            }
        }
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{manifest_with_methods, recording_registry, RecordingModule};
    use serde_json::json;
    use uuid::Uuid;

    fn registry_with_recorder() -> (ModuleRegistry, RecordingModule) {
        recording_registry(
            "recorder",
            &[("echo", vec![("value", true)]), ("noop", vec![])],
        )
    }

    fn call() -> CallContext {
        CallContext::new(Uuid::new_v4(), json!({}))
    }

    #[tokio::test]
    async fn dispatch_rejects_unknown_methods() {
        let (registry, recorder) = registry_with_recorder();
        let instance = registry.instantiate("recorder", &Value::Null).unwrap();
        let result = registry
            .dispatch("recorder.nope", &instance, "nope", &Map::new(), &call())
            .await;
        assert_eq!(result.status, crate::result::StepStatus::Fail);
        assert!(result.message.contains("unknown method"));
        assert_eq!(recorder.invocations().len(), 0);
    }

    #[tokio::test]
    async fn dispatch_rejects_missing_required_arguments() {
        let (registry, recorder) = registry_with_recorder();
        let instance = registry.instantiate("recorder", &Value::Null).unwrap();
        let result = registry
            .dispatch("recorder.echo", &instance, "echo", &Map::new(), &call())
            .await;
        assert_eq!(result.status, crate::result::StepStatus::Fail);
        assert!(result.message.contains("value"));
        assert_eq!(recorder.invocations().len(), 0);
    }

    #[tokio::test]
    async fn dispatch_forwards_module_results() {
        let (registry, _) = registry_with_recorder();
        let instance = registry.instantiate("recorder", &Value::Null).unwrap();
        let mut args = Map::new();
        args.insert("value".to_string(), json!("hello"));
        let result = registry
            .dispatch("recorder.echo", &instance, "echo", &args, &call())
            .await;
        assert_eq!(result.status, crate::result::StepStatus::Ok);
        assert_eq!(result.data.unwrap()["value"], json!("hello"));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let (mut registry, _) = registry_with_recorder();
        let factory = |_: &Value| -> crate::error::Result<Arc<dyn WorkflowModule>> {
            Err(EngineError::validation("unused"))
        };
        let err = registry.register(manifest_with_methods("recorder", &[]), factory);
        assert!(err.is_err());
    }

    #[test]
    fn discover_overrides_manifests_for_known_modules() {
        let (mut registry, _) = registry_with_recorder();
        let dir = tempfile::tempdir().unwrap();
        let module_dir = dir.path().join("recorder");
        std::fs::create_dir_all(&module_dir).unwrap();
        std::fs::write(
            module_dir.join("module.yaml"),
            r#"
name: recorder
class: Recorder
version: "9.9.9"
author: tests
methods:
  - name: echo
    arguments:
      - {name: value, type: string, required: true}
"#,
        )
        .unwrap();
        // A manifest with no registered factory is skipped.
        let stray = dir.path().join("stray");
        std::fs::create_dir_all(&stray).unwrap();
        std::fs::write(
            stray.join("module.yaml"),
            "name: stray\nclass: Stray\nversion: '0.1'\nauthor: tests\n",
        )
        .unwrap();

        let loaded = registry.discover(dir.path()).unwrap();
        assert_eq!(loaded, 1);
        assert_eq!(registry.manifest("recorder").unwrap().version, "9.9.9");
        assert!(registry.manifest("stray").is_none());
    }
}
