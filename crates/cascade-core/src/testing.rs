//! Test doubles shared by the unit and integration suites.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::modules::{CallContext, WorkflowModule};
use crate::registry::{ArgumentSpec, MethodSpec, ModuleManifest, ModuleRegistry};
use crate::result::StepResult;

/// One recorded call to a [`RecordingModule`].
#[derive(Debug, Clone)]
pub struct Invocation {
    pub method: String,
    pub args: Map<String, Value>,
}

/// In-memory module that records every invocation and replays scripted
/// results. Unscripted methods echo their arguments back as ok data.
#[derive(Clone)]
pub struct RecordingModule {
    name: String,
    inner: Arc<Inner>,
}

struct Inner {
    invocations: Mutex<Vec<Invocation>>,
    scripts: Mutex<HashMap<String, VecDeque<StepResult>>>,
}

impl RecordingModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(Inner {
                invocations: Mutex::new(Vec::new()),
                scripts: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Queues results returned by successive calls to `method`. When the
    /// queue drains, the last scripted result repeats.
    pub fn script(&self, method: &str, results: Vec<StepResult>) {
        self.inner
            .scripts
            .lock()
            .unwrap()
            .insert(method.to_string(), results.into());
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.inner.invocations.lock().unwrap().clone()
    }

    pub fn calls_to(&self, method: &str) -> usize {
        self.inner
            .invocations
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.method == method)
            .count()
    }
}

#[async_trait]
impl WorkflowModule for RecordingModule {
    fn module_name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        method: &str,
        args: &Map<String, Value>,
        _call: &CallContext,
    ) -> Result<StepResult> {
        self.inner.invocations.lock().unwrap().push(Invocation {
            method: method.to_string(),
            args: args.clone(),
        });
        let mut scripts = self.inner.scripts.lock().unwrap();
        if let Some(queue) = scripts.get_mut(method) {
            if queue.len() > 1 {
                return Ok(queue.pop_front().unwrap());
            }
            if let Some(last) = queue.front() {
                return Ok(last.clone());
            }
        }
        Ok(StepResult::ok(
            format!("{} echoed", method),
            Value::Object(args.clone()),
        ))
    }
}

/// Builds a manifest where every listed method is `(name, [(arg, required)])`.
pub fn manifest_with_methods(
    name: &str,
    methods: &[(&str, Vec<(&str, bool)>)],
) -> ModuleManifest {
    ModuleManifest {
        name: name.to_string(),
        class: "Recording".to_string(),
        version: "0.0.0".to_string(),
        author: "tests".to_string(),
        methods: methods
            .iter()
            .map(|(method, args)| MethodSpec {
                name: (*method).to_string(),
                arguments: args
                    .iter()
                    .map(|(arg, required)| ArgumentSpec {
                        name: (*arg).to_string(),
                        arg_type: Some("string".to_string()),
                        required: *required,
                    })
                    .collect(),
                returns: Value::Null,
            })
            .collect(),
    }
}

/// Registry containing a single [`RecordingModule`] under `name`, with a
/// permissive manifest for the given methods. Returns the module handle so
/// tests can script results and assert on invocations.
pub fn recording_registry(
    name: &str,
    methods: &[(&str, Vec<(&str, bool)>)],
) -> (ModuleRegistry, RecordingModule) {
    let module = RecordingModule::new(name);
    let mut registry = ModuleRegistry::new();
    let shared = module.clone();
    let factory = move |_: &Value| -> Result<Arc<dyn WorkflowModule>> {
        Ok(Arc::new(shared.clone()))
    };
    registry
        .register(manifest_with_methods(name, methods), factory)
        .expect("register recording module");
    (registry, module)
}
