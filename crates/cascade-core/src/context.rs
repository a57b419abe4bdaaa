//! # Workflow Context
//!
//! The per-run key/value store every step reads from and the engine writes
//! to. The context is single-writer by contract: the engine is the only
//! component that mutates it, so no interior locking is needed. Readers
//! (template interpolation, condition evaluation, modules) work against a
//! deep [`snapshot`](Context::snapshot) and always observe the state after
//! the most recent write.
//!
//! Reserved roots populated by the engine:
//!
//! - `payload` — the trigger input, read-only by convention
//! - `steps.<id>` — the [`StepResult`] of each completed step
//! - `workflow_uid` — assigned at start, correlates approvals
//! - `env` — the configured export of process environment variables
//! - `parent` — injected snapshot of a delegating parent run, when present
//!
//! Live module instances are [`bind`](Context::bind)-ed under a separate,
//! non-serializable namespace that snapshots never export.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::modules::WorkflowModule;
use crate::result::StepResult;

/// Mutable per-workflow state. See the module docs for the reserved roots.
pub struct Context {
    data: Map<String, Value>,
    modules: HashMap<String, Arc<dyn WorkflowModule>>,
}

impl Context {
    pub fn new(workflow_uid: Uuid, payload: Value) -> Self {
        let mut data = Map::new();
        data.insert("workflow_uid".to_string(), Value::String(workflow_uid.to_string()));
        data.insert("payload".to_string(), payload);
        data.insert("steps".to_string(), Value::Object(Map::new()));
        Self {
            data,
            modules: HashMap::new(),
        }
    }

    /// Resolves a dotted path against the data namespace.
    pub fn get(&self, path: &str) -> Option<Value> {
        let mut segments = crate::matching::path::parse_path(path).into_iter();
        let first = segments.next()?;
        let mut cursor = self.data.get(&first.0)?;
        for segment in segments {
            cursor = match cursor {
                Value::Object(map) => map.get(&segment.0)?,
                Value::Array(items) => items.get(segment.0.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(cursor.clone())
    }

    /// Writes a root key.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    /// Records a completed step's result under `steps.<key>`.
    ///
    /// `key` is the step id, or its `register_as` override; collisions are
    /// last-writer-wins.
    pub fn record_step(&mut self, key: &str, result: &StepResult) {
        let value = serde_json::to_value(result).unwrap_or(Value::Null);
        match self.data.get_mut("steps") {
            Some(Value::Object(steps)) => {
                steps.insert(key.to_string(), value);
            }
            _ => {
                let mut steps = Map::new();
                steps.insert(key.to_string(), value);
                self.data.insert("steps".to_string(), Value::Object(steps));
            }
        }
    }

    /// Deep copy of the data namespace, suitable for template rendering.
    /// Bound module handles are not exported.
    pub fn snapshot(&self) -> Value {
        Value::Object(self.data.clone())
    }

    /// Stores a live module instance under `id`. Handles live outside the
    /// data namespace and never appear in snapshots.
    pub fn bind(&mut self, id: impl Into<String>, instance: Arc<dyn WorkflowModule>) {
        self.modules.insert(id.into(), instance);
    }

    /// Fetches a bound module instance by id.
    pub fn bound(&self, id: &str) -> Option<Arc<dyn WorkflowModule>> {
        self.modules.get(id).cloned()
    }

    pub fn workflow_uid(&self) -> Uuid {
        self.data
            .get("workflow_uid")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_default()
    }

    pub fn payload(&self) -> Value {
        self.data.get("payload").cloned().unwrap_or(Value::Null)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("data", &self.data)
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .finish()
    }
}
