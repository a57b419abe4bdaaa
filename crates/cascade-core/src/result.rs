//! # Step Results
//!
//! Every module invocation, approval gate, and delegation resolves to a
//! [`StepResult`] — the stable `{status, message, data}` shape shared by all
//! modules and recorded in the context under `steps.<id>` after each step
//! completes. The engine's flow decisions (retry, failure routing, branch
//! selection, suspension) key off [`StepStatus`] alone.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Terminal and non-terminal outcomes of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The step succeeded.
    Ok,
    /// The step failed; retry and failure policy apply.
    Fail,
    /// The step's `when` clause evaluated false; nothing was dispatched.
    Skipped,
    /// The step suspended the workflow pending an external submission.
    WaitingForInput,
    /// A blocking operation or approval gate expired. Terminal; never
    /// retried.
    Timeout,
}

impl StepStatus {
    pub fn is_terminal_failure(self) -> bool {
        matches!(self, Self::Fail | Self::Timeout)
    }
}

/// The standardized result record produced by every step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Outcome of the step
    pub status: StepStatus,

    /// Human-readable summary of what happened
    #[serde(default)]
    pub message: String,

    /// Structured payload produced by the step, if any
    #[serde(default)]
    pub data: Option<Value>,
}

impl StepResult {
    pub fn ok(message: impl Into<String>, data: impl Into<Option<Value>>) -> Self {
        Self {
            status: StepStatus::Ok,
            message: message.into(),
            data: data.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Fail,
            message: message.into(),
            data: None,
        }
    }

    pub fn fail_with_data(message: impl Into<String>, data: Value) -> Self {
        Self {
            status: StepStatus::Fail,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Skipped,
            message: message.into(),
            data: None,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Timeout,
            message: message.into(),
            data: None,
        }
    }

    pub fn waiting_for_input(data: Value) -> Self {
        Self {
            status: StepStatus::WaitingForInput,
            message: "waiting for form submission".to_string(),
            data: Some(data),
        }
    }

    /// Applies the dispatch wrap rule to a raw module return value.
    ///
    /// A value already shaped like a step result (an object with a valid
    /// `status` field) is forwarded unchanged; anything else is wrapped as
    /// `{status: ok, data: <value>}`.
    pub fn from_return_value(value: Value) -> Self {
        if value.is_object() && value.get("status").is_some() {
            if let Ok(result) = serde_json::from_value::<StepResult>(value.clone()) {
                return result;
            }
        }
        Self {
            status: StepStatus::Ok,
            message: String::new(),
            data: Some(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_value(StepStatus::WaitingForInput).unwrap();
        assert_eq!(json, json!("waiting_for_input"));
    }

    #[test]
    fn result_shaped_value_is_forwarded() {
        let result = StepResult::from_return_value(json!({
            "status": "fail",
            "message": "boom",
            "data": {"exit_code": 2}
        }));
        assert_eq!(result.status, StepStatus::Fail);
        assert_eq!(result.message, "boom");
        assert_eq!(result.data.unwrap()["exit_code"], json!(2));
    }

    #[test]
    fn arbitrary_value_wraps_as_ok() {
        let result = StepResult::from_return_value(json!({"value": "hello"}));
        assert_eq!(result.status, StepStatus::Ok);
        assert_eq!(result.data.unwrap()["value"], json!("hello"));
    }

    #[test]
    fn object_with_unknown_status_wraps_as_ok() {
        let result = StepResult::from_return_value(json!({"status": "shipped"}));
        assert_eq!(result.status, StepStatus::Ok);
    }
}
