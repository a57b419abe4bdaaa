//! `when` condition expressions.
//!
//! A condition is either a `{path, operator, value}` leaf or an `any`/`all`
//! compound; compounds nest arbitrarily. Evaluation short-circuits, and an
//! error inside a branch (a bad regex, typically) degrades that branch to
//! false and is logged rather than failing the step.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::matching::ops::{evaluate_operator, Operator};
use crate::matching::path::extract_json_path;

/// A condition tree attached to a step's `when` clause.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    /// True when every nested condition is true. Short-circuits on the
    /// first false branch.
    All { all: Vec<Condition> },

    /// True when at least one nested condition is true. Short-circuits on
    /// the first true branch.
    Any { any: Vec<Condition> },

    /// A single operator applied to the value at `path`.
    Leaf {
        path: String,
        operator: Operator,
        #[serde(default)]
        value: Value,
    },
}

impl Condition {
    /// Evaluates the tree against a context snapshot.
    pub fn evaluate(&self, scope: &Value) -> bool {
        match self {
            Condition::All { all } => all.iter().all(|c| c.evaluate(scope)),
            Condition::Any { any } => any.iter().any(|c| c.evaluate(scope)),
            Condition::Leaf {
                path,
                operator,
                value,
            } => {
                let actual = extract_json_path(scope, path);
                match evaluate_operator(*operator, actual, value) {
                    Ok(result) => result,
                    Err(err) => {
                        tracing::warn!(path = %path, error = %err, "condition branch degraded to false");
                        false
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(yaml: &str) -> Condition {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn leaf_condition_evaluates_against_scope() {
        let cond = parse("{path: steps.a.data.flag, operator: equals, value: true}");
        assert!(cond.evaluate(&json!({"steps": {"a": {"data": {"flag": true}}}})));
        assert!(!cond.evaluate(&json!({"steps": {"a": {"data": {"flag": false}}}})));
    }

    #[test]
    fn compounds_nest_and_short_circuit() {
        let cond = parse(
            r#"
any:
  - {path: env.region, operator: equals, value: "eu"}
  - all:
      - {path: payload.count, operator: greater_than, value: 3}
      - {path: payload.kind, operator: in, value: ["deploy", "release"]}
"#,
        );
        assert!(cond.evaluate(&json!({"env": {"region": "eu"}})));
        assert!(cond.evaluate(&json!({"payload": {"count": 5, "kind": "deploy"}})));
        assert!(!cond.evaluate(&json!({"payload": {"count": 5, "kind": "ci"}})));
    }

    #[test]
    fn branch_errors_degrade_to_false() {
        let cond = parse(r#"{path: payload.tag, operator: matches_regex, value: "("}"#);
        assert!(!cond.evaluate(&json!({"payload": {"tag": "x"}})));
    }

    #[test]
    fn missing_value_defaults_to_null() {
        let cond = parse("{path: payload.gone, operator: not_exists}");
        assert!(cond.evaluate(&json!({"payload": {}})));
    }
}
