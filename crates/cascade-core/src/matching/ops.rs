//! Comparison operators over `(actual, expected)` pairs.
//!
//! Operators are total: a missing actual value is treated as JSON null for
//! equality and membership, and fails closed (false) for ordering,
//! containment, and regex matching. Ordering is type-strict — comparing a
//! number against a string is false, never a coercion.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, Result};

/// The binary predicates available to `when` clauses, polling success
/// conditions, and delegation run conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    In,
    NotIn,
    MatchesRegex,
    Exists,
    NotExists,
}

/// Evaluates `operator` over the extracted `actual` value and the literal
/// `expected` value.
///
/// The only error path is an invalid regex in `matches_regex`; every other
/// combination evaluates to a boolean.
pub fn evaluate_operator(
    operator: Operator,
    actual: Option<&Value>,
    expected: &Value,
) -> Result<bool> {
    match operator {
        Operator::Exists => Ok(matches!(actual, Some(v) if !v.is_null())),
        Operator::NotExists => Ok(!matches!(actual, Some(v) if !v.is_null())),
        Operator::Equals => Ok(actual.unwrap_or(&Value::Null) == expected),
        Operator::NotEquals => Ok(actual.unwrap_or(&Value::Null) != expected),
        Operator::Contains => Ok(actual.map(|a| contains(a, expected)).unwrap_or(false)),
        Operator::NotContains => Ok(!actual.map(|a| contains(a, expected)).unwrap_or(false)),
        Operator::In => Ok(actual
            .map(|a| contains(expected, a))
            .unwrap_or_else(|| contains(expected, &Value::Null))),
        Operator::NotIn => Ok(!actual
            .map(|a| contains(expected, a))
            .unwrap_or_else(|| contains(expected, &Value::Null))),
        Operator::GreaterThan => Ok(ordering(actual, expected, |o| o.is_gt())),
        Operator::LessThan => Ok(ordering(actual, expected, |o| o.is_lt())),
        Operator::GreaterOrEqual => Ok(ordering(actual, expected, |o| o.is_ge())),
        Operator::LessOrEqual => Ok(ordering(actual, expected, |o| o.is_le())),
        Operator::MatchesRegex => {
            let (Some(Value::String(haystack)), Value::String(pattern)) = (actual, expected) else {
                return Ok(false);
            };
            let re = Regex::new(pattern).map_err(|e| EngineError::Validation {
                message: format!("invalid regex '{}': {}", pattern, e),
            })?;
            Ok(re.is_match(haystack))
        }
    }
}

/// String containment for string haystacks, element membership for arrays.
/// Anything else fails closed.
fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::String(s) => match needle {
            Value::String(n) => s.contains(n.as_str()),
            _ => false,
        },
        Value::Array(items) => items.contains(needle),
        _ => false,
    }
}

/// Type-strict ordering: both numbers or both strings, otherwise false.
fn ordering(
    actual: Option<&Value>,
    expected: &Value,
    check: impl Fn(std::cmp::Ordering) -> bool,
) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    let ord = match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
        (Value::String(a), Value::String(b)) => Some(a.as_str().cmp(b.as_str())),
        _ => None,
    };
    ord.map(check).unwrap_or(false)
}
