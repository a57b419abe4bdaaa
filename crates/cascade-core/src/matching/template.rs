//! `${path}` template interpolation.
//!
//! Interpolation accepts any JSON value. Strings are scanned for
//! placeholders; mappings and sequences recurse. A string that is exactly
//! one placeholder substitutes the raw typed value so numbers, booleans,
//! and objects survive the round trip; placeholders embedded in larger
//! strings stringify (objects and arrays as compact JSON). A missing path
//! substitutes the empty string when embedded and `null` when standalone —
//! unless strict templating is on, in which case it is an error.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::{EngineError, Result};
use crate::matching::path::extract_json_path;

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("placeholder regex"));

/// Recursively substitutes every `${path}` placeholder in `value` against
/// `scope`.
pub fn interpolate(value: &Value, scope: &Value, strict: bool) -> Result<Value> {
    match value {
        Value::String(s) => interpolate_string(s, scope, strict),
        Value::Array(items) => items
            .iter()
            .map(|item| interpolate(item, scope, strict))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                out.insert(key.clone(), interpolate(item, scope, strict)?);
            }
            Ok(Value::Object(out))
        }
        _ => Ok(value.clone()),
    }
}

fn interpolate_string(input: &str, scope: &Value, strict: bool) -> Result<Value> {
    // Whole-string placeholder: substitute the raw typed value.
    if let Some(caps) = PLACEHOLDER_RE.captures(input) {
        let full = caps.get(0).expect("match");
        if full.start() == 0 && full.end() == input.len() {
            let path = &caps[1];
            return match extract_json_path(scope, path) {
                Some(found) => Ok(found.clone()),
                None if strict => Err(missing(path)),
                None => Ok(Value::Null),
            };
        }
    }

    let mut rendered = String::with_capacity(input.len());
    let mut last = 0;
    for caps in PLACEHOLDER_RE.captures_iter(input) {
        let full = caps.get(0).expect("match");
        let path = &caps[1];
        rendered.push_str(&input[last..full.start()]);
        match extract_json_path(scope, path) {
            Some(found) => rendered.push_str(&render_inline(found)),
            None if strict => return Err(missing(path)),
            None => {}
        }
        last = full.end();
    }
    rendered.push_str(&input[last..]);
    Ok(Value::String(rendered))
}

/// How a value reads when embedded in a larger string: strings verbatim,
/// composites as compact JSON.
fn render_inline(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn missing(path: &str) -> EngineError {
    EngineError::Template {
        message: format!("path '{}' not found in context", path),
    }
}
