//! Dotted JSON-path extraction.
//!
//! Paths are evaluated left-to-right against a JSON value. Segments are
//! separated by dots; a segment may be a plain key, a numeric index into an
//! array, or a double-quoted key for names that themselves contain dots
//! (`payload."user.email"`). A miss at any level yields `None`.

use serde_json::Value;

/// One parsed path segment. Numeric disambiguation happens at lookup time:
/// a segment of digits indexes arrays and still matches object keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment(pub String);

/// Splits a dotted path into segments, honoring double-quoted names.
pub fn parse_path(path: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut chars = path.chars().peekable();
    let mut current = String::new();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                for quoted in chars.by_ref() {
                    if quoted == '"' {
                        break;
                    }
                    current.push(quoted);
                }
            }
            '.' => {
                segments.push(Segment(std::mem::take(&mut current)));
            }
            _ => current.push(ch),
        }
    }
    segments.push(Segment(current));
    segments
}

/// Returns the sub-value addressed by `path`, or `None` when any segment
/// misses.
pub fn extract_json_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    let mut cursor = value;
    for Segment(segment) in parse_path(path) {
        cursor = match cursor {
            Value::Object(map) => map.get(&segment)?,
            Value::Array(items) => {
                let index: usize = segment.parse().ok()?;
                items.get(index)?
            }
            _ => return None,
        };
    }
    Some(cursor)
}
