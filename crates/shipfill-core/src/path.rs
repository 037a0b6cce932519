//! Dot-and-bracket path navigation over JSON documents.
//!
//! Paths look like `ShipmentRequest.Shipment.Package[1].PackageWeight.Weight`:
//! dot-separated map keys, each optionally followed by a single `[n]` index.
//!
//! ## Presence
//!
//! A leaf is *present* when it resolves to something other than `null` or a
//! blank string. `0` and `false` are present.

use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised while parsing or writing a path.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PathError {
    #[error("Invalid path segment '{segment}' in '{path}'")]
    InvalidPath { path: String, segment: String },

    #[error("Expected {expected} at '{segment}' in path '{path}', got {found}")]
    TypeConflict {
        path: String,
        segment: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// One parsed path segment: a map key plus an optional array index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub key: String,
    pub index: Option<usize>,
}

/// Parse a full path into segments.
pub fn parse(path: &str) -> Result<Vec<Segment>, PathError> {
    path.split('.')
        .map(|raw| parse_segment(raw).ok_or_else(|| invalid(path, raw)))
        .collect()
}

fn parse_segment(raw: &str) -> Option<Segment> {
    match raw.find('[') {
        None => {
            if raw.is_empty() || raw.contains(']') {
                return None;
            }
            Some(Segment {
                key: raw.to_string(),
                index: None,
            })
        }
        Some(open) => {
            let key = &raw[..open];
            let index = raw[open + 1..].strip_suffix(']')?.parse::<usize>().ok()?;
            if key.is_empty() {
                return None;
            }
            Some(Segment {
                key: key.to_string(),
                index: Some(index),
            })
        }
    }
}

fn invalid(path: &str, segment: &str) -> PathError {
    PathError::InvalidPath {
        path: path.to_string(),
        segment: segment.to_string(),
    }
}

/// Human-readable name of a value's variant, used in conflict messages.
pub fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Join a base path and a relative sub-path.
pub fn join(base: &str, sub: &str) -> String {
    if base.is_empty() {
        sub.to_string()
    } else {
        format!("{base}.{sub}")
    }
}

/// Qualify the last segment of `path` with an index.
pub fn indexed(path: &str, index: usize) -> String {
    format!("{path}[{index}]")
}

/// Resolve a path. Returns `None` if any step is missing, out of range, or
/// of the wrong shape. Malformed paths never resolve.
pub fn get<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let segments = parse(path).ok()?;
    let mut current = doc;
    for segment in &segments {
        current = current.as_object()?.get(&segment.key)?;
        if let Some(index) = segment.index {
            current = current.as_array()?.get(index)?;
        }
    }
    Some(current)
}

/// Whether the value at `path` is present.
pub fn exists(doc: &Value, path: &str) -> bool {
    get(doc, path).is_some_and(is_present)
}

/// Presence test for an already-resolved value.
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

/// Trimmed string at `path`, or `""` when absent or not a string.
pub fn get_str<'a>(doc: &'a Value, path: &str) -> &'a str {
    get(doc, path).and_then(Value::as_str).map(str::trim).unwrap_or("")
}

/// Write `value` at `path`, creating intermediate maps and arrays where they
/// are absent. A `null` intermediate counts as absent.
///
/// Arrays are padded with `{}` when an intermediate index is out of range and
/// with `null` when the final index is. An existing intermediate of the wrong
/// shape yields [`PathError::TypeConflict`]; the document may already hold
/// containers created before the conflict, so callers write into a copy.
pub fn set(doc: &mut Value, path: &str, value: Value) -> Result<(), PathError> {
    let segments = parse(path)?;
    let last = segments.len() - 1;
    let mut current = doc;

    for (i, segment) in segments.iter().enumerate() {
        let is_last = i == last;
        let map = as_map_mut(current, path, "root")?;

        match segment.index {
            None if is_last => {
                map.insert(segment.key.clone(), value);
                return Ok(());
            }
            None => {
                let slot = map.entry(segment.key.clone()).or_insert(Value::Null);
                if slot.is_null() {
                    *slot = Value::Object(Map::new());
                }
                if !slot.is_object() {
                    return Err(conflict(path, &segment.key, "object", slot));
                }
                current = slot;
            }
            Some(index) => {
                let slot = map.entry(segment.key.clone()).or_insert(Value::Null);
                if slot.is_null() {
                    *slot = Value::Array(Vec::new());
                }
                let items = match slot {
                    Value::Array(items) => items,
                    other => return Err(conflict(path, &segment.key, "array", other)),
                };
                let filler = if is_last {
                    Value::Null
                } else {
                    Value::Object(Map::new())
                };
                while items.len() <= index {
                    items.push(filler.clone());
                }
                if is_last {
                    items[index] = value;
                    return Ok(());
                }
                let element = &mut items[index];
                if element.is_null() {
                    *element = Value::Object(Map::new());
                }
                if !element.is_object() {
                    let label = format!("{}[{}]", segment.key, index);
                    return Err(conflict(path, &label, "object", element));
                }
                current = element;
            }
        }
    }

    Ok(())
}

fn as_map_mut<'a>(
    value: &'a mut Value,
    path: &str,
    segment: &str,
) -> Result<&'a mut Map<String, Value>, PathError> {
    let found = kind_name(value);
    value.as_object_mut().ok_or_else(|| PathError::TypeConflict {
        path: path.to_string(),
        segment: segment.to_string(),
        expected: "object",
        found,
    })
}

fn conflict(path: &str, segment: &str, expected: &'static str, found: &Value) -> PathError {
    PathError::TypeConflict {
        path: path.to_string(),
        segment: segment.to_string(),
        expected,
        found: kind_name(found),
    }
}
