//! Canonical array shape for list-or-single fields.
//!
//! Callers may send `Package: {...}` or `Package: [{...}]`. After
//! canonicalization every declared list field whose parent exists is an
//! array of maps:
//!
//! | input                  | output            |
//! |------------------------|-------------------|
//! | `{...}`                | `[{...}]`         |
//! | `[]`                   | `[{}]`            |
//! | `[{...}, "x", null]`   | `[{...}, {}, {}]` |
//! | scalar                 | `[{}]`            |
//! | absent                 | `[{}]`            |
//!
//! A field whose parent chain is absent is left alone. The root and every
//! existing ancestor of a declared field must be maps.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::path::{self, kind_name};

/// A document whose skeleton cannot hold the declared fields.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CanonicalError {
    #[error("Malformed request: expected {expected} at '{path}', got {found}")]
    Malformed {
        path: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Return a canonicalized copy of `doc`.
pub fn canonicalize(doc: &Value, list_fields: &[String]) -> Result<Value, CanonicalError> {
    let mut out = doc.clone();
    if !out.is_object() {
        return Err(malformed("$", &out));
    }
    for field in list_fields {
        canonicalize_field(&mut out, field)?;
    }
    Ok(out)
}

fn canonicalize_field(doc: &mut Value, field: &str) -> Result<(), CanonicalError> {
    let (parent_path, key) = match field.rsplit_once('.') {
        Some((parent, key)) => (Some(parent), key),
        None => (None, field),
    };

    let mut parent = &mut *doc;
    let mut walked = String::new();
    if let Some(parent_path) = parent_path {
        for segment in parent_path.split('.') {
            walked = path::join(&walked, segment);
            let next = match parent.as_object_mut().and_then(|m| m.get_mut(segment)) {
                Some(next) if !next.is_null() => next,
                _ => return Ok(()),
            };
            if !next.is_object() {
                return Err(malformed(&walked, next));
            }
            parent = next;
        }
    }

    let Some(map) = parent.as_object_mut() else {
        return Ok(());
    };
    let current = map.entry(key).or_insert(Value::Null);
    let canonical = canonical_list(current.take());
    *current = canonical;
    Ok(())
}

fn canonical_list(value: Value) -> Value {
    let items = match value {
        Value::Object(map) => vec![Value::Object(map)],
        Value::Array(items) if items.is_empty() => vec![empty_item()],
        Value::Array(items) => items
            .into_iter()
            .map(|item| if item.is_object() { item } else { empty_item() })
            .collect(),
        _ => vec![empty_item()],
    };
    Value::Array(items)
}

fn empty_item() -> Value {
    Value::Object(Map::new())
}

fn malformed(path: &str, found: &Value) -> CanonicalError {
    CanonicalError::Malformed {
        path: path.to_string(),
        expected: "object",
        found: kind_name(found),
    }
}

/// Read-only list view used by detection and array expansion: a single map
/// is one item, an array yields its elements, anything else yields nothing.
pub fn items<'a>(doc: &'a Value, array_path: &str) -> Vec<&'a Value> {
    match path::get(doc, array_path) {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(single @ Value::Object(_)) => vec![single],
        _ => Vec::new(),
    }
}
