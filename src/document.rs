//! Dotted-path access on JSON documents
//!
//! Documents flowing through the engine are plain JSON objects. Paths use
//! `.` as the separator (`items.f1.value`, `relations.r1.f2.value`).
//! Relation-qualified field ids (`r1#f2`) contain no dot and stay a single
//! segment.

use serde_json::{Map, Value};

/// A stored document
pub type Document = Value;

/// Reads the value at `path`, if present.
pub fn get_path<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(document, |current, segment| current.as_object()?.get(segment))
}

/// Writes `value` at `path`, creating intermediate objects as needed.
///
/// A non-object value found on the way is replaced by an object.
pub fn set_path(document: &mut Value, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut current = document;
    for segment in parents {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        current = match current {
            Value::Object(map) => map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            _ => return,
        };
    }

    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Value::Object(map) = current {
        map.insert(last.to_string(), value);
    }
}

/// Removes the value at `path`, returning it.
pub fn remove_path(document: &mut Value, path: &str) -> Option<Value> {
    let (parent, last) = match path.rsplit_once('.') {
        Some((parent, last)) => (get_path_mut(document, parent)?, last),
        None => (document, path),
    };
    parent.as_object_mut()?.remove(last)
}

fn get_path_mut<'a>(document: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('.')
        .try_fold(document, |current, segment| current.as_object_mut()?.get_mut(segment))
}

/// Canonical text key for a tuple of values (used for grouping and joins).
pub fn tuple_key(values: &[Option<&Value>]) -> String {
    let normalized: Vec<Value> = values
        .iter()
        .map(|v| v.cloned().map(canonical_number).unwrap_or(Value::Null))
        .collect();
    serde_json::to_string(&normalized).unwrap_or_default()
}

/// Integers and floats with the same numeric value compare equal in keys.
fn canonical_number(value: Value) -> Value {
    match value {
        Value::Number(n) => n
            .as_f64()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Number(n)),
        Value::Array(items) => Value::Array(items.into_iter().map(canonical_number).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, canonical_number(v)))
                .collect(),
        ),
        other => other,
    }
}
