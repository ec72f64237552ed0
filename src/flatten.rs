//! Document projection
//!
//! Flattens an arbitrary JSON value into a map from dotted path to leaf
//! string. This map is the vocabulary templates and the lookup resolver work
//! with; it is derived on demand and never persisted.
//!
//! Rules, applied by recursive descent:
//!
//! - string / bool leaf: stored verbatim at the current path
//! - number leaf: rounded half-up to an integer (`3.5` becomes `"4"`)
//! - array of scalars only: one entry at the array's own path holding the
//!   comma-joined elements (checked before generic recursion)
//! - any other array: one level per numeric index (`servers.0.host`)
//! - object: one level per key (`database.port`)
//! - null: no entry
//!
//! Callers must not rely on iteration order for anything but display.

use std::collections::BTreeMap;

use serde_json::{Number, Value as JsonValue};

use crate::error::Result;

/// Dotted path to leaf value.
pub type FlatMap = BTreeMap<String, String>;

/// Parse raw bytes as JSON and flatten them.
pub fn flatten_bytes(bytes: &[u8]) -> Result<FlatMap> {
    let value: JsonValue = serde_json::from_slice(bytes)?;
    Ok(flatten(&value))
}

/// Flatten a parsed JSON value.
pub fn flatten(value: &JsonValue) -> FlatMap {
    let mut out = FlatMap::new();
    descend(value, "", &mut out);
    out
}

fn descend(value: &JsonValue, path: &str, out: &mut FlatMap) {
    match value {
        JsonValue::Null => {}
        JsonValue::Array(items) if items.iter().all(is_scalar) => {
            let joined: Vec<String> = items.iter().filter_map(scalar_to_string).collect();
            out.insert(path.to_string(), joined.join(","));
        }
        JsonValue::Array(items) => {
            for (idx, item) in items.iter().enumerate() {
                descend(item, &join(path, &idx.to_string()), out);
            }
        }
        JsonValue::Object(map) => {
            for (key, item) in map {
                descend(item, &join(path, key), out);
            }
        }
        scalar => {
            if let Some(leaf) = scalar_to_string(scalar) {
                out.insert(path.to_string(), leaf);
            }
        }
    }
}

fn is_scalar(value: &JsonValue) -> bool {
    matches!(
        value,
        JsonValue::String(_) | JsonValue::Number(_) | JsonValue::Bool(_)
    )
}

fn scalar_to_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(format_number(n)),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", path, segment)
    }
}

/// Format a JSON number as an integer string, rounding half up.
pub fn format_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    let f = n.as_f64().unwrap_or_default();
    let rounded = (f + 0.5).floor();
    // avoid printing "-0"
    if rounded == 0.0 {
        "0".to_string()
    } else {
        format!("{:.0}", rounded)
    }
}
