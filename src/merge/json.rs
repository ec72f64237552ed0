//! JSON path navigation
//!
//! Writes values into a `serde_json::Value` at a parsed dotted path, creating
//! missing objects and arrays along the way.

use serde_json::{Map, Value as JsonValue};

use super::{parse_path, PathSegment};
use crate::error::{Error, Result};

/// Largest array length a path may create.
pub const MAX_ARRAY_LEN: usize = 1 << 16;

/// Navigate to a specific path within a JSON value, creating intermediate
/// structures as needed.
///
/// A `Key` segment needs an object (or null, which becomes one). An `Index`
/// segment on null creates an array padded with nulls; on an existing object
/// it is used as a plain key, so numeric object keys survive.
///
/// # Errors
///
/// Returns `Error::Key` if the path runs into a scalar, or if an array index
/// is not below [`MAX_ARRAY_LEN`].
pub fn navigate_json_value<'a>(
    value: &'a mut JsonValue,
    path: &[PathSegment],
) -> Result<&'a mut JsonValue> {
    let mut current = value;
    for segment in path {
        if current.is_null() {
            *current = match segment {
                PathSegment::Key(_) => JsonValue::Object(Map::new()),
                PathSegment::Index(_) => JsonValue::Array(Vec::new()),
            };
        }

        current = match (current, segment) {
            (JsonValue::Object(map), segment) => {
                map.entry(segment.as_key()).or_insert(JsonValue::Null)
            }
            (JsonValue::Array(_), PathSegment::Index(idx)) if *idx >= MAX_ARRAY_LEN => {
                return Err(Error::Key {
                    message: format!(
                        "array index {} exceeds the limit of {} elements",
                        idx, MAX_ARRAY_LEN
                    ),
                });
            }
            (JsonValue::Array(array), PathSegment::Index(idx)) => {
                while array.len() <= *idx {
                    array.push(JsonValue::Null);
                }
                &mut array[*idx]
            }
            (other, segment) => {
                return Err(Error::Key {
                    message: format!(
                        "cannot descend into {} with segment '{}'",
                        kind_name(other),
                        segment.as_key()
                    ),
                });
            }
        };
    }

    Ok(current)
}

/// Set `leaf` at the dotted `path` inside `root`.
pub fn set_path(root: &mut JsonValue, path: &str, leaf: JsonValue) -> Result<()> {
    let segments = parse_path(path);
    let target = navigate_json_value(root, &segments)?;
    if target.is_object() || target.is_array() {
        return Err(Error::Key {
            message: format!("path '{}' already holds a container", path),
        });
    }
    *target = leaf;
    Ok(())
}

fn kind_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_creates_nested_objects() {
        let mut root = JsonValue::Null;
        set_path(&mut root, "database.connection.host", json!("db1")).unwrap();
        assert_eq!(root, json!({"database": {"connection": {"host": "db1"}}}));
    }

    #[test]
    fn test_set_creates_arrays_for_indices() {
        let mut root = JsonValue::Null;
        set_path(&mut root, "deployment_info.1.hostname", json!("h2")).unwrap();
        set_path(&mut root, "deployment_info.0.hostname", json!("h1")).unwrap();
        assert_eq!(
            root,
            json!({"deployment_info": [{"hostname": "h1"}, {"hostname": "h2"}]})
        );
    }

    #[test]
    fn test_huge_index_rejected_without_allocating() {
        let mut root = JsonValue::Null;
        let err = set_path(&mut root, "deployment_info.2000000.PORT", json!("1")).unwrap_err();
        assert!(matches!(err, Error::Key { .. }), "{err}");

        let mut root = JsonValue::Null;
        let path = format!("slots.{}", usize::MAX);
        assert!(set_path(&mut root, &path, json!("x")).is_err());
    }

    #[test]
    fn test_index_just_below_limit_is_accepted() {
        let mut root = JsonValue::Null;
        let path = format!("slots.{}", MAX_ARRAY_LEN - 1);
        set_path(&mut root, &path, json!("x")).unwrap();
        assert_eq!(root["slots"].as_array().map(Vec::len), Some(MAX_ARRAY_LEN));
    }

    #[test]
    fn test_numeric_key_on_existing_object() {
        let mut root = json!({"slots": {"a": "x"}});
        set_path(&mut root, "slots.7", json!("y")).unwrap();
        assert_eq!(root, json!({"slots": {"a": "x", "7": "y"}}));
    }

    #[test]
    fn test_descend_into_scalar_fails() {
        let mut root = json!({"foo": 42});
        assert!(set_path(&mut root, "foo.bar", json!(1)).is_err());
    }

    #[test]
    fn test_overwrite_container_fails() {
        let mut root = json!({"foo": {"bar": 1}});
        assert!(set_path(&mut root, "foo", json!("x")).is_err());
    }
}
