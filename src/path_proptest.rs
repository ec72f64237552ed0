//! Property-based tests for keys, flattening, and path-set.
//!
//! These tests use proptest to generate random inputs and verify that
//! invariants hold for all possible inputs.

#[cfg(test)]
mod proptest_tests {
    use crate::flatten::{flatten, format_number};
    use crate::merge::json::set_path;
    use crate::path::{node_key, template_key, ConfigKey};
    use proptest::prelude::*;
    use serde_json::{Map, Number, Value as JsonValue};

    fn component() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9_.-]{1,12}"
    }

    fn object_key() -> impl Strategy<Value = String> {
        "[a-z_][a-z0-9_]{0,7}"
    }

    /// Nested objects whose leaves are strings or scalar-string arrays.
    fn document() -> impl Strategy<Value = JsonValue> {
        let leaf = prop_oneof![
            "[ -~]{0,10}".prop_map(JsonValue::String),
            prop::collection::vec("[a-z0-9]{1,5}", 0..4).prop_map(|items| {
                JsonValue::Array(items.into_iter().map(JsonValue::String).collect())
            }),
        ];
        let value = leaf.prop_recursive(3, 24, 4, |inner| {
            prop::collection::btree_map(object_key(), inner, 1..4)
                .prop_map(|map| JsonValue::Object(map.into_iter().collect::<Map<_, _>>()))
        });
        prop::collection::btree_map(object_key(), value, 1..4)
            .prop_map(|map| JsonValue::Object(map.into_iter().collect::<Map<_, _>>()))
    }

    // ============================================================================
    // ConfigKey property tests
    // ============================================================================

    proptest! {
        /// Property: display then parse yields the same key
        #[test]
        fn key_display_parse_roundtrip(components in prop::collection::vec(component(), 1..8)) {
            let key = ConfigKey::new(components.clone()).unwrap();
            let reparsed = ConfigKey::parse(&key.to_string()).unwrap();
            prop_assert_eq!(reparsed.components(), components.as_slice());
            prop_assert_eq!(reparsed, key);
        }

        /// Property: rebasing there and back is the identity
        #[test]
        fn rebase_is_reversible(
            user in "[a-z]{1,8}",
            tag in "[0-9]{1,3}\\.[0-9]{1,3}\\.[0-9]{1,3}",
            env in "[0-9]{1,3}",
            cluster in component(),
            name in component(),
        ) {
            let staged = template_key(&user, &env, &cluster, &name).unwrap();
            let committed = staged.rebase(&user, &tag).unwrap();
            prop_assert_eq!(committed.namespace(), tag.as_str());
            prop_assert_eq!(&committed.components()[1..], &staged.components()[1..]);
            prop_assert_eq!(committed.kind(), staged.kind());
            prop_assert_eq!(committed.rebase(&tag, &user).unwrap(), staged);
        }

        /// Property: rebasing from the wrong namespace always fails
        #[test]
        fn rebase_from_foreign_namespace_fails(
            user in "[a-z]{1,8}",
            other in "[A-Z]{1,8}",
        ) {
            let key = node_key(&user, "1", "web", "0", "0", "app.ini").unwrap();
            prop_assert!(key.rebase(&other, "1.0.0").is_err());
        }

        /// Property: a component containing '/' is never accepted
        #[test]
        fn slash_in_component_rejected(left in "[a-z]{0,5}", right in "[a-z]{0,5}") {
            let bad = format!("{}/{}", left, right);
            prop_assert!(ConfigKey::new(["alice".to_string(), bad]).is_err());
        }
    }

    // ============================================================================
    // flatten / set_path property tests
    // ============================================================================

    proptest! {
        /// Property: writing every flattened leaf back with set_path rebuilds
        /// a document that flattens to the same map
        #[test]
        fn flatten_set_path_roundtrip(doc in document()) {
            let flat = flatten(&doc);
            let mut rebuilt = JsonValue::Null;
            for (path, leaf) in &flat {
                set_path(&mut rebuilt, path, JsonValue::String(leaf.clone())).unwrap();
            }
            prop_assert_eq!(flatten(&rebuilt), flat);
        }

        /// Property: flattening is deterministic
        #[test]
        fn flatten_is_deterministic(doc in document()) {
            prop_assert_eq!(flatten(&doc), flatten(&doc));
        }

        /// Property: integers format exactly
        #[test]
        fn integers_format_exactly(n in any::<i64>()) {
            prop_assert_eq!(format_number(&Number::from(n)), n.to_string());
        }

        /// Property: floats round to the nearest integer
        #[test]
        fn floats_round_to_nearest(f in -1.0e6f64..1.0e6f64) {
            let n = Number::from_f64(f).unwrap();
            let formatted = format_number(&n);
            let parsed: i64 = formatted.parse().unwrap();
            prop_assert!((parsed as f64 - f).abs() <= 0.5, "{} -> {}", f, formatted);
        }
    }
}
