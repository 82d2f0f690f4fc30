//! Length and shape bounds for user-controlled input
//!
//! Everything that reaches the hit store passes through one of these.
//! The output is bounded, not escaped: consumers must still treat it as
//! untrusted text.

use serde_json::{Map, Value};

pub const DEFAULT_MAX_DEPTH: usize = 3;

const MAX_KEY_LEN: usize = 50;
const MAX_FLAT_VALUE_LEN: usize = 200;
const MAX_FLAT_ARRAY_ITEMS: usize = 10;
const MAX_NESTED_STRING_LEN: usize = 500;
const MAX_NESTED_ARRAY_ITEMS: usize = 20;
const MAX_NESTED_ARRAY_STRING_LEN: usize = 200;

/// Truncate to `max_len` characters and strip NUL bytes.
pub fn sanitize_str(input: &str, max_len: usize) -> String {
    input
        .chars()
        .take(max_len)
        .filter(|&c| c != '\0')
        .collect()
}

/// Clean a flat key/value map such as a parsed query string.
///
/// Scalars become strings capped at 200 characters, arrays keep their
/// first 10 items (each stringified and capped).
pub fn sanitize_flat_map(params: &Map<String, Value>) -> Map<String, Value> {
    let mut sanitized = Map::new();
    for (key, value) in params {
        let key = sanitize_str(key, MAX_KEY_LEN);
        if key.is_empty() {
            continue;
        }

        let value = match value {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .take(MAX_FLAT_ARRAY_ITEMS)
                    .map(|item| Value::String(sanitize_str(&scalar_text(item), MAX_FLAT_VALUE_LEN)))
                    .collect(),
            ),
            other => Value::String(sanitize_str(&scalar_text(other), MAX_FLAT_VALUE_LEN)),
        };
        sanitized.insert(key, value);
    }
    sanitized
}

/// Clean a nested JSON object down to `max_depth` levels.
///
/// At depth zero the result is an empty object, never the input.
/// Nulls inside objects are dropped.
pub fn sanitize_nested(obj: &Map<String, Value>, max_depth: usize) -> Map<String, Value> {
    let mut sanitized = Map::new();
    if max_depth == 0 {
        return sanitized;
    }

    for (key, value) in obj {
        let key = sanitize_str(key, MAX_KEY_LEN);
        if key.is_empty() {
            continue;
        }

        let value = match value {
            Value::String(s) => Value::String(sanitize_str(s, MAX_NESTED_STRING_LEN)),
            Value::Number(_) | Value::Bool(_) => value.clone(),
            Value::Object(inner) => Value::Object(sanitize_nested(inner, max_depth - 1)),
            Value::Array(items) => Value::Array(sanitize_nested_array(items, max_depth - 1)),
            Value::Null => continue,
        };
        sanitized.insert(key, value);
    }
    sanitized
}

fn sanitize_nested_array(items: &[Value], max_depth: usize) -> Vec<Value> {
    items
        .iter()
        .take(MAX_NESTED_ARRAY_ITEMS)
        .map(|item| match item {
            Value::String(s) => Value::String(sanitize_str(s, MAX_NESTED_ARRAY_STRING_LEN)),
            Value::Object(inner) => Value::Object(sanitize_nested(inner, max_depth)),
            Value::Array(_) if max_depth == 0 => Value::Array(Vec::new()),
            Value::Array(inner) => Value::Array(sanitize_nested_array(inner, max_depth - 1)),
            scalar => scalar.clone(),
        })
        .collect()
}

/// Text form of a JSON value as it would appear in a query string.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_sanitize_str_truncates_and_strips_nul() {
        assert_eq!(sanitize_str("abc\0def", 255), "abcdef");
        assert_eq!(sanitize_str("abcdef", 3), "abc");
        assert_eq!(sanitize_str("", 10), "");
    }

    #[test]
    fn test_sanitize_str_counts_characters_not_bytes() {
        assert_eq!(sanitize_str("héllo wörld", 5), "héllo");
    }

    #[test]
    fn test_flat_map_bounds() {
        let long_key = "k".repeat(80);
        let input = as_map(json!({
            long_key.clone(): "v",
            "": "dropped",
            "utm": "x".repeat(300),
            "tags": (0..15).map(|i| i.to_string()).collect::<Vec<_>>(),
            "n": 5,
        }));

        let out = sanitize_flat_map(&input);

        assert!(out.contains_key(&"k".repeat(50)));
        assert!(!out.contains_key(""));
        assert_eq!(out["utm"].as_str().unwrap().len(), 200);
        assert_eq!(out["tags"].as_array().unwrap().len(), 10);
        assert_eq!(out["n"], json!("5"));
    }

    #[test]
    fn test_nested_depth_limit_yields_empty_object() {
        let input = as_map(json!({"a": {"b": {"c": {"d": "deep"}}}}));

        let out = sanitize_nested(&input, 3);
        assert_eq!(Value::Object(out), json!({"a": {"b": {"c": {}}}}));

        assert!(sanitize_nested(&input, 0).is_empty());
    }

    #[test]
    fn test_nested_arrays_do_not_leak_deep_objects() {
        let input = as_map(json!({"list": [{"x": {"y": {"z": 1}}}]}));
        let out = sanitize_nested(&input, 2);
        assert_eq!(Value::Object(out), json!({"list": [{"x": {}}]}));
    }

    #[test]
    fn test_nested_scalars_and_nulls() {
        let input = as_map(json!({
            "s": "y".repeat(600),
            "n": 1.5,
            "b": true,
            "gone": null,
            "arr": (0..30).collect::<Vec<_>>(),
        }));

        let out = sanitize_nested(&input, DEFAULT_MAX_DEPTH);

        assert_eq!(out["s"].as_str().unwrap().len(), 500);
        assert_eq!(out["n"], json!(1.5));
        assert_eq!(out["b"], json!(true));
        assert!(!out.contains_key("gone"));
        assert_eq!(out["arr"].as_array().unwrap().len(), 20);
    }

    #[test]
    fn test_sanitizers_are_idempotent() {
        let flat = as_map(json!({
            "q": "a\0b",
            "many": ["1", 2, "x".repeat(250)],
            "k".repeat(60): true,
        }));
        let once = sanitize_flat_map(&flat);
        assert_eq!(sanitize_flat_map(&once), once);

        let nested = as_map(json!({
            "a": {"b": {"c": {"d": 1}}, "list": [1, "two", {"x": [1, [2, [3]]]}]},
            "s": "z".repeat(700),
        }));
        let once = sanitize_nested(&nested, DEFAULT_MAX_DEPTH);
        assert_eq!(sanitize_nested(&once, DEFAULT_MAX_DEPTH), once);

        let text = sanitize_str(&"é\0".repeat(300), 255);
        assert_eq!(sanitize_str(&text, 255), text);
    }
}
