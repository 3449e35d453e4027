//! Structural merge and partial match over JSON trees.

use serde_json::Value;

/// Recursively merge `overrides` into `target`. Objects merge key by key,
/// lists merge element by element, anything else is replaced.
pub fn deep_merge(target: &mut Value, overrides: &Value) {
    match (target, overrides) {
        (Value::Object(base), Value::Object(over)) => {
            for (key, value) in over {
                match base.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (Value::Array(base), Value::Array(over)) => {
            for (i, value) in over.iter().enumerate() {
                match base.get_mut(i) {
                    Some(existing) => deep_merge(existing, value),
                    None => base.push(value.clone()),
                }
            }
        }
        (slot, value) => *slot = value.clone(),
    }
}

/// True if every part of `pattern` is present in `value`. Objects may carry
/// extra keys and every list element of the pattern must match some element
/// of the value list.
pub fn is_match(value: &Value, pattern: &Value) -> bool {
    match (value, pattern) {
        (Value::Object(v), Value::Object(p)) => p
            .iter()
            .all(|(key, expected)| v.get(key).is_some_and(|actual| is_match(actual, expected))),
        (Value::Array(v), Value::Array(p)) => {
            p.len() <= v.len() && p.iter().all(|expected| v.iter().any(|actual| is_match(actual, expected)))
        }
        (v, p) => v == p,
    }
}
