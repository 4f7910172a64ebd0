//! Canonical JSON encoding for deterministic hashing.
//!
//! Entry payloads are hashed, so the same logical payload must always
//! produce the same byte sequence: compact output, object keys sorted
//! lexicographically at every nesting level, array order preserved.
//!
//! The default `serde_json` map happens to sort keys already, but that is a
//! feature-flag accident (`preserve_order` flips it), so the ordering is
//! enforced here rather than assumed.

use serde_json::{Map, Value};

/// Encode a [`serde_json::Value`] as canonical JSON.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use annals_core::canonical::canonical_json;
///
/// let payload = json!({"user": "mallory", "action": {"kind": "rename", "from": "a.odt"}});
/// assert_eq!(
///     canonical_json(&payload),
///     r#"{"action":{"from":"a.odt","kind":"rename"},"user":"mallory"}"#
/// );
/// ```
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    normalize(value).to_string()
}

/// Rebuild the value with object keys inserted in sorted order, recursively.
fn normalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let sorted: Map<String, Value> = keys
                .into_iter()
                .filter_map(|k| map.get(k).map(|v| (k.clone(), normalize(v))))
                .collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        scalar => scalar.clone(),
    }
}
