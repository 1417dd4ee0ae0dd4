//! JSON normalization for numeric payloads.

use serde_json::Value;

/// Replaces every non-finite number in a JSON value with `null`,
/// recursively.
///
/// JSON has no representation for NaN or infinity. `serde_json` already
/// maps non-finite floats to `null` when building a [`Value`]; this pass
/// enforces the same invariant on payloads assembled by hand before they
/// are written to the store.
#[must_use]
pub fn scrub_json(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, scrub_json(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(scrub_json).collect()),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() || n.as_f64().is_some_and(f64::is_finite) {
                Value::Number(n)
            } else {
                Value::Null
            }
        }
        other => other,
    }
}
