//! Partial ("derivative") equality between a desired and a live object
//!
//! The desired side is a declaration of intent: every field it sets must be
//! equal on the live side, every field it leaves unset is ignored. This lets
//! API server defaulting and admission mutations coexist with the operator
//! without being reported as drift.
//!
//! Both sides are compared in their serialized form, where an unset optional
//! field is either absent or `null`.

use serde_json::Value;

/// Returns true when every field set on `desired` matches `live`.
///
/// Rules, applied recursively:
/// - `null` or an empty string on the desired side matches anything
/// - objects: each key of `desired` must match the same key of `live`
/// - arrays: an empty desired array matches anything; otherwise the live
///   array may be longer (entries appended by admission webhooks) and its
///   leading elements must match element-wise
/// - numbers and booleans: plain equality
pub fn derivative_eq(desired: &Value, live: &Value) -> bool {
    match (desired, live) {
        (Value::Null, _) => true,
        (Value::String(d), _) if d.is_empty() => true,
        (Value::String(d), Value::String(l)) => d == l,
        (Value::Object(d), Value::Object(l)) => d
            .iter()
            .all(|(key, value)| derivative_eq(value, l.get(key).unwrap_or(&Value::Null))),
        (Value::Array(d), _) if d.is_empty() => true,
        (Value::Array(d), Value::Array(l)) => {
            d.len() <= l.len() && d.iter().zip(l).all(|(d, l)| derivative_eq(d, l))
        }
        (Value::Number(d), Value::Number(l)) => numbers_eq(d, l),
        (Value::Bool(d), Value::Bool(l)) => d == l,
        _ => false,
    }
}

// Integers from the API server may come back as floats after a round trip
// through other tooling.
fn numbers_eq(d: &serde_json::Number, l: &serde_json::Number) -> bool {
    match (d.as_i64(), l.as_i64()) {
        (Some(d), Some(l)) => d == l,
        _ => d.as_f64() == l.as_f64(),
    }
}
