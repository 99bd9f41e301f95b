//! Value helpers for input bindings: type coercion and default seeding.

use serde_json::{Map, Number, Value};
use tracing::trace;

use crate::types::SchemaType;

/// Convert `value` toward `target`. Values that cannot be converted come back
/// unchanged; `null` always passes through.
///
/// ```
/// use formica::{coerce_value, SchemaType};
/// use serde_json::json;
///
/// assert_eq!(coerce_value(&json!("42"), SchemaType::Number), json!(42));
/// assert_eq!(coerce_value(&json!("abc"), SchemaType::Number), json!("abc"));
/// ```
pub fn coerce_value(value: &Value, target: SchemaType) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    let coerced = match target {
        SchemaType::String => Some(to_string(value)),
        SchemaType::Number => match value {
            Value::String(s) => parse_number(s),
            _ => None,
        },
        SchemaType::Integer => match value {
            Value::String(s) => parse_int_prefix(s).map(Value::from),
            Value::Number(n) => truncate(n),
            _ => None,
        },
        SchemaType::Boolean => to_bool(value).map(Value::Bool),
        SchemaType::Null => Some(Value::Null),
        SchemaType::Object | SchemaType::Array => None,
    };
    coerced.unwrap_or_else(|| {
        trace!(target_type = %target, "value left as is");
        value.clone()
    })
}

/// The value a fresh field starts with: `default`, else `const`.
pub fn default_value(schema: &Value) -> Option<Value> {
    schema.get("default").or_else(|| schema.get("const")).cloned()
}

/// Fill absent data from schema defaults.
///
/// Present, non-null data is returned as is. Otherwise the schema `default`
/// wins; failing that, an object schema yields an object of its properties'
/// seeded defaults (or nothing if none of them has one).
pub fn seed_defaults(schema: &Value, data: Option<&Value>) -> Option<Value> {
    if let Some(present) = data.filter(|d| !d.is_null()) {
        return Some(present.clone());
    }
    if let Some(default) = schema.get("default") {
        return Some(default.clone());
    }

    let primary = SchemaType::list_from_schema(schema).and_then(|types| types.first().copied());
    let Some(SchemaType::Object) = primary else {
        return None;
    };
    let properties = schema.get("properties")?.as_object()?;

    let seeded: Map<String, Value> = properties
        .iter()
        .filter_map(|(key, prop)| seed_defaults(prop, None).map(|v| (key.clone(), v)))
        .collect();
    (!seeded.is_empty()).then_some(Value::Object(seeded))
}

// --- Internal implementation ---

fn to_string(value: &Value) -> Value {
    match value {
        Value::String(_) => value.clone(),
        other => Value::String(other.to_string()),
    }
}

/// Whole results are stored as integers so `"3"` becomes `3`, not `3.0`.
fn parse_number(s: &str) -> Option<Value> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Some(Value::from(0));
    }
    let n: f64 = trimmed.parse().ok()?;
    if !n.is_finite() {
        return None;
    }
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        return Some(Value::from(n as i64));
    }
    Number::from_f64(n).map(Value::Number)
}

/// Leading optional sign and digits, ignoring whatever follows (`"42.7"` is 42).
fn parse_int_prefix(s: &str) -> Option<i64> {
    let trimmed = s.trim_start();
    let (sign, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (-1, &trimmed[1..]),
        Some(b'+') => (1, &trimmed[1..]),
        _ => (1, trimmed),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

fn truncate(n: &Number) -> Option<Value> {
    if n.is_i64() || n.is_u64() {
        return Some(Value::Number(n.clone()));
    }
    let f = n.as_f64()?.trunc();
    (f.abs() < i64::MAX as f64).then(|| Value::from(f as i64))
}

fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::String(s) if s == "true" => Some(true),
        Value::String(s) if s == "false" || s.is_empty() => Some(false),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f == 1.0 => Some(true),
            Some(f) if f == 0.0 => Some(false),
            _ => None,
        },
        Value::Bool(b) => Some(*b),
        _ => None,
    }
}
