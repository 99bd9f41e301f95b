//! Combining schema fragments: pairwise merge and `allOf` flattening.

use serde_json::{Map, Value};

use super::{json_equal, map_subschemas};

/// Keywords where the larger bound is the tighter one.
const LOWER_BOUNDS: &[&str] = &[
    "minimum",
    "exclusiveMinimum",
    "minLength",
    "minItems",
    "minProperties",
];

/// Keywords where the smaller bound is the tighter one.
const UPPER_BOUNDS: &[&str] = &[
    "maximum",
    "exclusiveMaximum",
    "maxLength",
    "maxItems",
    "maxProperties",
];

/// Composition keywords: the first fragment to declare one keeps it.
const FIRST_WRITER_WINS: &[&str] = &["oneOf", "anyOf", "if", "then", "else", "not"];

/// Merge two schema fragments. `b` takes precedence on conflicts.
///
/// - `type` and `enum` are intersected
/// - `properties`, `required`, `dependentSchemas`, `dependentRequired` are unioned
/// - numeric bounds keep the tightest value
/// - `items` and `additionalProperties` merge recursively when both are schemas
/// - composition keywords keep `a`'s value when present
/// - any other keyword from `b` overwrites `a`
///
/// Non-object inputs: the other side is returned (boolean schemas do not merge).
pub fn merge_schemas(a: &Value, b: &Value) -> Value {
    let (Value::Object(a_map), Value::Object(b_map)) = (a, b) else {
        return if b.is_object() { b.clone() } else { a.clone() };
    };

    let mut result = a_map.clone();
    for (key, b_val) in b_map {
        let merged = match key.as_str() {
            "type" => merge_type(result.get("type"), b_val),
            "properties" => merge_schema_maps(result.get("properties"), b_val),
            "dependentSchemas" => merge_schema_maps(result.get("dependentSchemas"), b_val),
            "required" => union_lists(result.get("required"), b_val),
            "dependentRequired" => merge_required_maps(result.get("dependentRequired"), b_val),
            "enum" => intersect_enum(result.get("enum"), b_val),
            "items" | "additionalProperties" => match result.get(key.as_str()) {
                Some(a_val) if a_val.is_object() && b_val.is_object() => merge_schemas(a_val, b_val),
                _ => b_val.clone(),
            },
            k if LOWER_BOUNDS.contains(&k) => pick_bound(result.get(k), b_val, |x, y| x >= y),
            k if UPPER_BOUNDS.contains(&k) => pick_bound(result.get(k), b_val, |x, y| x <= y),
            k if FIRST_WRITER_WINS.contains(&k) => {
                if result.contains_key(k) {
                    continue;
                }
                b_val.clone()
            }
            _ => b_val.clone(),
        };
        result.insert(key.clone(), merged);
    }
    Value::Object(result)
}

/// Flatten `allOf` everywhere in the schema, returning a new schema.
///
/// Nested locations are flattened first; then the node's own `allOf` list is
/// folded into the node (minus `allOf`) left to right with [`merge_schemas`].
pub fn merge_all_of(schema: &Value) -> Value {
    if !schema.is_object() {
        return schema.clone();
    }
    let mut result = map_subschemas(schema, merge_all_of);

    let Some(Value::Array(parts)) = result.as_object_mut().and_then(|m| m.remove("allOf")) else {
        return result;
    };
    for part in &parts {
        result = merge_schemas(&result, part);
    }
    result
}

// --- Internal implementation ---

fn merge_type(a: Option<&Value>, b: &Value) -> Value {
    let Some(a) = a else {
        return b.clone();
    };
    let a_types = as_list(a);
    let b_types = as_list(b);
    let mut common: Vec<Value> = a_types
        .into_iter()
        .filter(|t| b_types.contains(t))
        .collect();
    if common.len() == 1 {
        common.remove(0)
    } else {
        Value::Array(common)
    }
}

fn as_list(v: &Value) -> Vec<Value> {
    match v {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

fn merge_schema_maps(a: Option<&Value>, b: &Value) -> Value {
    let Value::Object(b_map) = b else {
        return b.clone();
    };
    let mut result = match a {
        Some(Value::Object(a_map)) => a_map.clone(),
        _ => Map::new(),
    };
    for (key, b_sub) in b_map {
        let merged = match result.get(key) {
            Some(a_sub) => merge_schemas(a_sub, b_sub),
            None => b_sub.clone(),
        };
        result.insert(key.clone(), merged);
    }
    Value::Object(result)
}

fn union_lists(a: Option<&Value>, b: &Value) -> Value {
    let mut out: Vec<Value> = match a {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    };
    if let Value::Array(items) = b {
        for item in items {
            if !out.contains(item) {
                out.push(item.clone());
            }
        }
    }
    Value::Array(out)
}

fn merge_required_maps(a: Option<&Value>, b: &Value) -> Value {
    let Value::Object(b_map) = b else {
        return b.clone();
    };
    let mut result = match a {
        Some(Value::Object(a_map)) => a_map.clone(),
        _ => Map::new(),
    };
    for (key, b_list) in b_map {
        let merged = union_lists(result.get(key), b_list);
        result.insert(key.clone(), merged);
    }
    Value::Object(result)
}

fn intersect_enum(a: Option<&Value>, b: &Value) -> Value {
    match (a, b) {
        (Some(Value::Array(a_items)), Value::Array(b_items)) => Value::Array(
            a_items
                .iter()
                .filter(|v| b_items.iter().any(|w| json_equal(v, w)))
                .cloned()
                .collect(),
        ),
        _ => b.clone(),
    }
}

/// Keep `a` when `keep_a(a, b)` holds, else `b`. Non-numeric `a` loses.
fn pick_bound(a: Option<&Value>, b: &Value, keep_a: impl Fn(f64, f64) -> bool) -> Value {
    match (a.and_then(Value::as_f64), b.as_f64()) {
        (Some(x), Some(y)) if keep_a(x, y) => a.cloned().unwrap_or(Value::Null),
        _ => b.clone(),
    }
}
