//! Schema-level transforms: dialect normalization, `$ref` inlining,
//! composition merging, traversal and structural matching.
//!
//! Schemas are plain `serde_json::Value` objects. Everything here either
//! rewrites a private working copy in place (the normalizer) or returns new
//! fragments, so caller-owned schemas are never touched.

mod matcher;
mod merge;
mod normalize;
mod refs;
mod traverse;

pub use matcher::schema_matches;
pub use merge::{merge_all_of, merge_schemas};
pub use normalize::normalize_schema;
pub use refs::resolve_refs;
pub use traverse::traverse_schema;

use serde_json::Value;

use crate::types::{ARRAY_KEYWORDS, MAP_KEYWORDS, SINGLE_KEYWORDS};

/// Prepare a schema for tree building without running the pipeline:
/// normalize, inline refs, then flatten `allOf`, all on a clone.
pub fn prepare_schema(schema: &Value) -> Value {
    let mut working = schema.clone();
    normalize_schema(&mut working);
    merge_all_of(&resolve_refs(&working))
}

/// Structural equality with JSON number semantics (`1 == 1.0`).
pub fn json_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if x == y {
                return true;
            }
            match (x.as_f64(), y.as_f64()) {
                (Some(fx), Some(fy)) => fx == fy,
                _ => false,
            }
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_equal(x, y))
        }
        (Value::Object(xm), Value::Object(ym)) => {
            xm.len() == ym.len()
                && xm
                    .iter()
                    .all(|(k, x)| ym.get(k).map_or(false, |y| json_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Visit every directly nested sub-schema of `schema` mutably.
///
/// Covers map keywords (`properties`, `$defs`, ...), single-schema keywords
/// (`items`, `not`, `if`, ...) when they hold an object, and array keywords
/// (`allOf`, `prefixItems`, ...).
pub(crate) fn for_each_subschema_mut(schema: &mut Value, mut f: impl FnMut(&mut Value)) {
    let Value::Object(map) = schema else {
        return;
    };
    for (key, child) in map.iter_mut() {
        let key = key.as_str();
        if MAP_KEYWORDS.contains(&key) {
            if let Value::Object(entries) = child {
                entries.values_mut().for_each(&mut f);
            }
        } else if SINGLE_KEYWORDS.contains(&key) {
            if child.is_object() {
                f(child);
            }
        } else if ARRAY_KEYWORDS.contains(&key) {
            if let Value::Array(items) = child {
                items.iter_mut().for_each(&mut f);
            }
        }
    }
}

/// Rebuild `schema` with every directly nested sub-schema passed through `f`.
pub(crate) fn map_subschemas(schema: &Value, mut f: impl FnMut(&Value) -> Value) -> Value {
    let mut result = schema.clone();
    for_each_subschema_mut(&mut result, |child| *child = f(child));
    result
}
