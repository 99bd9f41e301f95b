//! Rewrite legacy (draft-07 era) keywords into the 2020-12 forms the rest of
//! the pipeline understands.

use serde_json::{Map, Value};

use super::for_each_subschema_mut;

/// Normalize a schema in place, recursing into every nested schema.
///
/// Operates on a working copy owned by the caller:
/// - `definitions` becomes `$defs` (unless `$defs` already exists)
/// - tuple `items` becomes `prefixItems`, with `additionalItems` as `items`
/// - boolean `exclusiveMinimum`/`exclusiveMaximum` become numeric
/// - `dependencies` splits into `dependentRequired` and `dependentSchemas`
pub fn normalize_schema(schema: &mut Value) {
    let Value::Object(map) = schema else {
        return;
    };

    if !map.contains_key("$defs") {
        if let Some(defs) = map.remove("definitions") {
            map.insert("$defs".to_string(), defs);
        }
    }

    normalize_tuple_items(map);
    normalize_exclusive_bound(map, "exclusiveMinimum", "minimum");
    normalize_exclusive_bound(map, "exclusiveMaximum", "maximum");
    normalize_dependencies(map);

    for_each_subschema_mut(schema, normalize_schema);
}

fn normalize_tuple_items(map: &mut Map<String, Value>) {
    if !map.get("items").map_or(false, Value::is_array) {
        return;
    }
    let Some(tuple) = map.remove("items") else {
        return;
    };
    map.insert("prefixItems".to_string(), tuple);

    match map.remove("additionalItems") {
        Some(Value::Bool(false)) => {
            map.insert("items".to_string(), Value::Bool(false));
        }
        Some(Value::Bool(true)) => {
            map.insert("items".to_string(), Value::Object(Map::new()));
        }
        Some(schema) => {
            map.insert("items".to_string(), schema);
        }
        // No additionalItems: items stays absent (anything goes)
        None => {}
    }
}

fn normalize_exclusive_bound(map: &mut Map<String, Value>, exclusive: &str, bound: &str) {
    let Some(&Value::Bool(flag)) = map.get(exclusive) else {
        return;
    };
    if flag && map.contains_key(bound) {
        if let Some(limit) = map.remove(bound) {
            map.insert(exclusive.to_string(), limit);
        }
    } else {
        map.remove(exclusive);
    }
}

fn normalize_dependencies(map: &mut Map<String, Value>) {
    let Some(Value::Object(deps)) = map.remove("dependencies") else {
        return;
    };
    for (key, dep) in deps {
        let target = if dep.is_array() {
            "dependentRequired"
        } else {
            "dependentSchemas"
        };
        let entry = map
            .entry(target)
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(entries) = entry {
            entries.insert(key, dep);
        }
    }
}
