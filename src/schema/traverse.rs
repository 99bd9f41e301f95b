use serde_json::Value;

use crate::types::{ARRAY_KEYWORDS, MAP_KEYWORDS, SINGLE_KEYWORDS};

/// Walk a schema depth-first, calling `visitor` on every schema object with
/// its `#`-rooted schema pointer (`#/properties/name`, `#/anyOf/0`, ...).
///
/// Boolean schemas and non-object values are skipped.
pub fn traverse_schema(schema: &Value, visitor: &mut impl FnMut(&Value, &str)) {
    walk(schema, "#", visitor);
}

fn walk(schema: &Value, path: &str, visitor: &mut impl FnMut(&Value, &str)) {
    let Value::Object(map) = schema else {
        return;
    };
    visitor(schema, path);

    for (key, child) in map {
        let key = key.as_str();
        if MAP_KEYWORDS.contains(&key) {
            if let Value::Object(entries) = child {
                for (name, sub) in entries {
                    walk(sub, &format!("{}/{}/{}", path, key, name), visitor);
                }
            }
        } else if SINGLE_KEYWORDS.contains(&key) {
            walk(child, &format!("{}/{}", path, key), visitor);
        } else if ARRAY_KEYWORDS.contains(&key) {
            if let Value::Array(items) = child {
                for (i, sub) in items.iter().enumerate() {
                    walk(sub, &format!("{}/{}/{}", path, key, i), visitor);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn visits_all_locations_with_paths() {
        let schema = json!({
            "properties": { "name": { "type": "string" } },
            "items": { "type": "number" },
            "anyOf": [{}, { "title": "b" }],
            "if": { "properties": { "x": {} } },
            "$defs": { "D": {} },
            "additionalProperties": false
        });
        let mut paths = Vec::new();
        traverse_schema(&schema, &mut |_, path| paths.push(path.to_string()));
        assert_eq!(
            paths,
            vec![
                "#",
                "#/properties/name",
                "#/items",
                "#/anyOf/0",
                "#/anyOf/1",
                "#/if",
                "#/if/properties/x",
                "#/$defs/D",
            ]
        );
    }

    #[test]
    fn visitor_sees_node_content() {
        let schema = json!({ "properties": { "a": { "type": "string" }, "b": { "type": "string" } } });
        let mut strings = 0;
        traverse_schema(&schema, &mut |node, _| {
            if node.get("type") == Some(&json!("string")) {
                strings += 1;
            }
        });
        assert_eq!(strings, 2);
    }

    #[test]
    fn non_object_root_is_skipped() {
        let mut calls = 0;
        traverse_schema(&json!(true), &mut |_, _| calls += 1);
        assert_eq!(calls, 0);
    }
}
