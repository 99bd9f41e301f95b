//! Inline internal `$ref` pointers (`#/$defs/NAME`, `#/definitions/NAME`).

use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::debug;

use super::map_subschemas;

/// Resolve all internal refs, returning a new schema.
///
/// Definitions are looked up in the root `$defs` (falling back to a legacy
/// root `definitions`). A ref met again while it is already being expanded
/// is left in place as an unresolved `$ref` node, which breaks cycles. Refs
/// whose target does not exist are left untouched. A resolved `$ref` node is
/// replaced by a copy of its target, so keywords written next to it are
/// dropped.
pub fn resolve_refs(schema: &Value) -> Value {
    let empty = Map::new();
    let defs = schema
        .get("$defs")
        .and_then(Value::as_object)
        .or_else(|| schema.get("definitions").and_then(Value::as_object))
        .unwrap_or(&empty);
    resolve_node(schema, defs, &mut HashSet::new())
}

fn resolve_node(node: &Value, defs: &Map<String, Value>, resolving: &mut HashSet<String>) -> Value {
    let Some(ref_val) = node.get("$ref").and_then(Value::as_str) else {
        return map_subschemas(node, |child| resolve_node(child, defs, resolving));
    };

    if resolving.contains(ref_val) {
        debug!(reference = ref_val, "circular $ref left unresolved");
        return node.clone();
    }

    let Some(target) = lookup(ref_val, defs) else {
        debug!(reference = ref_val, "unresolvable $ref left in place");
        return node.clone();
    };

    resolving.insert(ref_val.to_string());
    let result = resolve_node(target, defs, resolving);
    resolving.remove(ref_val);
    result
}

fn lookup<'a>(reference: &str, defs: &'a Map<String, Value>) -> Option<&'a Value> {
    let name = reference
        .strip_prefix("#/$defs/")
        .or_else(|| reference.strip_prefix("#/definitions/"))?;
    let name = name.replace("~1", "/").replace("~0", "~");
    defs.get(&name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_simple_ref() {
        let schema = json!({
            "$defs": { "Name": { "type": "string", "minLength": 1 } },
            "properties": { "name": { "$ref": "#/$defs/Name" } }
        });
        let result = resolve_refs(&schema);
        assert_eq!(
            result["properties"]["name"],
            json!({ "type": "string", "minLength": 1 })
        );
    }

    #[test]
    fn resolves_nested_ref() {
        let schema = json!({
            "$defs": {
                "City": { "type": "string" },
                "Address": {
                    "type": "object",
                    "properties": { "city": { "$ref": "#/$defs/City" } }
                }
            },
            "properties": { "home": { "$ref": "#/$defs/Address" } }
        });
        let result = resolve_refs(&schema);
        assert_eq!(result["properties"]["home"]["properties"]["city"]["type"], "string");
    }

    #[test]
    fn circular_ref_terminates() {
        let schema = json!({
            "$defs": {
                "Node": {
                    "type": "object",
                    "properties": {
                        "value": { "type": "string" },
                        "next": { "$ref": "#/$defs/Node" }
                    }
                }
            },
            "properties": { "head": { "$ref": "#/$defs/Node" } }
        });
        let result = resolve_refs(&schema);
        let head = &result["properties"]["head"];
        assert_eq!(head["properties"]["value"]["type"], "string");
        assert_eq!(head["properties"]["next"]["$ref"], "#/$defs/Node");
    }

    #[test]
    fn unresolvable_ref_kept() {
        let schema = json!({ "properties": { "x": { "$ref": "#/$defs/Missing" } } });
        let result = resolve_refs(&schema);
        assert_eq!(result["properties"]["x"], json!({ "$ref": "#/$defs/Missing" }));
    }

    #[test]
    fn external_ref_kept() {
        let schema = json!({ "properties": { "x": { "$ref": "other.json#/A" } } });
        let result = resolve_refs(&schema);
        assert_eq!(result["properties"]["x"]["$ref"], "other.json#/A");
    }

    #[test]
    fn resolves_refs_in_composition_and_conditionals() {
        let schema = json!({
            "$defs": { "S": { "type": "string" } },
            "allOf": [{ "$ref": "#/$defs/S" }],
            "if": { "$ref": "#/$defs/S" },
            "then": { "properties": { "a": { "$ref": "#/$defs/S" } } }
        });
        let result = resolve_refs(&schema);
        assert_eq!(result["allOf"][0]["type"], "string");
        assert_eq!(result["if"]["type"], "string");
        assert_eq!(result["then"]["properties"]["a"]["type"], "string");
    }

    #[test]
    fn target_replaces_ref_node() {
        let schema = json!({
            "$defs": { "Name": { "type": "string", "title": "Name" } },
            "properties": { "n": { "$ref": "#/$defs/Name", "title": "Nickname", "minLength": 2 } }
        });
        let result = resolve_refs(&schema);
        assert_eq!(
            result["properties"]["n"],
            json!({ "type": "string", "title": "Name" })
        );
    }

    #[test]
    fn input_not_mutated() {
        let schema = json!({
            "$defs": { "S": { "type": "string" } },
            "properties": { "a": { "$ref": "#/$defs/S" } }
        });
        let before = schema.clone();
        let _ = resolve_refs(&schema);
        assert_eq!(schema, before);
    }
}
