use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::json_equal;
use crate::types::SchemaType;

/// Structural match of `data` against a schema fragment.
///
/// A conservative subset of validation, enough to pick conditional branches
/// and combinator options:
/// - `const` (when present) decides alone, then `enum`
/// - every declared `type` alternative is tried
/// - `properties` recurse only when data is an object; absent keys match as absent
/// - `required` keys must be present
/// - `minimum`/`maximum` on numbers, `minLength`/`pattern` on strings
///
/// `data` of `None` is an absent value: it never satisfies `const`, `enum`
/// or `type`. A `pattern` that is not a valid regex is ignored.
pub fn schema_matches(schema: &Value, data: Option<&Value>) -> bool {
    let Value::Object(map) = schema else {
        return schema.as_bool().unwrap_or(true);
    };

    if let Some(expected) = map.get("const") {
        return data.map_or(false, |d| json_equal(d, expected));
    }
    if let Some(Value::Array(options)) = map.get("enum") {
        return data.map_or(false, |d| options.iter().any(|o| json_equal(d, o)));
    }

    if let Some(types) = SchemaType::list_from_schema(schema) {
        let Some(d) = data else {
            return false;
        };
        if !types.iter().any(|t| t.matches(d)) {
            return false;
        }
    }

    if let Some(Value::Object(obj)) = data {
        if let Some(Value::Object(props)) = map.get("properties") {
            let all = props
                .iter()
                .all(|(key, sub)| schema_matches(sub, obj.get(key)));
            if !all {
                return false;
            }
        }
        if let Some(Value::Array(required)) = map.get("required") {
            let missing = required
                .iter()
                .filter_map(Value::as_str)
                .any(|key| !obj.contains_key(key));
            if missing {
                return false;
            }
        }
    }

    match data {
        Some(Value::Number(n)) => {
            let Some(x) = n.as_f64() else {
                return true;
            };
            if map.get("minimum").and_then(Value::as_f64).map_or(false, |min| x < min) {
                return false;
            }
            if map.get("maximum").and_then(Value::as_f64).map_or(false, |max| x > max) {
                return false;
            }
        }
        Some(Value::String(s)) => {
            let too_short = map
                .get("minLength")
                .and_then(Value::as_u64)
                .map_or(false, |min| (s.chars().count() as u64) < min);
            if too_short {
                return false;
            }
            if let Some(pattern) = map.get("pattern").and_then(Value::as_str) {
                match Regex::new(pattern) {
                    Ok(re) if !re.is_match(s) => return false,
                    Ok(_) => {}
                    Err(e) => debug!(pattern, error = %e, "ignoring invalid pattern"),
                }
            }
        }
        _ => {}
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn matches(schema: Value, data: Value) -> bool {
        schema_matches(&schema, Some(&data))
    }

    #[test]
    fn const_decides_alone() {
        assert!(matches(json!({ "const": "a", "type": "number" }), json!("a")));
        assert!(!matches(json!({ "const": "a" }), json!("b")));
        assert!(matches(json!({ "const": 1 }), json!(1.0)));
    }

    #[test]
    fn enum_membership() {
        assert!(matches(json!({ "enum": ["x", "y"] }), json!("y")));
        assert!(!matches(json!({ "enum": ["x", "y"] }), json!("z")));
    }

    #[test]
    fn absent_data_fails_typed_schemas() {
        assert!(!schema_matches(&json!({ "type": "string" }), None));
        assert!(!schema_matches(&json!({ "const": null }), None));
        assert!(schema_matches(&json!({ "title": "anything" }), None));
    }

    #[test]
    fn type_alternatives() {
        let schema = json!({ "type": ["string", "null"] });
        assert!(matches(schema.clone(), json!(null)));
        assert!(matches(schema.clone(), json!("s")));
        assert!(!matches(schema, json!(1)));
        assert!(matches(json!({ "type": "integer" }), json!(4)));
        assert!(!matches(json!({ "type": "integer" }), json!(4.5)));
    }

    #[test]
    fn properties_recurse_into_objects() {
        let schema = json!({ "properties": { "kind": { "const": "person" } } });
        assert!(matches(schema.clone(), json!({ "kind": "person" })));
        assert!(!matches(schema.clone(), json!({ "kind": "company" })));
        // Missing property fails its const
        assert!(!matches(schema.clone(), json!({})));
        // Non-object data skips the properties check
        assert!(matches(schema, json!("text")));
    }

    #[test]
    fn required_keys() {
        let schema = json!({ "type": "object", "required": ["a"] });
        assert!(matches(schema.clone(), json!({ "a": null })));
        assert!(!matches(schema, json!({ "b": 1 })));
    }

    #[test]
    fn numeric_and_string_bounds() {
        assert!(!matches(json!({ "minimum": 5 }), json!(4)));
        assert!(matches(json!({ "minimum": 5, "maximum": 10 }), json!(10)));
        assert!(!matches(json!({ "maximum": 10 }), json!(10.5)));
        assert!(!matches(json!({ "minLength": 3 }), json!("ab")));
        assert!(matches(json!({ "minLength": 2 }), json!("ëa")));
        assert!(matches(json!({ "minimum": 5 }), json!("not a number")));
    }

    #[test]
    fn pattern_matching() {
        assert!(matches(json!({ "pattern": "^[0-9]+$" }), json!("123")));
        assert!(!matches(json!({ "pattern": "^[0-9]+$" }), json!("12a")));
        assert!(matches(json!({ "pattern": "([" }), json!("anything")));
    }

    #[test]
    fn boolean_schemas() {
        assert!(schema_matches(&json!(true), Some(&json!(1))));
        assert!(!schema_matches(&json!(false), Some(&json!(1))));
    }
}
