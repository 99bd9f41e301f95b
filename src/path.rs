//! JSON Pointer (RFC 6901) handling and immutable get/set/delete over data.
//!
//! Data is modelled as `Option<&Value>`: `None` is an absent ("undefined")
//! value, distinct from JSON `null`.

use serde_json::{Map, Value};

use crate::error::PathError;

/// Parse a JSON Pointer into unescaped segments.
///
/// `""` and `"/"` are the root and yield no segments.
///
/// # Errors
///
/// Returns `PathError::InvalidPointer` if the pointer is non-empty and does
/// not start with `/`.
pub fn parse_path(pointer: &str) -> Result<Vec<String>, PathError> {
    if pointer.is_empty() || pointer == "/" {
        return Ok(Vec::new());
    }
    let Some(rest) = pointer.strip_prefix('/') else {
        return Err(PathError::InvalidPointer {
            pointer: pointer.to_string(),
        });
    };
    Ok(rest.split('/').map(unescape_segment).collect())
}

/// Build a JSON Pointer from raw segments. No segments yields `""`.
pub fn build_path<S: AsRef<str>>(segments: &[S]) -> String {
    let mut out = String::new();
    for seg in segments {
        out.push('/');
        out.push_str(&escape_segment(seg.as_ref()));
    }
    out
}

/// Append one segment (escaped) to a pointer. Numbers stringify first.
pub fn append_path(base: &str, segment: impl ToString) -> String {
    format!("{}/{}", base, escape_segment(&segment.to_string()))
}

/// The pointer with its last segment dropped. The parent of `/a` is `""`.
///
/// # Errors
///
/// Returns `PathError::InvalidPointer` for malformed pointers.
pub fn parent_path(pointer: &str) -> Result<String, PathError> {
    let mut segs = parse_path(pointer)?;
    segs.pop();
    Ok(build_path(&segs))
}

/// The last unescaped segment of a pointer, if any.
pub fn last_segment(pointer: &str) -> Option<String> {
    let (_, last) = pointer.rsplit_once('/')?;
    Some(unescape_segment(last))
}

/// True iff `candidate` nests strictly under `ancestor`.
///
/// `""` is the ancestor of every non-empty pointer; a pointer is never its
/// own descendant.
pub fn is_descendant(ancestor: &str, candidate: &str) -> bool {
    if ancestor.is_empty() {
        return !candidate.is_empty();
    }
    candidate.len() > ancestor.len()
        && candidate.starts_with(ancestor)
        && candidate.as_bytes()[ancestor.len()] == b'/'
}

/// Read the value at `pointer`. Missing intermediates yield `None`.
///
/// # Errors
///
/// Returns `PathError::InvalidPointer` for malformed pointers.
pub fn get_by_path<'a>(data: Option<&'a Value>, pointer: &str) -> Result<Option<&'a Value>, PathError> {
    let segs = parse_path(pointer)?;
    let mut current = data;
    for seg in &segs {
        current = match current {
            Some(Value::Object(map)) => map.get(seg),
            Some(Value::Array(arr)) => seg.parse::<usize>().ok().and_then(|i| arr.get(i)),
            _ => None,
        };
    }
    Ok(current)
}

/// Return a new structure with `value` written at `pointer`.
///
/// The input is never mutated. Missing or non-container intermediates are
/// replaced by objects. Writing at the root returns `value` itself.
///
/// # Errors
///
/// Returns `PathError::InvalidPointer` for malformed pointers and
/// `PathError::InvalidArrayIndex` when a segment addressing an array is not
/// an index into it or the position just past its end.
pub fn set_by_path(data: Option<&Value>, pointer: &str, value: Value) -> Result<Value, PathError> {
    let segs = parse_path(pointer)?;
    if segs.is_empty() {
        return Ok(value);
    }
    let root = data.cloned().unwrap_or(Value::Null);
    set_owned(root, &segs, value, pointer)
}

/// Return a new structure with the entry at `pointer` removed.
///
/// Array removal shifts later elements down. Deleting the root yields `None`.
/// Paths that do not exist leave the structure unchanged.
///
/// # Errors
///
/// Returns `PathError::InvalidPointer` for malformed pointers.
pub fn delete_by_path(data: Option<&Value>, pointer: &str) -> Result<Option<Value>, PathError> {
    let segs = parse_path(pointer)?;
    if segs.is_empty() {
        return Ok(None);
    }
    Ok(data.cloned().map(|root| delete_owned(root, &segs)))
}

// --- Internal implementation ---

fn escape_segment(seg: &str) -> String {
    seg.replace('~', "~0").replace('/', "~1")
}

fn unescape_segment(seg: &str) -> String {
    seg.replace("~1", "/").replace("~0", "~")
}

fn set_owned(current: Value, segs: &[String], value: Value, pointer: &str) -> Result<Value, PathError> {
    let Some((seg, rest)) = segs.split_first() else {
        return Ok(value);
    };

    match current {
        Value::Array(mut arr) => {
            // Only an existing slot or the one just past the end is writable
            let idx = seg
                .parse::<usize>()
                .ok()
                .filter(|&idx| idx <= arr.len())
                .ok_or_else(|| PathError::InvalidArrayIndex {
                    pointer: pointer.to_string(),
                    segment: seg.clone(),
                })?;
            if idx == arr.len() {
                arr.push(Value::Null);
            }
            let child = std::mem::take(&mut arr[idx]);
            arr[idx] = set_owned(child, rest, value, pointer)?;
            Ok(Value::Array(arr))
        }
        Value::Object(mut map) => {
            let child = map
                .get_mut(seg.as_str())
                .map(std::mem::take)
                .unwrap_or(Value::Null);
            map.insert(seg.clone(), set_owned(child, rest, value, pointer)?);
            Ok(Value::Object(map))
        }
        // Scalars and missing values become fresh objects
        _ => {
            let mut map = Map::new();
            map.insert(seg.clone(), set_owned(Value::Null, rest, value, pointer)?);
            Ok(Value::Object(map))
        }
    }
}

fn delete_owned(current: Value, segs: &[String]) -> Value {
    let Some((seg, rest)) = segs.split_first() else {
        return current;
    };

    match current {
        Value::Array(mut arr) => {
            let Ok(idx) = seg.parse::<usize>() else {
                return Value::Array(arr);
            };
            if idx < arr.len() {
                if rest.is_empty() {
                    arr.remove(idx);
                } else {
                    let child = std::mem::take(&mut arr[idx]);
                    arr[idx] = delete_owned(child, rest);
                }
            }
            Value::Array(arr)
        }
        Value::Object(map) => {
            if rest.is_empty() {
                // Rebuild to keep the remaining keys in declaration order
                Value::Object(map.into_iter().filter(|(k, _)| k != seg).collect())
            } else {
                let mut map = map;
                if let Some(child) = map.get_mut(seg.as_str()) {
                    let taken = std::mem::take(child);
                    *child = delete_owned(taken, rest);
                }
                Value::Object(map)
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn parse_root() {
        assert!(parse_path("").unwrap().is_empty());
        assert!(parse_path("/").unwrap().is_empty());
    }

    #[test]
    fn parse_unescapes() {
        assert_eq!(parse_path("/a~0b/c~1d").unwrap(), vec!["a~b", "c/d"]);
    }

    #[test]
    fn parse_rejects_relative_pointer() {
        assert!(matches!(
            parse_path("name"),
            Err(PathError::InvalidPointer { pointer }) if pointer == "name"
        ));
    }

    #[test]
    fn build_escapes() {
        assert_eq!(build_path(&["a~b", "c/d"]), "/a~0b/c~1d");
        assert_eq!(build_path::<&str>(&[]), "");
    }

    #[test]
    fn append_numeric_segment() {
        assert_eq!(append_path("", "items"), "/items");
        assert_eq!(append_path("/items", 3), "/items/3");
        assert_eq!(append_path("/a", "x/y"), "/a/x~1y");
    }

    #[test]
    fn parent_of_top_level_is_root() {
        assert_eq!(parent_path("/a").unwrap(), "");
        assert_eq!(parent_path("/a/b").unwrap(), "/a");
        assert_eq!(parent_path("").unwrap(), "");
    }

    #[test]
    fn descendant_rules() {
        assert!(is_descendant("", "/a"));
        assert!(!is_descendant("", ""));
        assert!(is_descendant("/a", "/a/b"));
        assert!(!is_descendant("/a", "/a"));
        assert!(!is_descendant("/a", "/ab"));
        assert!(!is_descendant("/a/b", "/a"));
    }

    #[test]
    fn last_segment_unescapes() {
        assert_eq!(last_segment("/a/c~1d").as_deref(), Some("c/d"));
        assert_eq!(last_segment(""), None);
    }

    #[test]
    fn get_nested_and_missing() {
        let data = json!({ "a": { "b": [10, 20] } });
        assert_eq!(get_by_path(Some(&data), "/a/b/1").unwrap(), Some(&json!(20)));
        assert_eq!(get_by_path(Some(&data), "/a/x/y").unwrap(), None);
        assert_eq!(get_by_path(Some(&data), "/a/b/x").unwrap(), None);
        assert_eq!(get_by_path(Some(&data), "").unwrap(), Some(&data));
        assert_eq!(get_by_path(None, "/a").unwrap(), None);
    }

    #[test]
    fn set_creates_intermediates() {
        let result = set_by_path(None, "/a/b", json!(1)).unwrap();
        assert_eq!(result, json!({ "a": { "b": 1 } }));
    }

    #[test]
    fn set_root_returns_value() {
        let data = json!({ "a": 1 });
        assert_eq!(set_by_path(Some(&data), "", json!("x")).unwrap(), json!("x"));
    }

    #[test]
    fn set_into_array() {
        let data = json!({ "list": [1, 2, 3] });
        let result = set_by_path(Some(&data), "/list/1", json!(9)).unwrap();
        assert_eq!(result, json!({ "list": [1, 9, 3] }));
    }

    #[test]
    fn set_rejects_non_numeric_array_segment() {
        let data = json!({ "list": [1] });
        assert!(matches!(
            set_by_path(Some(&data), "/list/x", json!(0)),
            Err(PathError::InvalidArrayIndex { .. })
        ));
    }

    #[test]
    fn set_appends_at_array_end() {
        let data = json!({ "list": [1] });
        let result = set_by_path(Some(&data), "/list/1", json!(2)).unwrap();
        assert_eq!(result, json!({ "list": [1, 2] }));
    }

    #[test]
    fn set_rejects_index_past_array_end() {
        let data = json!({ "list": [1] });
        for pointer in ["/list/2", "/list/1000000000000", "/list/18446744073709551615"] {
            assert!(matches!(
                set_by_path(Some(&data), pointer, json!(0)),
                Err(PathError::InvalidArrayIndex { segment, .. }) if pointer.ends_with(&segment)
            ));
        }
        assert_eq!(data, json!({ "list": [1] }));
    }

    #[test]
    fn set_keeps_key_order() {
        let data = json!({ "a": 1, "b": 2, "c": 3 });
        let result = set_by_path(Some(&data), "/b", json!(5)).unwrap();
        let keys: Vec<_> = result.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn delete_from_array_shifts() {
        let data = json!({ "list": ["a", "b", "c"] });
        let result = delete_by_path(Some(&data), "/list/0").unwrap();
        assert_eq!(result, Some(json!({ "list": ["b", "c"] })));
        assert_eq!(data, json!({ "list": ["a", "b", "c"] }));
    }

    #[test]
    fn delete_key_and_root() {
        let data = json!({ "a": 1, "b": { "c": 2, "d": 3 } });
        let result = delete_by_path(Some(&data), "/b/c").unwrap();
        assert_eq!(result, Some(json!({ "a": 1, "b": { "d": 3 } })));
        assert_eq!(delete_by_path(Some(&data), "").unwrap(), None);
    }

    proptest! {
        #[test]
        fn parse_build_round_trip(segments in proptest::collection::vec("[a-zA-Z0-9_~/ ]{1,8}", 0..6)) {
            let pointer = build_path(&segments);
            prop_assert_eq!(parse_path(&pointer).unwrap(), segments);
        }

        #[test]
        fn set_never_mutates_input(key in "[a-z]{1,6}", n in 0i64..1000) {
            let data = json!({ "fixed": { "x": 1 }, "list": [1, 2] });
            let before = data.clone();
            let pointer = format!("/fixed/{}", key);
            let _ = set_by_path(Some(&data), &pointer, json!(n)).unwrap();
            prop_assert_eq!(&data, &before);
            prop_assert_eq!(get_by_path(Some(&data), "/fixed/x").unwrap(), Some(&json!(1)));
        }
    }
}
