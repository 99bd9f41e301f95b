//! Optional validation collaborator backed by the `jsonschema` crate.
//!
//! Both entry points only annotate nodes: errors land in the node's
//! `extensions` under `validationErrors`. Absent, `null` and empty-string
//! values are not validated.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use jsonschema::Validator;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::model::FieldNode;
use crate::pipeline::{enrichment, middleware, Enrichment, Middleware};

/// Extension and meta key the collaborator writes to.
pub const VALIDATION_ERRORS_KEY: &str = "validationErrors";

/// One validation failure, addressed by data pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

/// Enrichment that attaches `validationErrors` to every failing node.
///
/// Compiled validators are cached per schema fragment for the lifetime of
/// the returned enrichment.
pub fn validation_enrichment() -> Enrichment {
    let cache = ValidatorCache::default();
    enrichment(move |node, _ctx| {
        let issues = cache.check(node)?;
        let mut ext = Map::new();
        ext.insert(VALIDATION_ERRORS_KEY.to_string(), issues_json(&issues));
        Some(ext)
    })
}

/// FINALIZE-stage middleware with the same per-node annotation, which also
/// collects every failure under `meta.validationErrors` (path to issues).
pub fn validation_middleware() -> Middleware {
    let cache = ValidatorCache::default();
    middleware(move |ctx, next| {
        let mut out = next.run(ctx)?;
        let mut all = Map::new();
        for (path, node) in out.index.iter_mut() {
            let Some(issues) = cache.check(node) else {
                continue;
            };
            let json = issues_json(&issues);
            node.extensions
                .insert(VALIDATION_ERRORS_KEY.to_string(), json.clone());
            all.insert(path.clone(), json);
        }
        out.meta
            .insert(VALIDATION_ERRORS_KEY.to_string(), Value::Object(all));
        Ok(out)
    })
}

// --- Internal implementation ---

#[derive(Default)]
struct ValidatorCache {
    compiled: RefCell<HashMap<String, Option<Rc<Validator>>>>,
}

impl ValidatorCache {
    /// Issues for `node`, or `None` when it is valid or was not checked.
    fn check(&self, node: &FieldNode) -> Option<Vec<ValidationIssue>> {
        let value = node.value.as_ref()?;
        if value.is_null() || value.as_str() == Some("") {
            return None;
        }
        let validator = self.get(&node.schema)?;
        let issues: Vec<ValidationIssue> = validator
            .iter_errors(value)
            .map(|e| ValidationIssue {
                path: format!("{}{}", node.path, e.instance_path),
                message: e.to_string(),
            })
            .collect();
        (!issues.is_empty()).then_some(issues)
    }

    fn get(&self, schema: &Value) -> Option<Rc<Validator>> {
        let key = schema.to_string();
        if let Some(hit) = self.compiled.borrow().get(&key) {
            return hit.clone();
        }
        let compiled = match jsonschema::validator_for(schema) {
            Ok(v) => Some(Rc::new(v)),
            Err(e) => {
                debug!(error = %e, "schema fragment does not compile, skipping validation");
                None
            }
        };
        self.compiled.borrow_mut().insert(key, compiled.clone());
        compiled
    }
}

fn issues_json(issues: &[ValidationIssue]) -> Value {
    serde_json::to_value(issues).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{run_pipeline, PipelineConfig};
    use crate::types::{CombinatorSelections, PipelineStage};
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "age": { "type": "integer", "minimum": 0 },
                "email": { "type": "string", "minLength": 3 },
                "nick": { "type": "string", "minLength": 3 }
            }
        })
    }

    #[test]
    fn enrichment_annotates_failing_nodes() {
        let config = PipelineConfig::new().with_enrichment(validation_enrichment());
        let data = json!({ "age": -1, "email": "ok@x", "nick": "" });
        let model = run_pipeline(&schema(), Some(&data), &config, &CombinatorSelections::new()).unwrap();

        let age = model.get("/age").unwrap();
        let errors = age.extensions[VALIDATION_ERRORS_KEY].as_array().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["path"], "/age");

        assert!(model.get("/email").unwrap().extensions.is_empty());
        // Empty strings are not validated.
        assert!(model.get("/nick").unwrap().extensions.is_empty());
    }

    #[test]
    fn middleware_collects_meta() {
        let config = PipelineConfig::new().with_middleware(PipelineStage::Finalize, validation_middleware());
        let data = json!({ "age": 1.5, "email": "a" });
        let model = run_pipeline(&schema(), Some(&data), &config, &CombinatorSelections::new()).unwrap();

        let meta = model.meta[VALIDATION_ERRORS_KEY].as_object().unwrap();
        assert!(meta.contains_key("/age"));
        assert!(meta.contains_key("/email"));
        assert!(model.get("/email").unwrap().extensions.contains_key(VALIDATION_ERRORS_KEY));
    }

    #[test]
    fn nested_issue_paths_are_absolute() {
        let cache = ValidatorCache::default();
        let config = PipelineConfig::default();
        let schema = json!({
            "type": "object",
            "properties": { "tags": { "type": "array", "items": { "type": "string" } } }
        });
        let data = json!({ "tags": ["a", 2] });
        let model = run_pipeline(&schema, Some(&data), &config, &CombinatorSelections::new()).unwrap();

        let issues = cache.check(model.get("/tags").unwrap()).unwrap();
        assert_eq!(issues[0].path, "/tags/1");
        assert_eq!(cache.compiled.borrow().len(), 1);
    }
}
