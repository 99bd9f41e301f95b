//! Built-in stage bodies, except tree building (see `tree.rs`).

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::debug;

use super::PipelineContext;
use crate::model::FieldNode;
use crate::path::{append_path, last_segment};
use crate::schema::{merge_all_of, merge_schemas, normalize_schema, resolve_refs, schema_matches};
use crate::types::{
    CombinatorInfo, CombinatorKind, CombinatorSelections, ConditionalDeps, SchemaType,
};

pub(crate) fn normalize(mut ctx: PipelineContext) -> PipelineContext {
    normalize_schema(&mut ctx.schema);
    ctx
}

pub(crate) fn resolve_refs_stage(mut ctx: PipelineContext) -> PipelineContext {
    ctx.schema = resolve_refs(&ctx.schema);
    ctx
}

pub(crate) fn merge_all_of_stage(mut ctx: PipelineContext) -> PipelineContext {
    ctx.schema = merge_all_of(&ctx.schema);
    ctx
}

pub(crate) fn evaluate_conditionals(mut ctx: PipelineContext) -> PipelineContext {
    ctx.schema = conditionals_at(&ctx.schema, ctx.data.as_ref(), "", &mut ctx.conditional_deps);
    ctx
}

pub(crate) fn evaluate_dependents(mut ctx: PipelineContext) -> PipelineContext {
    ctx.schema = dependents_at(&ctx.schema, ctx.data.as_ref());
    ctx
}

pub(crate) fn resolve_combinators(mut ctx: PipelineContext) -> PipelineContext {
    if ctx.combinator_selections.is_empty() {
        return ctx;
    }
    ctx.resolved_combinators.clear();
    ctx.schema = combinators_at(
        &ctx.schema,
        "",
        &ctx.combinator_selections,
        &mut ctx.resolved_combinators,
    );
    ctx
}

pub(crate) fn apply_defaults(mut ctx: PipelineContext) -> PipelineContext {
    if ctx.index.contains_key("") {
        let data = ctx.data.take();
        ctx.data = defaults_at(&mut ctx.index, "", data);
    }
    ctx
}

/// Extension point only.
pub(crate) fn finalize(ctx: PipelineContext) -> PipelineContext {
    ctx
}

/// Copy of `schema` without the given keywords. Non-objects are cloned as is.
pub(crate) fn without_keywords(schema: &Value, keywords: &[&str]) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !keywords.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

// --- Internal implementation ---

const CONDITIONAL_KEYWORDS: &[&str] = &["if", "then", "else"];

fn conditionals_at(
    schema: &Value,
    data: Option<&Value>,
    data_path: &str,
    deps: &mut ConditionalDeps,
) -> Value {
    let Value::Object(map) = schema else {
        return schema.clone();
    };

    let mut result = schema.clone();
    if let Some(condition) = map.get("if") {
        track_condition_deps(condition, data_path, deps);

        let branch_key = if schema_matches(condition, data) {
            "then"
        } else {
            "else"
        };
        let rest = without_keywords(schema, CONDITIONAL_KEYWORDS);
        match map.get(branch_key) {
            // The branch may carry its own if/then/else
            Some(branch) => {
                let merged = merge_schemas(&rest, branch);
                return conditionals_at(&merged, data, data_path, deps);
            }
            None => result = rest,
        }
    }

    if let Some(Value::Object(props)) = result.get_mut("properties") {
        let obj = data.and_then(Value::as_object);
        for (key, sub) in props.iter_mut() {
            let child_path = append_path(data_path, key);
            let child_data = obj.and_then(|o| o.get(key));
            *sub = conditionals_at(sub, child_data, &child_path, deps);
        }
    }

    // Item-level conditionals are only resolved when there is no array data
    // to evaluate them against.
    if !data.map_or(false, Value::is_array) {
        if let Some(items) = result.get_mut("items").filter(|v| v.is_object()) {
            *items = conditionals_at(items, None, data_path, deps);
        }
    }

    result
}

fn track_condition_deps(condition: &Value, data_path: &str, deps: &mut ConditionalDeps) {
    if let Some(Value::Object(props)) = condition.get("properties") {
        for key in props.keys() {
            deps.entry(append_path(data_path, key))
                .or_default()
                .insert(data_path.to_string());
        }
    }
    if condition.get("const").is_some() || condition.get("enum").is_some() {
        deps.entry(data_path.to_string())
            .or_default()
            .insert(data_path.to_string());
    }
}

fn dependents_at(schema: &Value, data: Option<&Value>) -> Value {
    if !schema.is_object() {
        return schema.clone();
    }
    let mut result = schema.clone();

    if let Some(obj) = data.and_then(Value::as_object) {
        if let Some(Value::Object(dep_schemas)) = schema.get("dependentSchemas") {
            result = without_keywords(&result, &["dependentSchemas"]);
            for (trigger, dep) in dep_schemas {
                if obj.contains_key(trigger) {
                    result = merge_schemas(&result, dep);
                }
            }
        }
        if let Some(Value::Object(dep_required)) = schema.get("dependentRequired") {
            result = without_keywords(&result, &["dependentRequired"]);
            let activated: Vec<Value> = dep_required
                .iter()
                .filter(|(trigger, _)| obj.contains_key(trigger.as_str()))
                .filter_map(|(_, fields)| fields.as_array())
                .flatten()
                .cloned()
                .collect();
            if !activated.is_empty() {
                let mut extra = Map::new();
                extra.insert("required".to_string(), Value::Array(activated));
                result = merge_schemas(&result, &Value::Object(extra));
            }
        }
    }

    if let Some(Value::Object(props)) = result.get_mut("properties") {
        let obj = data.and_then(Value::as_object);
        for (key, sub) in props.iter_mut() {
            *sub = dependents_at(sub, obj.and_then(|o| o.get(key)));
        }
    }
    result
}

fn combinators_at(
    schema: &Value,
    path: &str,
    selections: &CombinatorSelections,
    resolved: &mut BTreeMap<String, CombinatorInfo>,
) -> Value {
    if !schema.is_object() {
        return schema.clone();
    }
    let mut result = schema.clone();

    if let Some((kind, options)) = CombinatorKind::of_schema(schema) {
        match selections.get(path) {
            Some(&index) if index < options.len() => {
                resolved.insert(
                    path.to_string(),
                    CombinatorInfo {
                        kind,
                        options: options.clone(),
                        active_index: Some(index),
                        labels: CombinatorInfo::labels_for(options),
                        ambiguous: false,
                    },
                );
                let base = without_keywords(schema, &["oneOf", "anyOf"]);
                result = merge_schemas(&base, &options[index]);
            }
            Some(&index) => {
                debug!(path, index, options = options.len(), "ignoring out-of-range combinator selection");
            }
            None => {}
        }
    }

    if let Some(Value::Object(props)) = result.get_mut("properties") {
        for (key, sub) in props.iter_mut() {
            *sub = combinators_at(sub, &append_path(path, key), selections, resolved);
        }
    }
    result
}

/// Post-order default seeding. Returns the (possibly rebuilt) data at `path`.
fn defaults_at(
    index: &mut BTreeMap<String, FieldNode>,
    path: &str,
    data: Option<Value>,
) -> Option<Value> {
    let Some(node) = index.get(path) else {
        return data;
    };
    let children = node.children.clone();
    let is_object = node.ty.includes(SchemaType::Object);
    let is_array = node.ty.includes(SchemaType::Array);

    let mut data = match data {
        None => node.schema.get("default").cloned(),
        some => some,
    };

    if is_object && !children.is_empty() {
        let mut obj = match data {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        for child in &children {
            let key = last_segment(child).unwrap_or_default();
            let current = obj.get_mut(&key).map(std::mem::take);
            if let Some(value) = defaults_at(index, child, current) {
                obj.insert(key, value);
            }
        }
        data = Some(Value::Object(obj));
    }

    if is_array && !children.is_empty() {
        data = match data {
            Some(Value::Array(mut items)) => {
                for (i, child) in children.iter().enumerate() {
                    if let Some(slot) = items.get_mut(i) {
                        let current = std::mem::take(slot);
                        *slot = defaults_at(index, child, Some(current)).unwrap_or(Value::Null);
                    }
                }
                Some(Value::Array(items))
            }
            other => other,
        };
    }

    if let Some(node) = index.get_mut(path) {
        node.value = data.clone();
    }
    data
}
