//! Field-tree construction.

use std::collections::{BTreeMap, HashSet};

use serde_json::{Map, Value};
use tracing::debug;

use super::stages::without_keywords;
use super::PipelineContext;
use crate::model::FieldNode;
use crate::path::append_path;
use crate::schema::{merge_schemas, schema_matches};
use crate::types::{
    ArrayMeta, CombinatorInfo, CombinatorKind, FieldConstraints, FieldKind, FieldOrigin,
    FieldType, SchemaType,
};

pub(crate) fn build_tree(mut ctx: PipelineContext) -> PipelineContext {
    ctx.index.clear();
    let mut builder = TreeBuilder {
        index: &mut ctx.index,
        resolved: &ctx.resolved_combinators,
    };
    builder.build(&ctx.schema, ctx.data.as_ref(), "", FieldOrigin::Root, false);
    ctx
}

/// Effective type of a schema node.
///
/// Explicit `type` wins, then structural keywords, then a homogeneous `enum`,
/// then `const`, then the runtime type of the data. Falls back to `string`.
pub fn resolve_type(schema: &Value, data: Option<&Value>) -> FieldType {
    if let Some(types) = SchemaType::list_from_schema(schema).filter(|t| !t.is_empty()) {
        return FieldType::from_list(types);
    }

    let has = |k: &str| schema.get(k).map_or(false, |v| v != &Value::Bool(false));
    if has("properties") || has("additionalProperties") || has("patternProperties") {
        return FieldType::Single(SchemaType::Object);
    }
    if has("items") || has("prefixItems") {
        return FieldType::Single(SchemaType::Array);
    }

    if let Some(Value::Array(values)) = schema.get("enum") {
        let kinds: HashSet<SchemaType> = values.iter().map(SchemaType::of_value).collect();
        if kinds.len() == 1 {
            if let Some(kind) = kinds.into_iter().next() {
                return FieldType::Single(kind);
            }
        }
    }
    if let Some(constant) = schema.get("const") {
        return FieldType::Single(SchemaType::of_value(constant));
    }
    if let Some(d) = data {
        return FieldType::Single(SchemaType::of_value(d));
    }
    FieldType::Single(SchemaType::String)
}

// --- Internal implementation ---

struct TreeBuilder<'a> {
    index: &'a mut BTreeMap<String, FieldNode>,
    resolved: &'a BTreeMap<String, CombinatorInfo>,
}

impl TreeBuilder<'_> {
    /// Build the node at `path` and register it (and its subtree) in the index.
    fn build(
        &mut self,
        schema: &Value,
        data: Option<&Value>,
        path: &str,
        origin: FieldOrigin,
        required: bool,
    ) {
        let ty = resolve_type(schema, data);
        let mut children = Vec::new();
        let mut combinator = None;
        let mut array_meta = None;

        if let Some((kind, options)) = CombinatorKind::of_schema(schema) {
            let info = self.match_combinator(kind, options, data, path);
            if let Some(active) = info.active_index {
                // Build the chosen branch in place and adopt its children
                let branch = merge_schemas(&without_keywords(schema, &["oneOf", "anyOf"]), &options[active]);
                self.build(&branch, data, path, origin, required);
                if let Some(built) = self.index.get(path) {
                    children = built.children.clone();
                }
            }
            combinator = Some(info);
        } else {
            if ty.includes(SchemaType::Object) {
                if let Some(Value::Object(props)) = schema.get("properties") {
                    children.extend(self.build_properties(schema, props, data, path));
                }
            }
            if ty.includes(SchemaType::Array) {
                let (meta, items) = self.build_items(schema, data, path);
                array_meta = Some(meta);
                children.extend(items);
            }
        }

        if combinator.is_none() {
            combinator = self.resolved.get(path).cloned();
        }

        let kind = if combinator.is_some() {
            FieldKind::Combinator
        } else if array_meta.is_some() {
            FieldKind::Array
        } else if ty.includes(SchemaType::Object) {
            FieldKind::Object
        } else {
            FieldKind::Leaf
        };

        let flag = |k: &str| schema.get(k).and_then(Value::as_bool).unwrap_or(false);
        let node = FieldNode {
            path: path.to_string(),
            schema: schema.clone(),
            ty,
            value: data.cloned(),
            children,
            required,
            read_only: flag("readOnly"),
            deprecated: flag("deprecated"),
            active: true,
            constraints: FieldConstraints::from_schema(schema),
            combinator,
            origin,
            array_meta,
            kind,
            extensions: Map::new(),
        };
        self.index.insert(path.to_string(), node);
    }

    fn match_combinator(
        &self,
        kind: CombinatorKind,
        options: &[Value],
        data: Option<&Value>,
        path: &str,
    ) -> CombinatorInfo {
        let matching: Vec<usize> = options
            .iter()
            .enumerate()
            .filter(|(_, option)| schema_matches(option, data))
            .map(|(i, _)| i)
            .collect();
        let ambiguous = matching.len() > 1;
        if ambiguous {
            debug!(path, matches = ?matching, "ambiguous combinator, first match wins");
        }
        CombinatorInfo {
            kind,
            options: options.to_vec(),
            active_index: matching.first().copied(),
            labels: CombinatorInfo::labels_for(options),
            ambiguous,
        }
    }

    fn build_properties(
        &mut self,
        schema: &Value,
        props: &Map<String, Value>,
        data: Option<&Value>,
        path: &str,
    ) -> Vec<String> {
        let obj = data.and_then(Value::as_object);
        let required: HashSet<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|keys| keys.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        props
            .iter()
            .map(|(key, prop)| {
                let child_path = append_path(path, key);
                self.build(
                    prop,
                    obj.and_then(|o| o.get(key)),
                    &child_path,
                    FieldOrigin::Property,
                    required.contains(key.as_str()),
                );
                child_path
            })
            .collect()
    }

    fn build_items(&mut self, schema: &Value, data: Option<&Value>, path: &str) -> (ArrayMeta, Vec<String>) {
        let items: &[Value] = data
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let item_schema = schema
            .get("items")
            .filter(|v| v.is_object())
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        let prefix = schema.get("prefixItems").and_then(Value::as_array);

        let len = items.len() as u64;
        let max_items = schema.get("maxItems").and_then(Value::as_u64);
        let min_items = schema.get("minItems").and_then(Value::as_u64);
        let meta = ArrayMeta {
            item_schema: item_schema.clone(),
            prefix_items: prefix.cloned(),
            can_add: max_items.map_or(true, |max| len < max),
            can_remove: min_items.map_or(true, |min| len > min),
            can_reorder: true,
        };

        let mut children = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let child_path = append_path(path, i);
            let (child_schema, child_origin) = match prefix.and_then(|p| p.get(i)) {
                Some(s) => (s, FieldOrigin::PrefixItem),
                None => (&item_schema, FieldOrigin::ArrayItem),
            };
            self.build(child_schema, Some(item), &child_path, child_origin, false);
            children.push(child_path);
        }
        (meta, children)
    }
}
