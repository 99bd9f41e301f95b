//! The form model: an indexed tree of field nodes produced by one pipeline run.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::path::last_segment;
use crate::types::{
    ArrayMeta, CombinatorInfo, ConditionalDeps, FieldConstraints, FieldKind, FieldOrigin,
    FieldType, SchemaType,
};

/// One node of the field tree.
///
/// Children are stored as paths into the owning [`FormModel`] index. A child
/// path is always the parent path plus one pointer segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldNode {
    pub path: String,
    pub schema: Value,
    #[serde(rename = "type")]
    pub ty: FieldType,
    /// Current data at `path`. `None` is absent, not JSON `null`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    pub children: Vec<String>,
    pub required: bool,
    pub read_only: bool,
    pub deprecated: bool,
    pub active: bool,
    pub constraints: FieldConstraints,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combinator: Option<CombinatorInfo>,
    pub origin: FieldOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub array_meta: Option<ArrayMeta>,
    pub kind: FieldKind,
    /// Collaborator-attached data (validation errors, ...).
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extensions: Map<String, Value>,
}

impl FieldNode {
    /// The last segment of the path, unescaped. Empty for the root.
    pub fn name(&self) -> String {
        last_segment(&self.path).unwrap_or_default()
    }

    /// Display label: the schema `title`, falling back to [`name`](Self::name).
    pub fn label(&self) -> String {
        self.schema
            .get("title")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| self.name())
    }

    pub fn description(&self) -> Option<&str> {
        self.schema.get("description").and_then(Value::as_str)
    }

    pub fn has_type(&self, ty: SchemaType) -> bool {
        self.ty.includes(ty)
    }

    /// True when the node offers a non-empty `enum` choice list.
    pub fn has_enum(&self) -> bool {
        self.constraints
            .enum_values
            .as_ref()
            .map_or(false, |values| !values.is_empty())
    }

    /// Index of the resolved combinator branch, if any.
    pub fn active_branch(&self) -> Option<usize> {
        self.combinator.as_ref().and_then(|c| c.active_index)
    }
}

/// Output of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormModel {
    /// The schema after all stages (conditionals and selections applied).
    pub schema: Value,
    /// The data snapshot after defaults.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Every field node, keyed by path. The root lives at `""`.
    pub index: BTreeMap<String, FieldNode>,
    pub conditional_deps: ConditionalDeps,
    /// Free-form annotations left by middleware.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
}

impl FormModel {
    /// The root field node. Absent only if a middleware skipped tree building.
    pub fn root(&self) -> Option<&FieldNode> {
        self.index.get("")
    }

    pub fn get(&self, path: &str) -> Option<&FieldNode> {
        self.index.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    /// The children of the node at `path`, in declaration order.
    pub fn children<'a>(&'a self, path: &str) -> impl Iterator<Item = &'a FieldNode> + 'a {
        let paths = self
            .index
            .get(path)
            .map(|node| node.children.as_slice())
            .unwrap_or_default();
        paths.iter().filter_map(move |p| self.index.get(p))
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Render the tree as nested JSON, children inlined under each node.
    ///
    /// Useful for inspection; the flat index is the canonical form.
    pub fn to_tree_json(&self) -> Value {
        match self.root() {
            Some(root) => self.node_json(root),
            None => Value::Null,
        }
    }

    fn node_json(&self, node: &FieldNode) -> Value {
        let mut out = match serde_json::to_value(node) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        let children: Vec<Value> = self
            .children(&node.path)
            .map(|child| self.node_json(child))
            .collect();
        out.insert("children".to_string(), Value::Array(children));
        Value::Object(out)
    }
}
