//! Core types shared by the pipeline, the field tree and the store.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Keywords whose values are maps of sub-schemas.
pub const MAP_KEYWORDS: &[&str] = &[
    "$defs",
    "properties",
    "patternProperties",
    "dependentSchemas",
];

/// Keywords whose values are a single sub-schema (when the value is an object).
pub const SINGLE_KEYWORDS: &[&str] = &[
    "additionalProperties",
    "items",
    "not",
    "if",
    "then",
    "else",
    "contains",
];

/// Keywords whose values are arrays of sub-schemas.
pub const ARRAY_KEYWORDS: &[&str] = &["prefixItems", "allOf", "anyOf", "oneOf"];

/// Path → chosen branch index for explicitly pinned `oneOf`/`anyOf` nodes.
pub type CombinatorSelections = BTreeMap<String, usize>;

/// Data path → schema paths whose shape depends on that data path.
pub type ConditionalDeps = BTreeMap<String, BTreeSet<String>>;

/// A single JSON Schema `type` keyword value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    Null,
}

impl SchemaType {
    /// Parse a type name. Returns `None` for names outside the vocabulary.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(SchemaType::String),
            "number" => Some(SchemaType::Number),
            "integer" => Some(SchemaType::Integer),
            "boolean" => Some(SchemaType::Boolean),
            "object" => Some(SchemaType::Object),
            "array" => Some(SchemaType::Array),
            "null" => Some(SchemaType::Null),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaType::String => "string",
            SchemaType::Number => "number",
            SchemaType::Integer => "integer",
            SchemaType::Boolean => "boolean",
            SchemaType::Object => "object",
            SchemaType::Array => "array",
            SchemaType::Null => "null",
        }
    }

    /// The type a runtime value has. Numbers report `Number`, never `Integer`.
    pub fn of_value(value: &Value) -> Self {
        match value {
            Value::Null => SchemaType::Null,
            Value::Bool(_) => SchemaType::Boolean,
            Value::Number(_) => SchemaType::Number,
            Value::String(_) => SchemaType::String,
            Value::Array(_) => SchemaType::Array,
            Value::Object(_) => SchemaType::Object,
        }
    }

    /// Whether `value` is an instance of this type.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            SchemaType::String => value.is_string(),
            SchemaType::Number => value.is_number(),
            SchemaType::Integer => match value {
                Value::Number(n) => {
                    n.is_i64() || n.is_u64() || n.as_f64().map_or(false, |f| f.fract() == 0.0)
                }
                _ => false,
            },
            SchemaType::Boolean => value.is_boolean(),
            SchemaType::Object => value.is_object(),
            SchemaType::Array => value.is_array(),
            SchemaType::Null => value.is_null(),
        }
    }

    /// Read the `type` keyword of a schema as a list. Unknown names are skipped.
    pub fn list_from_schema(schema: &Value) -> Option<Vec<SchemaType>> {
        match schema.get("type")? {
            Value::String(s) => Some(SchemaType::parse(s).into_iter().collect()),
            Value::Array(arr) => Some(
                arr.iter()
                    .filter_map(|t| t.as_str().and_then(SchemaType::parse))
                    .collect(),
            ),
            _ => None,
        }
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved type of a field node: one type or a set of alternatives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldType {
    Single(SchemaType),
    Union(Vec<SchemaType>),
}

impl FieldType {
    /// Collapse a list: exactly one entry becomes `Single`.
    pub fn from_list(mut types: Vec<SchemaType>) -> Self {
        if types.len() == 1 {
            FieldType::Single(types.remove(0))
        } else {
            FieldType::Union(types)
        }
    }

    pub fn includes(&self, ty: SchemaType) -> bool {
        match self {
            FieldType::Single(t) => *t == ty,
            FieldType::Union(ts) => ts.contains(&ty),
        }
    }

    /// First declared alternative, if any.
    pub fn primary(&self) -> Option<SchemaType> {
        match self {
            FieldType::Single(t) => Some(*t),
            FieldType::Union(ts) => ts.first().copied(),
        }
    }
}

/// How a field node came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldOrigin {
    Root,
    Property,
    AdditionalProperty,
    PatternProperty,
    ArrayItem,
    PrefixItem,
    ConditionalThen,
    ConditionalElse,
    OneOfBranch,
    AnyOfBranch,
    DependentSchema,
}

/// Shape classification of a field node, decided once at tree construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Leaf,
    Object,
    Array,
    Combinator,
}

/// Validation keywords flattened off a node's schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConstraints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusive_minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusive_maximum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiple_of: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_items: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_items: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_properties: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_properties: Option<u64>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(rename = "const", skip_serializing_if = "Option::is_none")]
    pub const_value: Option<Value>,
}

impl FieldConstraints {
    /// Extract the constraint keywords present on `schema`.
    pub fn from_schema(schema: &Value) -> Self {
        let f = |k: &str| schema.get(k).and_then(Value::as_f64);
        let u = |k: &str| schema.get(k).and_then(Value::as_u64);
        let s = |k: &str| schema.get(k).and_then(Value::as_str).map(String::from);
        Self {
            minimum: f("minimum"),
            maximum: f("maximum"),
            exclusive_minimum: f("exclusiveMinimum"),
            exclusive_maximum: f("exclusiveMaximum"),
            multiple_of: f("multipleOf"),
            min_length: u("minLength"),
            max_length: u("maxLength"),
            pattern: s("pattern"),
            format: s("format"),
            min_items: u("minItems"),
            max_items: u("maxItems"),
            unique_items: schema.get("uniqueItems").and_then(Value::as_bool),
            min_properties: u("minProperties"),
            max_properties: u("maxProperties"),
            enum_values: schema.get("enum").and_then(Value::as_array).cloned(),
            const_value: schema.get("const").cloned(),
        }
    }
}

/// Which combinator keyword a node declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CombinatorKind {
    #[serde(rename = "oneOf")]
    OneOf,
    #[serde(rename = "anyOf")]
    AnyOf,
}

impl CombinatorKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            CombinatorKind::OneOf => "oneOf",
            CombinatorKind::AnyOf => "anyOf",
        }
    }

    /// Detect the combinator on a schema. `oneOf` wins when both are present.
    pub fn of_schema(schema: &Value) -> Option<(Self, &Vec<Value>)> {
        if let Some(options) = schema.get("oneOf").and_then(Value::as_array) {
            return Some((CombinatorKind::OneOf, options));
        }
        schema
            .get("anyOf")
            .and_then(Value::as_array)
            .map(|options| (CombinatorKind::AnyOf, options))
    }
}

/// Resolution state of a `oneOf`/`anyOf` node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinatorInfo {
    #[serde(rename = "type")]
    pub kind: CombinatorKind,
    pub options: Vec<Value>,
    pub active_index: Option<usize>,
    pub labels: Vec<String>,
    pub ambiguous: bool,
}

impl CombinatorInfo {
    /// Branch labels: each option's `title`, else `Option N` (1-based).
    pub fn labels_for(options: &[Value]) -> Vec<String> {
        options
            .iter()
            .enumerate()
            .map(|(i, opt)| {
                opt.get("title")
                    .and_then(Value::as_str)
                    .map(String::from)
                    .unwrap_or_else(|| format!("Option {}", i + 1))
            })
            .collect()
    }
}

/// Editing permissions and item schemas of an array node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayMeta {
    pub item_schema: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix_items: Option<Vec<Value>>,
    pub can_add: bool,
    pub can_remove: bool,
    pub can_reorder: bool,
}

/// The fixed stages of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStage {
    Normalize,
    ResolveRefs,
    MergeAllOf,
    EvaluateConditionals,
    EvaluateDependents,
    ResolveCombinators,
    BuildTree,
    ApplyDefaults,
    Finalize,
}

impl PipelineStage {
    /// Stages whose output depends only on the schema.
    pub const STATIC: [PipelineStage; 3] = [
        PipelineStage::Normalize,
        PipelineStage::ResolveRefs,
        PipelineStage::MergeAllOf,
    ];

    /// Stages that must re-run whenever data changes.
    pub const DYNAMIC: [PipelineStage; 6] = [
        PipelineStage::EvaluateConditionals,
        PipelineStage::EvaluateDependents,
        PipelineStage::ResolveCombinators,
        PipelineStage::BuildTree,
        PipelineStage::ApplyDefaults,
        PipelineStage::Finalize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Normalize => "NORMALIZE",
            PipelineStage::ResolveRefs => "RESOLVE_REFS",
            PipelineStage::MergeAllOf => "MERGE_ALLOF",
            PipelineStage::EvaluateConditionals => "EVALUATE_CONDITIONALS",
            PipelineStage::EvaluateDependents => "EVALUATE_DEPENDENTS",
            PipelineStage::ResolveCombinators => "RESOLVE_COMBINATORS",
            PipelineStage::BuildTree => "BUILD_TREE",
            PipelineStage::ApplyDefaults => "APPLY_DEFAULTS",
            PipelineStage::Finalize => "FINALIZE",
        }
    }

    pub fn is_static(&self) -> bool {
        Self::STATIC.contains(self)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schema_type_parse() {
        assert_eq!(SchemaType::parse("integer"), Some(SchemaType::Integer));
        assert_eq!(SchemaType::parse("object"), Some(SchemaType::Object));
        assert_eq!(SchemaType::parse("int"), None);
    }

    #[test]
    fn integer_matches_whole_floats() {
        assert!(SchemaType::Integer.matches(&json!(3)));
        assert!(SchemaType::Integer.matches(&json!(3.0)));
        assert!(!SchemaType::Integer.matches(&json!(3.5)));
        assert!(SchemaType::Number.matches(&json!(3.5)));
    }

    #[test]
    fn type_list_skips_unknown_names() {
        let schema = json!({ "type": ["string", "widget", "null"] });
        assert_eq!(
            SchemaType::list_from_schema(&schema),
            Some(vec![SchemaType::String, SchemaType::Null])
        );
        assert_eq!(SchemaType::list_from_schema(&json!({})), None);
    }

    #[test]
    fn field_type_collapses_single() {
        assert_eq!(
            FieldType::from_list(vec![SchemaType::Object]),
            FieldType::Single(SchemaType::Object)
        );
        let union = FieldType::from_list(vec![SchemaType::String, SchemaType::Null]);
        assert!(union.includes(SchemaType::Null));
        assert_eq!(union.primary(), Some(SchemaType::String));
    }

    #[test]
    fn constraints_from_schema() {
        let c = FieldConstraints::from_schema(&json!({
            "minimum": 1,
            "maxLength": 10,
            "pattern": "^a",
            "enum": ["a", "b"]
        }));
        assert_eq!(c.minimum, Some(1.0));
        assert_eq!(c.max_length, Some(10));
        assert_eq!(c.pattern.as_deref(), Some("^a"));
        assert_eq!(c.enum_values, Some(vec![json!("a"), json!("b")]));
        assert_eq!(c.maximum, None);
    }

    #[test]
    fn combinator_labels_fall_back_to_position() {
        let options = vec![json!({ "title": "Email" }), json!({})];
        assert_eq!(
            CombinatorInfo::labels_for(&options),
            vec!["Email".to_string(), "Option 2".to_string()]
        );
    }

    #[test]
    fn stage_split() {
        assert!(PipelineStage::MergeAllOf.is_static());
        assert!(!PipelineStage::BuildTree.is_static());
        assert_eq!(PipelineStage::STATIC.len() + PipelineStage::DYNAMIC.len(), 9);
    }
}
