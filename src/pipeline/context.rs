use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::model::{FieldNode, FormModel};
use crate::types::{CombinatorInfo, CombinatorSelections, ConditionalDeps, PipelineStage};

/// State threaded through every stage of one pipeline run.
///
/// The context owns deep copies of the caller's schema and data, so stages
/// and middleware may rewrite them freely.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub schema: Value,
    /// `None` is absent data, not JSON `null`.
    pub data: Option<Value>,
    /// Field nodes by path, filled by the tree-building stage.
    pub index: BTreeMap<String, FieldNode>,
    pub conditional_deps: ConditionalDeps,
    /// Stage currently executing.
    pub stage: PipelineStage,
    /// Scratch space for middleware.
    pub meta: Map<String, Value>,
    /// Explicit branch choices, path to index.
    pub combinator_selections: CombinatorSelections,
    /// Combinators pinned by the selection stage, attached during tree building.
    pub resolved_combinators: BTreeMap<String, CombinatorInfo>,
}

impl PipelineContext {
    pub fn new(schema: &Value, data: Option<&Value>) -> Self {
        Self {
            schema: schema.clone(),
            data: data.cloned(),
            index: BTreeMap::new(),
            conditional_deps: ConditionalDeps::new(),
            stage: PipelineStage::Normalize,
            meta: Map::new(),
            combinator_selections: CombinatorSelections::new(),
            resolved_combinators: BTreeMap::new(),
        }
    }

    pub fn root(&self) -> Option<&FieldNode> {
        self.index.get("")
    }

    pub fn into_model(self) -> FormModel {
        FormModel {
            schema: self.schema,
            data: self.data,
            index: self.index,
            conditional_deps: self.conditional_deps,
            meta: self.meta,
        }
    }
}
