//! The nine-stage schema-to-model pipeline.
//!
//! Static stages (normalize, resolve refs, merge allOf) depend only on the
//! schema; dynamic stages re-run whenever data changes. Each stage can be
//! wrapped by ordered [`Middleware`], and whole-model [`Enrichment`]s run
//! after the last stage.

mod context;
mod middleware;
mod stages;
mod tree;

pub use context::PipelineContext;
pub use middleware::{enrichment, middleware, Enrichment, Middleware, Next};
pub use tree::resolve_type;

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::error::PipelineError;
use crate::model::FormModel;
use crate::types::{CombinatorSelections, PipelineStage};
use middleware::{apply_enrichments, dispatch, StageFn};

/// Middleware, enrichments and caching for pipeline runs.
#[derive(Clone)]
pub struct PipelineConfig {
    middleware: BTreeMap<PipelineStage, Vec<Middleware>>,
    enrichments: Vec<Enrichment>,
    /// Reuse static-stage output across store rebuilds.
    pub cache_static_stages: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            middleware: BTreeMap::new(),
            enrichments: Vec::new(),
            cache_static_stages: true,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware to `stage`. Earlier additions run outermost.
    pub fn with_middleware(mut self, stage: PipelineStage, mw: Middleware) -> Self {
        self.middleware.entry(stage).or_default().push(mw);
        self
    }

    pub fn with_enrichment(mut self, enrich: Enrichment) -> Self {
        self.enrichments.push(enrich);
        self
    }

    pub fn with_static_cache(mut self, enabled: bool) -> Self {
        self.cache_static_stages = enabled;
        self
    }

    pub fn middleware_for(&self, stage: PipelineStage) -> &[Middleware] {
        self.middleware.get(&stage).map(Vec::as_slice).unwrap_or_default()
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: BTreeMap<_, _> = self
            .middleware
            .iter()
            .map(|(stage, chain)| (stage.as_str(), chain.len()))
            .collect();
        f.debug_struct("PipelineConfig")
            .field("middleware", &counts)
            .field("enrichments", &self.enrichments.len())
            .field("cache_static_stages", &self.cache_static_stages)
            .finish()
    }
}

/// Output of the static stages, reusable across data changes.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedSchema {
    pub schema: Value,
    pub meta: Map<String, Value>,
}

/// Run all nine stages, then enrichments.
///
/// Schema and data are deep-copied on entry; the caller's values are never
/// modified.
///
/// # Errors
///
/// Returns `PipelineError::NextCalledMultipleTimes` if a middleware misuses
/// its continuation.
pub fn run_pipeline(
    schema: &Value,
    data: Option<&Value>,
    config: &PipelineConfig,
    selections: &CombinatorSelections,
) -> Result<FormModel, PipelineError> {
    let mut ctx = PipelineContext::new(schema, data);
    ctx.combinator_selections = selections.clone();
    let ctx = run_stages(ctx, &PipelineStage::STATIC, config)?;
    let ctx = run_stages(ctx, &PipelineStage::DYNAMIC, config)?;
    Ok(finish(ctx, config))
}

/// Run only the static stages (with their middleware). Data is absent.
///
/// # Errors
///
/// Returns `PipelineError::NextCalledMultipleTimes` if a middleware misuses
/// its continuation.
pub fn prepare_static(schema: &Value, config: &PipelineConfig) -> Result<PreparedSchema, PipelineError> {
    let ctx = run_stages(PipelineContext::new(schema, None), &PipelineStage::STATIC, config)?;
    Ok(PreparedSchema {
        schema: ctx.schema,
        meta: ctx.meta,
    })
}

/// Run the dynamic stages against an already prepared schema.
///
/// Produces the same model as [`run_pipeline`] on the unprepared schema, as long
/// as static-stage middleware does not read the data.
///
/// # Errors
///
/// Returns `PipelineError::NextCalledMultipleTimes` if a middleware misuses
/// its continuation.
pub fn run_pipeline_prepared(
    prepared: &PreparedSchema,
    data: Option<&Value>,
    config: &PipelineConfig,
    selections: &CombinatorSelections,
) -> Result<FormModel, PipelineError> {
    let mut ctx = PipelineContext::new(&prepared.schema, data);
    ctx.meta = prepared.meta.clone();
    ctx.combinator_selections = selections.clone();
    let ctx = run_stages(ctx, &PipelineStage::DYNAMIC, config)?;
    Ok(finish(ctx, config))
}

/// Static-stage results keyed by schema identity (`Rc` pointer), not content.
///
/// Two deep-equal schemas behind different `Rc`s are prepared separately.
/// Entries assume one fixed [`PipelineConfig`].
#[derive(Debug, Default)]
pub struct StaticStageCache {
    entries: Vec<(Rc<Value>, Rc<PreparedSchema>)>,
}

impl StaticStageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached preparation of `schema`, computing it on a miss.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`prepare_static`].
    pub fn get_or_prepare(
        &mut self,
        schema: &Rc<Value>,
        config: &PipelineConfig,
    ) -> Result<Rc<PreparedSchema>, PipelineError> {
        if let Some((_, prepared)) = self.entries.iter().find(|(s, _)| Rc::ptr_eq(s, schema)) {
            trace!("static stage cache hit");
            return Ok(Rc::clone(prepared));
        }
        debug!("static stage cache miss, preparing schema");
        let prepared = Rc::new(prepare_static(schema, config)?);
        self.entries.push((Rc::clone(schema), Rc::clone(&prepared)));
        Ok(prepared)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// --- Internal implementation ---

fn stage_body(stage: PipelineStage) -> StageFn {
    match stage {
        PipelineStage::Normalize => stages::normalize,
        PipelineStage::ResolveRefs => stages::resolve_refs_stage,
        PipelineStage::MergeAllOf => stages::merge_all_of_stage,
        PipelineStage::EvaluateConditionals => stages::evaluate_conditionals,
        PipelineStage::EvaluateDependents => stages::evaluate_dependents,
        PipelineStage::ResolveCombinators => stages::resolve_combinators,
        PipelineStage::BuildTree => tree::build_tree,
        PipelineStage::ApplyDefaults => stages::apply_defaults,
        PipelineStage::Finalize => stages::finalize,
    }
}

fn run_stages(
    mut ctx: PipelineContext,
    order: &[PipelineStage],
    config: &PipelineConfig,
) -> Result<PipelineContext, PipelineError> {
    for &stage in order {
        ctx.stage = stage;
        let chain = config.middleware_for(stage);
        trace!(stage = %stage, middleware = chain.len(), "running stage");
        ctx = dispatch(ctx, stage, chain, stage_body(stage))?;
    }
    Ok(ctx)
}

fn finish(mut ctx: PipelineContext, config: &PipelineConfig) -> FormModel {
    if !config.enrichments.is_empty() {
        apply_enrichments(&mut ctx, &config.enrichments);
    }
    ctx.into_model()
}
