//! Stage interceptors and whole-model enrichments.

use std::cell::Cell;
use std::rc::Rc;

use serde_json::{Map, Value};

use super::PipelineContext;
use crate::error::PipelineError;
use crate::model::FieldNode;
use crate::types::PipelineStage;

/// An interceptor around one stage.
///
/// Receives the context and a [`Next`] continuation. Returning without
/// calling `next.run` skips the rest of the chain and the built-in stage.
pub type Middleware = Rc<dyn Fn(PipelineContext, &Next<'_>) -> Result<PipelineContext, PipelineError>>;

/// Runs once per indexed node after all stages. Returned entries are
/// shallow-merged into the node's `extensions`.
pub type Enrichment = Rc<dyn Fn(&FieldNode, &PipelineContext) -> Option<Map<String, Value>>>;

pub(crate) type StageFn = fn(PipelineContext) -> PipelineContext;

/// Wrap a closure as a [`Middleware`].
pub fn middleware<F>(f: F) -> Middleware
where
    F: Fn(PipelineContext, &Next<'_>) -> Result<PipelineContext, PipelineError> + 'static,
{
    Rc::new(f)
}

/// Wrap a closure as an [`Enrichment`].
pub fn enrichment<F>(f: F) -> Enrichment
where
    F: Fn(&FieldNode, &PipelineContext) -> Option<Map<String, Value>> + 'static,
{
    Rc::new(f)
}

/// Continuation handed to a middleware: the rest of the chain plus the
/// built-in stage body. May be run at most once.
pub struct Next<'a> {
    stage: PipelineStage,
    rest: &'a [Middleware],
    body: StageFn,
    called: Cell<bool>,
}

impl Next<'_> {
    /// Invoke the next interceptor, or the built-in stage when none remain.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::NextCalledMultipleTimes` on a second call, and
    /// propagates errors from inner middleware.
    pub fn run(&self, ctx: PipelineContext) -> Result<PipelineContext, PipelineError> {
        if self.called.replace(true) {
            return Err(PipelineError::NextCalledMultipleTimes { stage: self.stage });
        }
        dispatch(ctx, self.stage, self.rest, self.body)
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }
}

/// Run `chain` outermost-first around `body`.
pub(crate) fn dispatch(
    ctx: PipelineContext,
    stage: PipelineStage,
    chain: &[Middleware],
    body: StageFn,
) -> Result<PipelineContext, PipelineError> {
    let Some((first, rest)) = chain.split_first() else {
        return Ok(body(ctx));
    };
    let next = Next {
        stage,
        rest,
        body,
        called: Cell::new(false),
    };
    first(ctx, &next)
}

/// Run every enrichment over every node, merging results into `extensions`.
pub(crate) fn apply_enrichments(ctx: &mut PipelineContext, enrichments: &[Enrichment]) {
    for enrich in enrichments {
        let view: &PipelineContext = ctx;
        let updates: Vec<(String, Map<String, Value>)> = view
            .index
            .values()
            .filter_map(|node| enrich(node, view).map(|ext| (node.path.clone(), ext)))
            .collect();
        for (path, ext) in updates {
            if let Some(node) = ctx.index.get_mut(&path) {
                node.extensions.extend(ext);
            }
        }
    }
}
