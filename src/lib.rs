//! Formica
//!
//! Reactive form models built from a JSON Schema and live instance data.
//!
//! A schema and its data go through a fixed nine-stage pipeline: normalize,
//! resolve `$ref`, merge `allOf`, evaluate `if`/`then`/`else`, evaluate
//! dependents, pick `oneOf`/`anyOf` branches, build the field tree, seed
//! defaults, and finalize. The result is a [`FormModel`]: an index of
//! [`FieldNode`]s keyed by JSON Pointer. A [`FormStore`] owns a model,
//! rebuilds it on every edit, and notifies only the subscribers whose
//! fields changed.
//!
//! # Example
//!
//! ```
//! use formica::{FormStore, PipelineConfig};
//! use serde_json::json;
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let schema = json!({
//!     "type": "object",
//!     "properties": {
//!         "kind": { "enum": ["person", "company"] },
//!         "name": { "type": "string" }
//!     },
//!     "if": { "properties": { "kind": { "const": "company" } } },
//!     "then": { "properties": { "vat": { "type": "string" } } }
//! });
//!
//! let data = json!({ "kind": "person" });
//! let mut store = FormStore::new(schema, Some(data), PipelineConfig::default()).unwrap();
//! assert!(store.node("/vat").is_none());
//!
//! let name_changes = Rc::new(Cell::new(0));
//! let counter = Rc::clone(&name_changes);
//! let _sub = store.subscribe_path("/name", move |_| counter.set(counter.get() + 1));
//!
//! store.set_data("/kind", json!("company")).unwrap();
//! assert!(store.node("/vat").is_some());
//! assert_eq!(name_changes.get(), 0);
//! ```
//!
//! # Stages
//!
//! | Stage | Kind | Effect |
//! |-------|------|--------|
//! | `NORMALIZE` | static | Older dialect keywords rewritten to 2020-12 forms |
//! | `RESOLVE_REFS` | static | Local `$ref`s inlined, cycles left in place |
//! | `MERGE_ALLOF` | static | `allOf` parts folded into their parent |
//! | `EVALUATE_CONDITIONALS` | dynamic | `then`/`else` merged per data |
//! | `EVALUATE_DEPENDENTS` | dynamic | `dependentRequired`/`dependentSchemas` applied |
//! | `RESOLVE_COMBINATORS` | dynamic | Explicit branch selections pinned |
//! | `BUILD_TREE` | dynamic | Field nodes created and indexed |
//! | `APPLY_DEFAULTS` | dynamic | Absent values seeded from `default` |
//! | `FINALIZE` | dynamic | Hook point for middleware |

mod error;
mod knit;
mod loader;
mod model;
mod path;
mod pipeline;
mod schema;
mod store;
mod types;
#[cfg(feature = "validation")]
mod validator;

pub use error::{LoadError, PathError, PipelineError};
pub use knit::{coerce_value, default_value, seed_defaults};
pub use loader::{load_data, load_schema, load_schema_str};
pub use model::{FieldNode, FormModel};
pub use path::{
    append_path, build_path, delete_by_path, get_by_path, is_descendant, last_segment,
    parent_path, parse_path, set_by_path,
};
pub use pipeline::{
    enrichment, middleware, prepare_static, resolve_type, run_pipeline, run_pipeline_prepared,
    Enrichment, Middleware, Next, PipelineConfig, PipelineContext, PreparedSchema,
    StaticStageCache,
};
pub use schema::{
    json_equal, merge_all_of, merge_schemas, normalize_schema, prepare_schema, resolve_refs,
    schema_matches, traverse_schema,
};
pub use store::{
    compute_dirty_paths, is_path_affected, FormState, FormStateListener, FormStore,
    ModelListener, PathListener, Subscription,
};
pub use types::{
    ArrayMeta, CombinatorInfo, CombinatorKind, CombinatorSelections, ConditionalDeps,
    FieldConstraints, FieldKind, FieldOrigin, FieldType, PipelineStage, SchemaType,
};

#[cfg(feature = "validation")]
pub use validator::{validation_enrichment, validation_middleware, ValidationIssue, VALIDATION_ERRORS_KEY};
