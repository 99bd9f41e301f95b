//! Reactive store: owns the current form model, applies edits by re-running
//! the pipeline, and notifies only the subscribers whose fields changed.

mod differ;

pub use differ::{compute_dirty_paths, is_path_affected};

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::{Rc, Weak};

use serde::Serialize;
use serde_json::Value;
use tracing::trace;

use crate::error::PipelineError;
use crate::model::{FieldNode, FormModel};
use crate::path::{append_path, get_by_path, set_by_path};
use crate::pipeline::{run_pipeline, run_pipeline_prepared, PipelineConfig, StaticStageCache};
use crate::types::CombinatorSelections;
use differ::node_changed;

pub type ModelListener = Rc<dyn Fn(&FormModel)>;
pub type PathListener = Rc<dyn Fn(&FieldNode)>;
pub type FormStateListener = Rc<dyn Fn(&FormState)>;

/// Current data plus whether it differs from the data the store started with.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormState {
    pub data: Option<Value>,
    pub is_dirty: bool,
}

/// Handle returned by the `subscribe*` methods.
///
/// Dropping it keeps the listener registered; call [`unsubscribe`](Self::unsubscribe)
/// to remove it.
#[must_use = "dropping a Subscription does not unsubscribe; call unsubscribe() to remove the listener"]
pub struct Subscription {
    registry: Weak<RefCell<Registry>>,
    key: ListenerKey,
}

impl Subscription {
    pub fn unsubscribe(self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = registry.borrow_mut();
        match self.key {
            ListenerKey::Model(id) => {
                registry.model.remove(&id);
            }
            ListenerKey::FormState(id) => {
                registry.form_state.remove(&id);
            }
            ListenerKey::Path(path, id) => {
                if let Some(listeners) = registry.paths.get_mut(&path) {
                    listeners.remove(&id);
                    if listeners.is_empty() {
                        registry.paths.remove(&path);
                    }
                }
            }
        }
    }
}

/// Owner of a form model that rebuilds it on every accepted edit.
///
/// All writes go through [`set_data`](Self::set_data) and
/// [`set_combinator_index`](Self::set_combinator_index). Each accepted write
/// produces a new model; earlier models handed out stay untouched.
pub struct FormStore {
    schema: Rc<Value>,
    config: PipelineConfig,
    cache: Option<StaticStageCache>,
    model: Rc<FormModel>,
    initial_data: Option<Value>,
    selections: CombinatorSelections,
    listeners: Rc<RefCell<Registry>>,
}

impl FormStore {
    /// Build the initial model.
    ///
    /// # Errors
    ///
    /// Propagates pipeline errors from the configured middleware.
    pub fn new(
        schema: impl Into<Rc<Value>>,
        initial_data: Option<Value>,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        let schema = schema.into();
        let mut cache = config.cache_static_stages.then(StaticStageCache::new);
        let selections = CombinatorSelections::new();
        let model = build_model(
            &schema,
            &config,
            cache.as_mut(),
            initial_data.as_ref(),
            &selections,
        )?;
        Ok(Self {
            schema,
            config,
            cache,
            initial_data: model.data.clone(),
            model: Rc::new(model),
            selections,
            listeners: Rc::new(RefCell::new(Registry::default())),
        })
    }

    pub fn model(&self) -> &FormModel {
        &self.model
    }

    /// Shared handle to the current model. A new handle is created on every
    /// accepted write, so `Rc::ptr_eq` tells whether a rebuild happened.
    pub fn model_rc(&self) -> Rc<FormModel> {
        Rc::clone(&self.model)
    }

    pub fn data(&self) -> Option<&Value> {
        self.model.data()
    }

    pub fn node(&self, path: &str) -> Option<&FieldNode> {
        self.model.get(path)
    }

    pub fn schema(&self) -> &Rc<Value> {
        &self.schema
    }

    pub fn selections(&self) -> &CombinatorSelections {
        &self.selections
    }

    pub fn form_state(&self) -> FormState {
        FormState {
            data: self.model.data.clone(),
            is_dirty: self.model.data != self.initial_data,
        }
    }

    /// Write `value` at `path`, rebuild, and notify.
    ///
    /// Writing a value equal to the current one is a no-op: no rebuild and
    /// no notification.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Path` for malformed paths or non-numeric array
    /// segments, and propagates middleware errors.
    pub fn set_data(&mut self, path: &str, value: Value) -> Result<(), PipelineError> {
        if get_by_path(self.model.data(), path)? == Some(&value) {
            trace!(path, "value unchanged, skipping rebuild");
            return Ok(());
        }
        let data = set_by_path(self.model.data(), path, value)?;
        let dirty = compute_dirty_paths(path, &self.model.conditional_deps)?;
        self.commit(Some(data), &dirty)
    }

    /// Pin the `oneOf`/`anyOf` at `path` to branch `index`, overriding what
    /// the data would match. The choice persists across later edits.
    ///
    /// Out-of-range indexes are kept but have no effect.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Path` for malformed paths and propagates
    /// middleware errors.
    pub fn set_combinator_index(&mut self, path: &str, index: usize) -> Result<(), PipelineError> {
        let dirty = compute_dirty_paths(path, &self.model.conditional_deps)?;
        self.selections.insert(path.to_string(), index);
        let data = self.model.data.clone();
        self.commit(data, &dirty)
    }

    /// Listen to every accepted mutation.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&FormModel) + 'static,
    {
        let mut registry = self.listeners.borrow_mut();
        let id = registry.next_id();
        registry.model.insert(id, Rc::new(listener));
        self.subscription(ListenerKey::Model(id))
    }

    /// Listen to changes of the field at `path`.
    pub fn subscribe_path<F>(&self, path: &str, listener: F) -> Subscription
    where
        F: Fn(&FieldNode) + 'static,
    {
        let mut registry = self.listeners.borrow_mut();
        let id = registry.next_id();
        registry
            .paths
            .entry(path.to_string())
            .or_default()
            .insert(id, Rc::new(listener));
        self.subscription(ListenerKey::Path(path.to_string(), id))
    }

    /// Listen to the derived [`FormState`] on every accepted mutation.
    pub fn subscribe_form_state<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&FormState) + 'static,
    {
        let mut registry = self.listeners.borrow_mut();
        let id = registry.next_id();
        registry.form_state.insert(id, Rc::new(listener));
        self.subscription(ListenerKey::FormState(id))
    }

    /// Paths that currently have at least one path listener.
    pub fn subscribed_paths(&self) -> Vec<String> {
        self.listeners.borrow().paths.keys().cloned().collect()
    }

    // --- Array helpers ---
    //
    // Each computes a new array and writes it through `set_data`.

    /// Append `item`, creating the array if nothing is there yet.
    pub fn append_item(&mut self, path: &str, item: Value) -> Result<(), PipelineError> {
        let mut items = self.array_at(path)?.unwrap_or_default();
        items.push(item);
        self.set_data(path, Value::Array(items))
    }

    /// Insert `item` at `index`, clamped to the array length.
    pub fn insert_item(&mut self, path: &str, index: usize, item: Value) -> Result<(), PipelineError> {
        let Some(mut items) = self.array_at(path)? else {
            return Ok(());
        };
        let index = index.min(items.len());
        items.insert(index, item);
        self.set_data(path, Value::Array(items))
    }

    pub fn remove_item(&mut self, path: &str, index: usize) -> Result<(), PipelineError> {
        let Some(mut items) = self.array_at(path)? else {
            return Ok(());
        };
        if index >= items.len() {
            return Ok(());
        }
        items.remove(index);
        self.set_data(path, Value::Array(items))
    }

    /// Replace the element at `index` in place.
    pub fn replace_item(&mut self, path: &str, index: usize, item: Value) -> Result<(), PipelineError> {
        let Some(items) = self.array_at(path)? else {
            return Ok(());
        };
        if index >= items.len() {
            return Ok(());
        }
        self.set_data(&append_path(path, index), item)
    }

    /// Move the element at `from` so it ends up at `to`.
    pub fn move_item(&mut self, path: &str, from: usize, to: usize) -> Result<(), PipelineError> {
        let Some(mut items) = self.array_at(path)? else {
            return Ok(());
        };
        if from >= items.len() || to >= items.len() || from == to {
            return Ok(());
        }
        let item = items.remove(from);
        items.insert(to, item);
        self.set_data(path, Value::Array(items))
    }

    pub fn swap_items(&mut self, path: &str, a: usize, b: usize) -> Result<(), PipelineError> {
        let Some(mut items) = self.array_at(path)? else {
            return Ok(());
        };
        if a >= items.len() || b >= items.len() || a == b {
            return Ok(());
        }
        items.swap(a, b);
        self.set_data(path, Value::Array(items))
    }

    pub fn clear_items(&mut self, path: &str) -> Result<(), PipelineError> {
        if self.array_at(path)?.is_none() {
            return Ok(());
        }
        self.set_data(path, Value::Array(Vec::new()))
    }

    // --- Internal implementation ---

    fn array_at(&self, path: &str) -> Result<Option<Vec<Value>>, PipelineError> {
        Ok(get_by_path(self.model.data(), path)?
            .and_then(Value::as_array)
            .cloned())
    }

    fn subscription(&self, key: ListenerKey) -> Subscription {
        Subscription {
            registry: Rc::downgrade(&self.listeners),
            key,
        }
    }

    fn commit(&mut self, data: Option<Value>, dirty: &BTreeSet<String>) -> Result<(), PipelineError> {
        let next = build_model(
            &self.schema,
            &self.config,
            self.cache.as_mut(),
            data.as_ref(),
            &self.selections,
        )?;
        let prev = std::mem::replace(&mut self.model, Rc::new(next));
        self.notify(&prev, dirty);
        Ok(())
    }

    fn notify(&self, prev: &FormModel, dirty: &BTreeSet<String>) {
        let next = &*self.model;

        // Snapshot listeners so callbacks may subscribe or unsubscribe.
        let (path_listeners, model_listeners, state_listeners) = {
            let registry = self.listeners.borrow();
            let paths: Vec<(String, Vec<PathListener>)> = registry
                .paths
                .iter()
                .filter(|(path, _)| is_path_affected(path, dirty))
                .map(|(path, ls)| (path.clone(), ls.values().cloned().collect()))
                .collect();
            (
                paths,
                registry.model.values().cloned().collect::<Vec<_>>(),
                registry.form_state.values().cloned().collect::<Vec<_>>(),
            )
        };

        for (path, listeners) in path_listeners {
            let Some(node) = next.get(&path) else {
                continue;
            };
            if !node_changed(prev.get(&path), Some(node)) {
                trace!(path = %path, "subscribed node unchanged");
                continue;
            }
            for listener in listeners {
                listener(node);
            }
        }

        for listener in model_listeners {
            listener(next);
        }

        if !state_listeners.is_empty() {
            let state = self.form_state();
            for listener in state_listeners {
                listener(&state);
            }
        }
    }
}

#[derive(Default)]
struct Registry {
    last_id: u64,
    model: BTreeMap<u64, ModelListener>,
    paths: BTreeMap<String, BTreeMap<u64, PathListener>>,
    form_state: BTreeMap<u64, FormStateListener>,
}

impl Registry {
    fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }
}

enum ListenerKey {
    Model(u64),
    Path(String, u64),
    FormState(u64),
}

fn build_model(
    schema: &Rc<Value>,
    config: &PipelineConfig,
    cache: Option<&mut StaticStageCache>,
    data: Option<&Value>,
    selections: &CombinatorSelections,
) -> Result<FormModel, PipelineError> {
    match cache {
        Some(cache) => {
            let prepared = cache.get_or_prepare(schema, config)?;
            run_pipeline_prepared(&prepared, data, config, selections)
        }
        None => run_pipeline(schema, data, config, selections),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    fn store() -> FormStore {
        FormStore::new(
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "tags": { "type": "array", "items": { "type": "string" } }
                }
            }),
            Some(json!({ "name": "a", "tags": ["x", "y", "z"] })),
            PipelineConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn unsubscribe_last_path_listener_removes_entry() {
        let store = store();
        let first = store.subscribe_path("/name", |_| {});
        let second = store.subscribe_path("/name", |_| {});
        first.unsubscribe();
        assert_eq!(store.subscribed_paths(), vec!["/name"]);
        second.unsubscribe();
        assert!(store.subscribed_paths().is_empty());
    }

    #[test]
    fn unsubscribed_model_listener_is_silent() {
        let mut store = store();
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let sub = store.subscribe(move |_| counter.set(counter.get() + 1));
        store.set_data("/name", json!("b")).unwrap();
        sub.unsubscribe();
        store.set_data("/name", json!("c")).unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn array_helpers() {
        let mut store = store();
        store.append_item("/tags", json!("w")).unwrap();
        assert_eq!(store.data().unwrap()["tags"], json!(["x", "y", "z", "w"]));

        store.move_item("/tags", 0, 3).unwrap();
        assert_eq!(store.data().unwrap()["tags"], json!(["y", "z", "w", "x"]));

        store.swap_items("/tags", 0, 1).unwrap();
        assert_eq!(store.data().unwrap()["tags"], json!(["z", "y", "w", "x"]));

        store.remove_item("/tags", 1).unwrap();
        assert_eq!(store.data().unwrap()["tags"], json!(["z", "w", "x"]));

        store.insert_item("/tags", 99, json!("end")).unwrap();
        assert_eq!(store.data().unwrap()["tags"], json!(["z", "w", "x", "end"]));

        store.replace_item("/tags", 0, json!("first")).unwrap();
        assert_eq!(store.data().unwrap()["tags"][0], "first");

        store.clear_items("/tags").unwrap();
        assert_eq!(store.data().unwrap()["tags"], json!([]));
        assert_eq!(store.node("/tags").unwrap().children.len(), 0);
    }

    #[test]
    fn array_helpers_ignore_non_arrays() {
        let mut store = store();
        let before = store.model_rc();
        store.remove_item("/name", 0).unwrap();
        store.remove_item("/tags", 10).unwrap();
        store.clear_items("/missing").unwrap();
        assert!(Rc::ptr_eq(&before, &store.model_rc()));
    }

    #[test]
    fn append_creates_array() {
        let mut store = store();
        store.append_item("/extra", json!(1)).unwrap();
        assert_eq!(store.data().unwrap()["extra"], json!([1]));
    }

    #[test]
    fn form_state_tracks_dirtiness() {
        let mut store = store();
        assert!(!store.form_state().is_dirty);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = store.subscribe_form_state(move |state| sink.borrow_mut().push(state.is_dirty));

        store.set_data("/name", json!("changed")).unwrap();
        store.set_data("/name", json!("a")).unwrap();
        assert_eq!(*seen.borrow(), vec![true, false]);
    }

    #[test]
    fn uncached_store_builds_same_model() {
        let schema = json!({ "properties": { "n": { "type": "number", "default": 1 } } });
        let cached = FormStore::new(schema.clone(), None, PipelineConfig::default()).unwrap();
        let uncached =
            FormStore::new(schema, None, PipelineConfig::default().with_static_cache(false)).unwrap();
        assert_eq!(cached.model(), uncached.model());
        assert_eq!(cached.data(), Some(&json!({ "n": 1 })));
    }

    #[test]
    fn malformed_path_is_an_error() {
        let mut store = store();
        assert!(matches!(
            store.set_data("name", json!("x")),
            Err(PipelineError::Path(_))
        ));
    }
}
