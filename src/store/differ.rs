use std::collections::BTreeSet;

use crate::error::PathError;
use crate::model::FieldNode;
use crate::path::{is_descendant, parent_path};
use crate::types::ConditionalDeps;

/// Paths invalidated by a change at `changed`: the path itself, every
/// ancestor up to the root, and every schema path whose conditional reads
/// `changed`.
///
/// # Errors
///
/// Returns `PathError::InvalidPointer` if `changed` is malformed.
pub fn compute_dirty_paths(changed: &str, deps: &ConditionalDeps) -> Result<BTreeSet<String>, PathError> {
    let mut dirty = BTreeSet::new();
    dirty.insert(changed.to_string());

    let mut current = changed.to_string();
    while !current.is_empty() {
        current = parent_path(&current)?;
        dirty.insert(current.clone());
    }

    if let Some(dependents) = deps.get(changed) {
        dirty.extend(dependents.iter().cloned());
    }
    Ok(dirty)
}

/// True when `path` is dirty or something beneath it is.
pub fn is_path_affected(path: &str, dirty: &BTreeSet<String>) -> bool {
    dirty.contains(path) || dirty.iter().any(|d| is_descendant(path, d))
}

/// Whether a subscriber at this path should hear about the new node.
pub(crate) fn node_changed(prev: Option<&FieldNode>, next: Option<&FieldNode>) -> bool {
    let (Some(a), Some(b)) = (prev, next) else {
        return true;
    };
    a.value != b.value
        || a.children.len() != b.children.len()
        || a.active != b.active
        || a.required != b.required
        || a.active_branch() != b.active_branch()
}
