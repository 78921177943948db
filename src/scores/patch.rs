//! Structural patches over JSON rows
//!
//! An enhancer's effect on a row is recorded as the diff between its input
//! and its output. Patches only touch the paths the enhancer changed, so
//! diffs from independent chains compose without erasing each other.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One structural change, addressed by object-key path from the row root.
///
/// Arrays are treated as leaf values and replaced whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Patch {
    Add { path: Vec<String>, value: Value },
    Replace { path: Vec<String>, value: Value },
    Remove { path: Vec<String> },
}

impl Patch {
    pub fn path(&self) -> &[String] {
        match self {
            Self::Add { path, .. } | Self::Replace { path, .. } | Self::Remove { path } => path,
        }
    }
}

/// Patches that turn `before` into `after`.
pub fn diff(before: &Value, after: &Value) -> Vec<Patch> {
    let mut patches = Vec::new();
    diff_at(&mut Vec::new(), before, after, &mut patches);
    patches
}

fn diff_at(path: &mut Vec<String>, before: &Value, after: &Value, out: &mut Vec<Patch>) {
    match (before, after) {
        (Value::Object(old), Value::Object(new)) => {
            for (key, old_value) in old {
                path.push(key.clone());
                match new.get(key) {
                    Some(new_value) => diff_at(path, old_value, new_value, out),
                    None => out.push(Patch::Remove { path: path.clone() }),
                }
                path.pop();
            }
            for (key, new_value) in new {
                if !old.contains_key(key) {
                    let mut added = path.clone();
                    added.push(key.clone());
                    out.push(Patch::Add {
                        path: added,
                        value: new_value.clone(),
                    });
                }
            }
        }
        _ if before == after => {}
        _ => out.push(Patch::Replace {
            path: path.clone(),
            value: after.clone(),
        }),
    }
}

/// Apply patches in order.
///
/// Missing intermediate objects are created; removing a missing path is a
/// no-op.
pub fn apply_patches(target: &mut Value, patches: &[Patch]) {
    for patch in patches {
        apply_patch(target, patch);
    }
}

fn apply_patch(target: &mut Value, patch: &Patch) {
    let path = patch.path();
    let Some((last, parents)) = path.split_last() else {
        match patch {
            Patch::Add { value, .. } | Patch::Replace { value, .. } => *target = value.clone(),
            Patch::Remove { .. } => *target = Value::Null,
        }
        return;
    };

    if let Patch::Remove { .. } = patch {
        if let Some(Value::Object(fields)) = lookup_mut(target, parents) {
            fields.remove(last);
        }
        return;
    }

    let parent = object_at(target, parents);
    if let Patch::Add { value, .. } | Patch::Replace { value, .. } = patch {
        parent.insert(last.clone(), value.clone());
    }
}

fn lookup_mut<'a>(target: &'a mut Value, path: &[String]) -> Option<&'a mut Value> {
    path.iter()
        .try_fold(target, |current, key| current.get_mut(key.as_str()))
}

/// Walk `path`, turning anything that is not an object into one.
fn object_at<'a>(target: &'a mut Value, path: &[String]) -> &'a mut Map<String, Value> {
    let mut current = target;
    for key in path {
        let fields = ensure_object(current);
        current = fields.entry(key.clone()).or_insert(Value::Null);
    }
    ensure_object(current)
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(fields) => fields,
        _ => unreachable!("value was just made an object"),
    }
}
