//! Session parameter store with reset-then-set semantics.
//!
//! Applying a [`TaskResult`] first removes every path listed in
//! `reset_store_params`, then deep-merges `store_params`. A reset path
//! therefore replaces a whole subtree instead of merging into stale keys
//! left by an earlier run.

use serde_json::{Map, Value};

use super::TaskResult;

/// Accumulated output parameters of a workflow session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamStore {
    params: Map<String, Value>,
}

impl ParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a task's output: reset first, then merge.
    pub fn apply(&mut self, result: &TaskResult) {
        for path in &result.reset_store_params {
            self.reset(path);
        }
        if let Value::Object(source) = &result.store_params {
            merge(&mut self.params, source);
        }
    }

    /// Value at a nested path, if present.
    pub fn get(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        rest.iter()
            .try_fold(self.params.get(*first)?, |value, key| value.get(*key))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.params
    }

    fn reset(&mut self, path: &[String]) {
        let Some((last, parents)) = path.split_last() else {
            return;
        };
        let mut current = &mut self.params;
        for key in parents {
            match current.get_mut(key) {
                Some(Value::Object(next)) => current = next,
                _ => return,
            }
        }
        current.remove(last);
    }
}

fn merge(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        match value {
            Value::Object(incoming) if matches!(target.get(key), Some(Value::Object(_))) => {
                if let Some(Value::Object(existing)) = target.get_mut(key) {
                    merge(existing, incoming);
                }
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}
