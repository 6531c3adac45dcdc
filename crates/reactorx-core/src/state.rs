//! # State Tree
//!
//! [`State`] is the immutable snapshot held by a [`Store`](crate::Store): a mapping from
//! top-level key to a JSON sub-state. Snapshots are shared behind an `Arc`, so cloning
//! is cheap and "did anything change" reduces to [`State::ptr_eq`].

use crate::error::StoreError;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct State(Arc<BTreeMap<String, Arc<Value>>>);

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).map(|value| value.as_ref())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when both handles point at the same snapshot.
    pub fn ptr_eq(&self, other: &State) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// True when `key` holds the same sub-state in both snapshots (shared or equal).
    /// A key absent from both counts as unchanged.
    pub fn same_entry(&self, other: &State, key: &str) -> bool {
        match (self.0.get(key), other.0.get(key)) {
            (Some(left), Some(right)) => Arc::ptr_eq(left, right) || left == right,
            (None, None) => true,
            _ => false,
        }
    }

    /// Returns a new snapshot with `key` set to `value`; `None` removes the key.
    /// Untouched sub-states are shared with `self`.
    pub fn with(&self, key: &str, value: Option<Value>) -> State {
        let mut entries = (*self.0).clone();
        match value {
            Some(value) => {
                entries.insert(key.to_string(), Arc::new(value));
            }
            None => {
                entries.remove(key);
            }
        }
        State(Arc::new(entries))
    }

    pub fn to_value(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(key, value)| (key.clone(), (**value).clone()))
                .collect(),
        )
    }

    pub(crate) fn entries_mut(&mut self) -> &mut BTreeMap<String, Arc<Value>> {
        Arc::make_mut(&mut self.0)
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.0 == other.0
    }
}

impl From<Map<String, Value>> for State {
    fn from(map: Map<String, Value>) -> Self {
        State(Arc::new(
            map.into_iter()
                .map(|(key, value)| (key, Arc::new(value)))
                .collect(),
        ))
    }
}

impl TryFrom<Value> for State {
    type Error = StoreError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(State::from(map)),
            other => Err(StoreError::InvalidState(kind_of(&other).to_string())),
        }
    }
}

impl Serialize for State {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_with_shares_untouched_entries() {
        let state = State::try_from(json!({ "a": 1, "b": { "deep": true } })).unwrap();
        let next = state.with("a", Some(json!(2)));

        assert_eq!(next.get("a"), Some(&json!(2)));
        assert!(Arc::ptr_eq(&state.0["b"], &next.0["b"]));
        assert!(!state.ptr_eq(&next));
    }

    #[test]
    fn test_same_entry() {
        let state = State::try_from(json!({ "a": 1, "b": 2 })).unwrap();
        let next = state.with("a", Some(json!(1))).with("b", Some(json!(3)));

        assert!(state.same_entry(&next, "a"));
        assert!(!state.same_entry(&next, "b"));
        assert!(state.same_entry(&next, "missing"));
        assert!(!state.same_entry(&next.with("a", None), "a"));
    }

    #[test]
    fn test_with_none_removes_key() {
        let state = State::try_from(json!({ "a": 1 })).unwrap();
        assert!(state.with("a", None).is_empty());
    }

    #[test]
    fn test_rejects_non_object() {
        let err = State::try_from(json!([1, 2])).unwrap_err();
        assert_eq!(err, StoreError::InvalidState("array".to_string()));
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let state = State::try_from(json!({ "ping": 3 })).unwrap();
        assert_eq!(serde_json::to_value(&state).unwrap(), json!({ "ping": 3 }));
        assert_eq!(state.to_value(), json!({ "ping": 3 }));
    }
}
