//! # Reducers
//!
//! A [`ReducerBinding`] ties one actor type to one state key and a pure transition
//! function. The [`ReducerRegistry`] folds an actor through every binding for its
//! type, in registration order, to produce the next [`State`].

use crate::actor::Actor;
use crate::state::State;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// `(current sub-state, actor) -> next sub-state`. `None` removes the key.
pub type ReduceFn = dyn Fn(Option<&Value>, &Actor) -> Option<Value> + Send + Sync;

type KeyFn = dyn Fn(&Actor) -> String + Send + Sync;

/// Where a reducer writes.
#[derive(Clone)]
pub enum StateKey {
    Static(String),
    /// Computed from the dispatched actor, e.g. `form::{opts.form}`.
    Derived(Arc<KeyFn>),
}

impl StateKey {
    pub fn derived<F>(key_fn: F) -> Self
    where
        F: Fn(&Actor) -> String + Send + Sync + 'static,
    {
        StateKey::Derived(Arc::new(key_fn))
    }

    pub fn resolve(&self, actor: &Actor) -> String {
        match self {
            StateKey::Static(key) => key.clone(),
            StateKey::Derived(key_fn) => key_fn(actor),
        }
    }
}

impl fmt::Debug for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateKey::Static(key) => f.debug_tuple("Static").field(key).finish(),
            StateKey::Derived(_) => f.write_str("Derived(..)"),
        }
    }
}

impl From<&str> for StateKey {
    fn from(key: &str) -> Self {
        StateKey::Static(key.to_string())
    }
}

impl From<String> for StateKey {
    fn from(key: String) -> Self {
        StateKey::Static(key)
    }
}

#[derive(Clone)]
pub struct ReducerBinding {
    key: StateKey,
    actor_type: String,
    reduce: Arc<ReduceFn>,
}

impl ReducerBinding {
    pub fn new<F>(key: impl Into<StateKey>, actor_type: impl Into<String>, reduce: F) -> Self
    where
        F: Fn(Option<&Value>, &Actor) -> Option<Value> + Send + Sync + 'static,
    {
        Self {
            key: key.into(),
            actor_type: actor_type.into(),
            reduce: Arc::new(reduce),
        }
    }

    pub fn key(&self) -> &StateKey {
        &self.key
    }

    pub fn actor_type(&self) -> &str {
        &self.actor_type
    }
}

impl fmt::Debug for ReducerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReducerBinding")
            .field("key", &self.key)
            .field("actor_type", &self.actor_type)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReducerRegistry {
    bindings: Vec<ReducerBinding>,
    by_type: HashMap<String, Vec<usize>>,
}

impl ReducerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, binding: ReducerBinding) {
        let index = self.bindings.len();
        self.by_type
            .entry(binding.actor_type.clone())
            .or_default()
            .push(index);
        self.bindings.push(binding);
    }

    pub fn handles(&self, actor_type: &str) -> bool {
        self.by_type.contains_key(actor_type)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Folds `actor` through its bindings. Returns `None` when no binding matches,
    /// so callers can keep the current snapshot untouched.
    pub fn reduce(&self, state: &State, actor: &Actor) -> Option<State> {
        let indices = self.by_type.get(actor.actor_type())?;
        let mut next = state.clone();
        for &index in indices {
            let binding = &self.bindings[index];
            let key = binding.key.resolve(actor);
            let updated = (binding.reduce)(next.get(&key), actor);
            let entries = next.entries_mut();
            match updated {
                Some(value) => {
                    entries.insert(key, Arc::new(value));
                }
                None => {
                    entries.remove(&key);
                }
            }
        }
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn add(n: i64) -> impl Fn(Option<&Value>, &Actor) -> Option<Value> + Send + Sync {
        move |current, _| Some(json!(current.and_then(Value::as_i64).unwrap_or(0) + n))
    }

    #[test]
    fn test_fold_in_registration_order() {
        let mut registry = ReducerRegistry::new();
        registry.register(ReducerBinding::new("n", "@@t/x", add(1)));
        registry.register(ReducerBinding::new("n", "@@t/x", |current, _| {
            Some(json!(current.and_then(Value::as_i64).unwrap_or(0) * 10))
        }));

        let next = registry
            .reduce(&State::new(), &Actor::new("t", "x"))
            .unwrap();
        assert_eq!(next.get("n"), Some(&json!(10)));
    }

    #[test]
    fn test_unmatched_actor_returns_none() {
        let mut registry = ReducerRegistry::new();
        registry.register(ReducerBinding::new("n", "@@t/x", add(1)));
        assert!(registry.reduce(&State::new(), &Actor::new("t", "y")).is_none());
    }

    #[test]
    fn test_derived_key_and_removal() {
        let mut registry = ReducerRegistry::new();
        let key = StateKey::derived(|actor| format!("form::{}", actor.arg()["form"].as_str().unwrap_or("")));
        registry.register(ReducerBinding::new(key.clone(), "@@form/init", |_, _| Some(json!({}))));
        registry.register(ReducerBinding::new(key, "@@form/destroy", |_, _| None));

        let init = Actor::new("form", "init").with_payload(json!({ "form": "login" }), Value::Null);
        let state = registry.reduce(&State::new(), &init).unwrap();
        assert!(state.contains_key("form::login"));

        let destroy = Actor::new("form", "destroy").with_payload(json!({ "form": "login" }), Value::Null);
        let state = registry.reduce(&state, &destroy).unwrap();
        assert!(state.is_empty());
    }
}
