//! # Middleware
//!
//! Middleware wrap [`Store::dispatch`]. Each one receives the actor and a [`Next`]
//! handle; calling `next.run(actor)` hands the (possibly replaced) actor to the next
//! middleware, and finally to the reduce-and-broadcast core. Not calling it swallows
//! the actor.
//!
//! Middleware registered first is outermost.
//!
//! ```rust
//! use reactorx_core::{middleware, Actor, Store};
//!
//! let store = Store::builder()
//!     .middleware(middleware::from_fn(|actor, next| {
//!         if actor.name() == "blocked" {
//!             return Ok(());
//!         }
//!         next.run(actor)
//!     }))
//!     .build();
//!
//! store.dispatch(Actor::new("app", "blocked")).unwrap();
//! ```

use crate::actor::Actor;
use crate::error::StoreError;
use crate::store::Store;
use std::sync::Arc;
use tracing::debug;

pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, actor: Actor, next: Next<'_>) -> Result<(), StoreError>;
}

/// The remainder of the middleware chain.
pub struct Next<'a> {
    store: &'a Store,
    chain: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    pub(crate) fn new(store: &'a Store, chain: &'a [Arc<dyn Middleware>]) -> Self {
        Self { store, chain }
    }

    pub fn store(&self) -> &Store {
        self.store
    }

    pub fn run(self, actor: Actor) -> Result<(), StoreError> {
        match self.chain.split_first() {
            Some((head, rest)) => head.handle(actor, Next::new(self.store, rest)),
            None => self.store.dispatch_core(actor),
        }
    }
}

pub struct FnMiddleware<F>(F);

/// Builds a middleware from a closure.
pub fn from_fn<F>(f: F) -> FnMiddleware<F>
where
    F: for<'a> Fn(Actor, Next<'a>) -> Result<(), StoreError> + Send + Sync + 'static,
{
    FnMiddleware(f)
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(Actor, Next<'a>) -> Result<(), StoreError> + Send + Sync + 'static,
{
    fn handle(&self, actor: Actor, next: Next<'_>) -> Result<(), StoreError> {
        (self.0)(actor, next)
    }
}

/// Logs each dispatched actor and the top-level keys it changed.
#[derive(Debug, Clone, Default)]
pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn handle(&self, actor: Actor, next: Next<'_>) -> Result<(), StoreError> {
        let actor_type = actor.actor_type().to_string();
        let store = next.store().clone();
        let before = store.get_state();
        debug!(%actor_type, arg = %actor.arg(), "Dispatching");

        let result = next.run(actor);

        let after = store.get_state();
        if !before.ptr_eq(&after) {
            let changed: Vec<&str> = after
                .keys()
                .filter(|key| before.get(key) != after.get(key))
                .chain(before.keys().filter(|key| !after.contains_key(key)))
                .collect();
            debug!(%actor_type, ?changed, "State changed");
        }
        if let Err(error) = &result {
            debug!(%actor_type, %error, "Dispatch rejected");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorKind;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_chain_runs_outermost_first() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let (outer, inner) = (order.clone(), order.clone());

        let store = Store::builder()
            .middleware(from_fn(move |actor, next| {
                outer.lock().unwrap().push("outer");
                next.run(actor)
            }))
            .middleware(from_fn(move |actor, next| {
                inner.lock().unwrap().push("inner");
                next.run(actor)
            }))
            .build();

        store.dispatch(Actor::new("app", "tick")).unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["outer", "inner"]);
    }

    #[test]
    fn test_middleware_can_replace_actor() {
        let set = Actor::of("app").named("set");
        let store = Store::builder()
            .reducer(set.effect_on("value", |_, actor| Some(actor.arg().clone())))
            .middleware(from_fn(|actor, next| {
                let doubled = actor.arg().as_i64().unwrap_or(0) * 2;
                next.run(actor.with_payload(json!(doubled), json!(null)))
            }))
            .build();

        set.with_arg(json!(21)).invoke(&store).unwrap();
        assert_eq!(store.get_state().get("value"), Some(&json!(42)));
    }

    #[test]
    fn test_logging_middleware_passes_through() {
        let set = Actor::of("app").named("set");
        let store = Store::builder()
            .reducer(set.effect_on("value", |_, actor| Some(actor.arg().clone())))
            .middleware(LoggingMiddleware)
            .build();

        set.with_arg(json!("x")).invoke(&store).unwrap();
        assert_eq!(store.get_state().get("value"), Some(&json!("x")));
    }
}
