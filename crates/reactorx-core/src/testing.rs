//! # Test Helpers
//!
//! [`ActorRecorder`] captures every actor a store broadcasts, so tests can assert on
//! the exact sequence an epic produced.
//!
//! ```rust
//! use reactorx_core::testing::ActorRecorder;
//! use reactorx_core::{Actor, Store};
//!
//! let store = Store::new();
//! let recorder = ActorRecorder::attach(&store);
//!
//! store.dispatch(Actor::new("app", "hello")).unwrap();
//! assert_eq!(recorder.types(), vec!["@@app/hello"]);
//! ```

use crate::actor::{Actor, AsyncStage};
use crate::observable::{lock, Subscription};
use crate::store::Store;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct ActorRecorder {
    actors: Arc<Mutex<Vec<Actor>>>,
    _subscription: Subscription,
}

impl ActorRecorder {
    pub fn attach(store: &Store) -> Self {
        let actors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&actors);
        let subscription = store
            .actions()
            .subscribe(move |actor| lock(&sink).push(actor));
        Self {
            actors,
            _subscription: subscription,
        }
    }

    pub fn actors(&self) -> Vec<Actor> {
        lock(&self.actors).clone()
    }

    pub fn types(&self) -> Vec<String> {
        lock(&self.actors)
            .iter()
            .map(|actor| actor.actor_type().to_string())
            .collect()
    }

    /// Stages of every recorded actor in the family `@@{group}/{name}`, in order.
    /// The base actor shows up as `None`.
    pub fn stages_of(&self, group: &str, name: &str) -> Vec<Option<AsyncStage>> {
        lock(&self.actors)
            .iter()
            .filter(|actor| actor.group() == group && actor.name() == name)
            .map(Actor::stage)
            .collect()
    }

    pub fn count(&self) -> usize {
        lock(&self.actors).len()
    }

    pub fn clear(&self) {
        lock(&self.actors).clear();
    }

    /// Polls until an actor matching `predicate` has been recorded or `timeout`
    /// elapses.
    pub async fn wait_for<P>(&self, predicate: P, timeout: Duration) -> Option<Actor>
    where
        P: Fn(&Actor) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(actor) = lock(&self.actors).iter().find(|actor| predicate(actor)) {
                return Some(actor.clone());
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
