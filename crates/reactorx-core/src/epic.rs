//! # Epics
//!
//! An epic is a stream transducer: it receives every actor the store broadcasts and
//! returns a stream of actors to dispatch back. Epics run via
//! [`Store::epic_on`](crate::Store::epic_on).
//!
//! Any `Fn(Observable<Actor>) -> Observable<Actor>` closure is an epic. Use
//! [`compose_epics`] to pipe one epic's output into another and [`combine_epics`] to
//! run several side by side.
//!
//! ```rust
//! use reactorx_core::{Actor, ActorKind, Observable, Store};
//! use serde_json::{json, Value};
//!
//! let ping = Actor::of("app").named("ping");
//! let pong = Actor::of("app").named("pong");
//!
//! let store = Store::builder()
//!     .reducer(pong.effect_on("pong", |n, _| Some(json!(n.and_then(Value::as_i64).unwrap_or(0) + 1))))
//!     .build();
//!
//! let (is_ping, pong_factory) = (ping.clone(), pong.clone());
//! let _epic = store.epic_on(move |actions: Observable<Actor>| {
//!     let is_ping = is_ping.clone();
//!     let pong_factory = pong_factory.clone();
//!     actions
//!         .filter(move |actor| is_ping.is(actor))
//!         .map(move |_| pong_factory.with_arg(json!(null)))
//! });
//!
//! ping.with_arg(json!(null)).invoke(&store).unwrap();
//! assert_eq!(store.get_state().get("pong"), Some(&json!(1)));
//! ```

use crate::actor::Actor;
use crate::observable::Observable;
use std::sync::Arc;

pub trait Epic: Send + Sync + 'static {
    fn run(&self, actions: Observable<Actor>) -> Observable<Actor>;
}

impl<F> Epic for F
where
    F: Fn(Observable<Actor>) -> Observable<Actor> + Send + Sync + 'static,
{
    fn run(&self, actions: Observable<Actor>) -> Observable<Actor> {
        self(actions)
    }
}

/// `second` sees only what `first` emits.
pub struct ComposedEpic<A, B> {
    first: A,
    second: B,
}

impl<A: Epic, B: Epic> Epic for ComposedEpic<A, B> {
    fn run(&self, actions: Observable<Actor>) -> Observable<Actor> {
        self.second.run(self.first.run(actions))
    }
}

pub fn compose_epics<A: Epic, B: Epic>(first: A, second: B) -> ComposedEpic<A, B> {
    ComposedEpic { first, second }
}

/// Every epic receives the full actor stream; outputs are merged.
#[derive(Clone, Default)]
pub struct CombinedEpics {
    epics: Vec<Arc<dyn Epic>>,
}

impl CombinedEpics {
    pub fn with<E: Epic>(mut self, epic: E) -> Self {
        self.epics.push(Arc::new(epic));
        self
    }

    pub fn len(&self) -> usize {
        self.epics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epics.is_empty()
    }
}

impl Epic for CombinedEpics {
    fn run(&self, actions: Observable<Actor>) -> Observable<Actor> {
        self.epics
            .iter()
            .map(|epic| epic.run(actions.clone()))
            .reduce(|merged, next| merged.merge(&next))
            .unwrap_or_else(Observable::empty)
    }
}

pub fn combine_epics(epics: impl IntoIterator<Item = Arc<dyn Epic>>) -> CombinedEpics {
    CombinedEpics {
        epics: epics.into_iter().collect(),
    }
}
