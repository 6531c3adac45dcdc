//! # reactorx core
//!
//! A single reactive store: dispatched *actors* are reduced into an immutable state
//! tree, and consumers read that tree through memoized, equality-checked
//! *connections*. Side effects live in *epics*, stream transducers that watch the
//! actor broadcast and dispatch new actors.
//!
//! ## Architecture Overview
//!
//! 1. **Actors** ([`Actor`], [`NamedActor`], [`AsyncNamedActor`]) - namespaced
//!    messages with JSON payloads and an async lifecycle naming scheme
//!    (`@@group/name::STARTED`, `::DONE`, `::FAILED`, `::CANCEL`)
//! 2. **Reducers** ([`ReducerBinding`], [`ReducerRegistry`]) - pure per-key state
//!    transitions, folded in registration order
//! 3. **Store** ([`Store`]) - state, dispatch pipeline, middleware, actor broadcast
//! 4. **Connections** ([`Connection`]) - derived values that only notify on change
//! 5. **Epics** ([`Epic`]) - `Observable<Actor> -> Observable<Actor>` side-effect
//!    pipelines, isolated from each other
//!
//! All of it sits on the push-based stream primitives in [`observable`].
//!
//! ## Quick Start
//!
//! ```rust
//! use reactorx_core::{Actor, ActorKind, Observable, Store};
//! use serde_json::{json, Value};
//!
//! fn bump(count: Option<&Value>) -> Option<Value> {
//!     Some(json!(count.and_then(Value::as_i64).unwrap_or(0) + 1))
//! }
//!
//! let ping = Actor::of("demo").named("ping");
//! let pong = Actor::of("demo").named("pong");
//!
//! let store = Store::builder()
//!     .reducer(ping.effect_on("ping", |count, _| bump(count)))
//!     .reducer(pong.effect_on("pong", |count, _| bump(count)))
//!     .build();
//!
//! // ping -> pong
//! let (is_ping, make_pong) = (ping.clone(), pong.clone());
//! let _epic = store.epic_on(move |actions: Observable<Actor>| {
//!     let (is_ping, make_pong) = (is_ping.clone(), make_pong.clone());
//!     actions
//!         .filter(move |actor| is_ping.is(actor))
//!         .map(move |_| make_pong.with_arg(Value::Null))
//! });
//!
//! let pongs = store.conn(|state| state.get("pong").and_then(Value::as_i64));
//!
//! for _ in 0..3 {
//!     ping.with_arg(Value::Null).invoke(&store).unwrap();
//! }
//! assert_eq!(pongs.value(), Some(3));
//! ```
//!
//! ## Concurrency Model
//!
//! - Reduction and notification run synchronously on the dispatching thread
//! - The state lock is held only while folding reducers
//! - Async work (timers, transports, storage) runs on tokio tasks and re-enters
//!   [`Store::dispatch`] when it finishes
//! - Dispatching from inside a reducer returns [`StoreError::ReentrantDispatch`]
//!
//! ## Testing
//!
//! [`testing::ActorRecorder`] records the broadcast so tests can assert on the exact
//! actor sequence an epic produced.

pub mod actor;
pub mod connection;
pub mod epic;
pub mod error;
pub mod middleware;
pub mod observable;
pub mod reducer;
pub mod state;
pub mod store;
pub mod testing;
pub mod tracing;

pub use actor::{
    Actor, ActorGroup, ActorKind, AsyncActor, AsyncActorGroup, AsyncNamedActor, AsyncStage,
    NamedActor, StageActor,
};
pub use connection::{shallow_equal, Connection, ConnectionWatch, Source};
pub use epic::{combine_epics, compose_epics, CombinedEpics, ComposedEpic, Epic};
pub use error::{EpicError, StoreError};
pub use middleware::{LoggingMiddleware, Middleware, Next};
pub use observable::{Observable, Subject, Subscriber, Subscription};
pub use reducer::{ReducerBinding, ReducerRegistry, StateKey};
pub use state::State;
pub use store::{Store, StoreBuilder};
