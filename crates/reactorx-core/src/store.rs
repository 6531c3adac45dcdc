//! # Store
//!
//! The [`Store`] owns the current [`State`], the reducer registry and the middleware
//! chain, and multicasts two streams: state snapshots and dispatched actors.
//!
//! ## Dispatch Pipeline
//!
//! 1. **Middleware** run outermost first and may replace or drop the actor.
//! 2. **Reduce**: every binding for the actor type is folded over the current state
//!    under the state lock. No binding means no new snapshot.
//! 3. **Notify**: state subscribers receive the latest snapshot (only if it changed).
//! 4. **Broadcast**: the actor goes out on [`Store::actions`], so epics only ever see
//!    an actor after its reducer effects are visible through [`Store::get_state`].
//!
//! Steps 3 and 4 run without any lock held, so subscribers and epics may dispatch.
//! Dispatching from inside a reducer is rejected with
//! [`StoreError::ReentrantDispatch`].
//!
//! Every commit bumps a version number. Each state subscriber receives snapshots in
//! version order, so with dispatches racing on several threads it may skip a
//! snapshot but never sees an older one after a newer one.
//!
//! ## Handles
//!
//! `Store` is a cheap `Clone` handle; every clone talks to the same state. There is no
//! global store, so independent stores can live side by side.

use crate::actor::Actor;
use crate::connection::{Connection, Source};
use crate::epic::Epic;
use crate::error::{EpicError, StoreError};
use crate::middleware::{Middleware, Next};
use crate::observable::{lock, Observable, Subject, Subscriber, Subscription};
use crate::reducer::{ReducerBinding, ReducerRegistry};
use crate::state::State;
use serde_json::Value;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::thread::{self, ThreadId};
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    state: Mutex<Committed>,
    reducers: RwLock<Arc<ReducerRegistry>>,
    middleware: RwLock<Arc<Vec<Arc<dyn Middleware>>>>,
    reducing: Mutex<Option<ThreadId>>,
    states: Subject<(u64, State)>,
    actors: Subject<Actor>,
}

struct Committed {
    version: u64,
    state: State,
}

impl StoreInner {
    fn snapshot(&self) -> (u64, State) {
        let committed = lock(&self.state);
        (committed.version, committed.state.clone())
    }

    fn publish(&self) {
        self.states.next(self.snapshot());
    }
}

/// Hands snapshots to one state subscriber, oldest version first.
///
/// A snapshot not newer than the last one accepted is dropped. Snapshots that arrive
/// while a delivery is running, from another thread or from the subscriber itself,
/// queue up and go out after it.
struct OrderedDelivery {
    subscriber: Subscriber<State>,
    queue: Mutex<DeliveryQueue>,
}

#[derive(Default)]
struct DeliveryQueue {
    last: Option<u64>,
    pending: VecDeque<State>,
    delivering: bool,
}

/// Releases the delivery slot if the subscriber panics mid-delivery.
struct Draining<'a> {
    queue: &'a Mutex<DeliveryQueue>,
}

impl Drop for Draining<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            let mut queue = lock(self.queue);
            queue.delivering = false;
            queue.pending.clear();
        }
    }
}

impl OrderedDelivery {
    fn new(subscriber: Subscriber<State>) -> Self {
        Self {
            subscriber,
            queue: Mutex::new(DeliveryQueue::default()),
        }
    }

    fn deliver(&self, version: u64, state: State) {
        {
            let mut queue = lock(&self.queue);
            if queue.last.is_some_and(|last| version <= last) {
                return;
            }
            queue.last = Some(version);
            queue.pending.push_back(state);
            if queue.delivering {
                return;
            }
            queue.delivering = true;
        }

        let _draining = Draining { queue: &self.queue };
        loop {
            let next = {
                let mut queue = lock(&self.queue);
                match queue.pending.pop_front() {
                    Some(state) => state,
                    None => {
                        queue.delivering = false;
                        return;
                    }
                }
            };
            self.subscriber.next(next);
        }
    }
}

/// Marks the current thread as folding; cleared on drop, including during unwinding.
struct ReduceGuard<'a> {
    slot: &'a Mutex<Option<ThreadId>>,
}

impl<'a> ReduceGuard<'a> {
    fn enter(slot: &'a Mutex<Option<ThreadId>>) -> Self {
        *lock(slot) = Some(thread::current().id());
        Self { slot }
    }
}

impl Drop for ReduceGuard<'_> {
    fn drop(&mut self) {
        *lock(self.slot) = None;
    }
}

fn read<T: Clone>(lock: &RwLock<T>) -> T {
    match lock.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

fn write<T>(lock: &RwLock<T>, update: impl FnOnce(&mut T)) {
    match lock.write() {
        Ok(mut guard) => update(&mut guard),
        Err(poisoned) => update(&mut poisoned.into_inner()),
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::with_state(State::new())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("state", &self.get_state())
            .field("reducers", &read(&self.inner.reducers).len())
            .finish_non_exhaustive()
    }
}

impl Store {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store seeded from a JSON object.
    pub fn create(initial: Value) -> Result<Self, StoreError> {
        Ok(Self::with_state(State::try_from(initial)?))
    }

    pub fn with_state(initial: State) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                state: Mutex::new(Committed { version: 0, state: initial }),
                reducers: RwLock::new(Arc::new(ReducerRegistry::new())),
                middleware: RwLock::new(Arc::new(Vec::new())),
                reducing: Mutex::new(None),
                states: Subject::new(),
                actors: Subject::new(),
            }),
        }
    }

    pub fn builder() -> StoreBuilder {
        StoreBuilder::default()
    }

    fn from_inner(inner: Arc<StoreInner>) -> Self {
        Self { inner }
    }

    fn downgrade(&self) -> Weak<StoreInner> {
        Arc::downgrade(&self.inner)
    }

    // =========================================================================
    // State
    // =========================================================================

    pub fn get_state(&self) -> State {
        lock(&self.inner.state).state.clone()
    }

    /// Replaces the whole state and notifies state subscribers. No actor is broadcast.
    pub fn replace_state(&self, state: State) {
        {
            let mut committed = lock(&self.inner.state);
            committed.state = state;
            committed.version += 1;
        }
        self.inner.publish();
    }

    /// State snapshots, starting with the current one.
    ///
    /// The current snapshot is read after the listener is registered. If a newer
    /// snapshot reaches the subscriber first, the current one is dropped.
    pub fn observe(&self) -> Observable<State> {
        let store = self.downgrade();
        let states = self.inner.states.observe();
        Observable::new(move |subscriber: Subscriber<State>| {
            let delivery = Arc::new(OrderedDelivery::new(subscriber));
            let subscription = {
                let delivery = Arc::clone(&delivery);
                states.subscribe(move |(version, state)| delivery.deliver(version, state))
            };
            if let Some(inner) = store.upgrade() {
                let (version, state) = inner.snapshot();
                delivery.deliver(version, state);
            }
            subscription
        })
    }

    pub fn subscribe<F>(&self, on_state: F) -> Subscription
    where
        F: Fn(State) + Send + Sync + 'static,
    {
        self.observe().subscribe(on_state)
    }

    /// Every dispatched actor, after its reducers ran. No replay.
    pub fn actions(&self) -> Observable<Actor> {
        self.inner.actors.observe()
    }

    pub fn conn<T, F>(&self, projection: F) -> Connection<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        F: Fn(&State) -> T + Send + Sync + 'static,
    {
        Connection::new(self.clone(), projection)
    }

    pub fn conn_with<T, F, E>(&self, projection: F, equal: E) -> Connection<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(&State) -> T + Send + Sync + 'static,
        E: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        Connection::with_equality(self.clone(), projection, equal)
    }

    // =========================================================================
    // Registration
    // =========================================================================

    pub fn register(&self, binding: ReducerBinding) {
        debug!(actor_type = binding.actor_type(), key = ?binding.key(), "Registering reducer");
        write(&self.inner.reducers, |reducers| {
            Arc::make_mut(reducers).register(binding)
        });
    }

    pub fn apply_middleware<M: Middleware>(&self, middleware: M) {
        write(&self.inner.middleware, |chain| {
            Arc::make_mut(chain).push(Arc::new(middleware))
        });
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    pub fn dispatch(&self, actor: Actor) -> Result<(), StoreError> {
        if self.is_reducing_here() {
            return Err(StoreError::ReentrantDispatch(actor.actor_type().to_string()));
        }
        let chain = read(&self.inner.middleware);
        Next::new(self, &chain).run(actor)
    }

    /// Reduce, notify, broadcast. The end of every middleware chain.
    pub(crate) fn dispatch_core(&self, actor: Actor) -> Result<(), StoreError> {
        if self.is_reducing_here() {
            return Err(StoreError::ReentrantDispatch(actor.actor_type().to_string()));
        }

        let reducers = read(&self.inner.reducers);
        let changed = {
            let mut committed = lock(&self.inner.state);
            let _guard = ReduceGuard::enter(&self.inner.reducing);
            match reducers.reduce(&committed.state, &actor) {
                Some(next) => {
                    committed.state = next;
                    committed.version += 1;
                    true
                }
                None => false,
            }
        };

        if changed {
            self.inner.publish();
        }
        self.inner.actors.next(actor);
        Ok(())
    }

    fn is_reducing_here(&self) -> bool {
        *lock(&self.inner.reducing) == Some(thread::current().id())
    }

    // =========================================================================
    // Epics
    // =========================================================================

    /// Runs `epic` against the actor broadcast and dispatches everything it emits.
    ///
    /// The epic stays active until the returned subscription is dropped, it
    /// completes, or it fails. An error or panic inside the epic ends that epic only.
    pub fn epic_on<E: Epic>(&self, epic: E) -> Subscription {
        let name = std::any::type_name::<E>();
        let input = guarded_actions(self.inner.actors.observe());

        let output = match catch_unwind(AssertUnwindSafe(|| epic.run(input))) {
            Ok(output) => output,
            Err(payload) => {
                error!(epic = name, panic = %panic_message(payload), "Epic panicked during setup");
                return Subscription::empty();
            }
        };

        let store = self.downgrade();
        let subscription = output.subscribe_with(Subscriber::with_handlers(
            move |actor: Actor| {
                let Some(inner) = store.upgrade() else {
                    return;
                };
                if let Err(err) = Store::from_inner(inner).dispatch(actor) {
                    warn!(epic = name, error = %err, "Epic output rejected");
                }
            },
            move |err: EpicError| warn!(epic = name, error = %err, "Epic terminated"),
            move || debug!(epic = name, "Epic completed"),
        ));
        info!(epic = name, "Epic started");
        subscription
    }
}

/// The actor stream handed to an epic. A panic while the epic processes an actor is
/// turned into an `EpicError` on that epic's stream.
fn guarded_actions(actions: Observable<Actor>) -> Observable<Actor> {
    Observable::new(move |subscriber: Subscriber<Actor>| {
        let guard = subscriber.clone();
        actions.subscribe(move |actor| {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| guard.next(actor))) {
                guard.error(EpicError::Panicked(panic_message(payload)));
            }
        })
    })
}

impl Source<State> for Store {
    fn value(&self) -> State {
        self.get_state()
    }

    fn observe(&self) -> Observable<State> {
        Store::observe(self)
    }
}

// =============================================================================
// BUILDER
// =============================================================================

#[derive(Default)]
pub struct StoreBuilder {
    state: State,
    reducers: Vec<ReducerBinding>,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl StoreBuilder {
    pub fn state(mut self, state: State) -> Self {
        self.state = state;
        self
    }

    pub fn reducer(mut self, binding: ReducerBinding) -> Self {
        self.reducers.push(binding);
        self
    }

    pub fn reducers(mut self, bindings: impl IntoIterator<Item = ReducerBinding>) -> Self {
        self.reducers.extend(bindings);
        self
    }

    pub fn middleware<M: Middleware>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn build(self) -> Store {
        let store = Store::with_state(self.state);
        let mut registry = ReducerRegistry::new();
        for binding in self.reducers {
            registry.register(binding);
        }
        write(&store.inner.reducers, |reducers| *reducers = Arc::new(registry));
        write(&store.inner.middleware, |chain| *chain = Arc::new(self.middleware));
        store
    }
}
