//! # Connections
//!
//! A [`Connection`] is a memoized projection of an upstream [`Source`], either the
//! store itself or another connection. Subscribers are told about a new projected
//! value only when it differs from the last one they saw, and [`Connection::value`]
//! works with no subscribers at all.
//!
//! ## Equality
//!
//! The default equality is `PartialEq`. [`Connection::with_equality`] accepts any
//! `Fn(&T, &T) -> bool`, e.g. [`shallow_equal`] for JSON objects.
//!
//! ## Chaining
//!
//! `conn.conn(f)` roots a new connection at `conn`. The child only ever sees values
//! the parent let through, so suppression composes down the chain.
//!
//! ```rust
//! use reactorx_core::{Actor, ActorKind, Source, Store};
//! use serde_json::json;
//!
//! let set = Actor::of("app").named("set");
//! let store = Store::builder()
//!     .reducer(set.effect_on("user", |_, actor| Some(actor.arg().clone())))
//!     .build();
//!
//! let user = store.conn(|state| state.get("user").cloned());
//! let name = user.conn(|user| user.as_ref().map(|u| u["name"].clone()));
//!
//! set.with_arg(json!({ "name": "ada", "age": 36 })).invoke(&store).unwrap();
//! assert_eq!(name.value(), Some(json!("ada")));
//! ```

use crate::observable::{lock, Observable, Subscription};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Something with a current value and a stream of later values.
pub trait Source<T>: Send + Sync + 'static {
    fn value(&self) -> T;

    /// The stream of values; implementations emit the current value on subscribe.
    fn observe(&self) -> Observable<T>;
}

type EqualFn<T> = dyn Fn(&T, &T) -> bool + Send + Sync;

pub struct Connection<T> {
    inner: Arc<ConnectionInner<T>>,
}

struct ConnectionInner<T> {
    compute: Box<dyn Fn() -> T + Send + Sync>,
    stream: Observable<T>,
    equal: Arc<EqualFn<T>>,
    cached: Arc<Mutex<Option<T>>>,
}

impl<T> Clone for Connection<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Connection<T> {
    pub fn new<S, U, F>(upstream: S, projection: F) -> Self
    where
        T: PartialEq,
        S: Source<U>,
        U: Send + 'static,
        F: Fn(&U) -> T + Send + Sync + 'static,
    {
        Self::with_equality(upstream, projection, |a: &T, b: &T| a == b)
    }

    pub fn with_equality<S, U, F, E>(upstream: S, projection: F, equal: E) -> Self
    where
        S: Source<U>,
        U: Send + 'static,
        F: Fn(&U) -> T + Send + Sync + 'static,
        E: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        let upstream = Arc::new(upstream);
        let projection = Arc::new(projection);
        let equal: Arc<EqualFn<T>> = Arc::new(equal);
        let cached: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));

        let compute = {
            let upstream = Arc::clone(&upstream);
            let projection = Arc::clone(&projection);
            move || projection(&upstream.value())
        };

        let stream = {
            let equal = Arc::clone(&equal);
            let cached = Arc::clone(&cached);
            upstream
                .observe()
                .map(move |value| projection(&value))
                .distinct_until_changed_by(move |a, b| equal(a, b))
                .tap(move |value| *lock(&cached) = Some(value.clone()))
        };

        Self {
            inner: Arc::new(ConnectionInner {
                compute: Box::new(compute),
                stream,
                equal,
                cached,
            }),
        }
    }

    /// The current projected value. While it stays equal to the cached one, the
    /// cached instance is returned.
    pub fn value(&self) -> T {
        let fresh = (self.inner.compute)();
        let mut cached = lock(&self.inner.cached);
        match cached.as_ref() {
            Some(previous) if (self.inner.equal)(previous, &fresh) => previous.clone(),
            _ => {
                *cached = Some(fresh.clone());
                fresh
            }
        }
    }

    /// Projected values, starting with the current one, without consecutive repeats.
    pub fn observe(&self) -> Observable<T> {
        self.inner.stream.clone()
    }

    pub fn subscribe<F>(&self, on_value: F) -> Subscription
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.observe().subscribe(on_value)
    }

    pub fn conn<V, F>(&self, projection: F) -> Connection<V>
    where
        V: Clone + PartialEq + Send + Sync + 'static,
        F: Fn(&T) -> V + Send + Sync + 'static,
    {
        Connection::new(self.clone(), projection)
    }

    pub fn conn_with<V, F, E>(&self, projection: F, equal: E) -> Connection<V>
    where
        V: Clone + Send + Sync + 'static,
        F: Fn(&T) -> V + Send + Sync + 'static,
        E: Fn(&V, &V) -> bool + Send + Sync + 'static,
    {
        Connection::with_equality(self.clone(), projection, equal)
    }

    /// A `watch` channel seeded with [`value`](Self::value) that changes exactly when
    /// this connection emits.
    pub fn watch(&self) -> ConnectionWatch<T> {
        let (sender, receiver) = watch::channel(self.value());
        let equal = Arc::clone(&self.inner.equal);
        let subscription = self.observe().subscribe(move |value| {
            sender.send_if_modified(|current| {
                if equal(current, &value) {
                    false
                } else {
                    *current = value;
                    true
                }
            });
        });
        ConnectionWatch {
            receiver,
            _subscription: subscription,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Source<T> for Connection<T> {
    fn value(&self) -> T {
        Connection::value(self)
    }

    fn observe(&self) -> Observable<T> {
        Connection::observe(self)
    }
}

/// A live `watch` receiver bound to a connection. Dropping it detaches.
pub struct ConnectionWatch<T> {
    receiver: watch::Receiver<T>,
    _subscription: Subscription,
}

impl<T: Clone> ConnectionWatch<T> {
    pub fn get(&self) -> T {
        self.receiver.borrow().clone()
    }

    pub fn borrow(&self) -> watch::Ref<'_, T> {
        self.receiver.borrow()
    }

    pub async fn changed(&mut self) -> Result<T, watch::error::RecvError> {
        self.receiver.changed().await?;
        Ok(self.receiver.borrow_and_update().clone())
    }

    /// A detached receiver clone; it only sees updates while `self` is alive.
    pub fn receiver(&self) -> watch::Receiver<T> {
        self.receiver.clone()
    }
}

/// Equality that compares JSON objects one level deep and everything else by value.
pub fn shallow_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Object(left), Value::Object(right)) => {
            left.len() == right.len()
                && left
                    .iter()
                    .all(|(key, value)| right.get(key).is_some_and(|other| value == other))
        }
        _ => a == b,
    }
}
