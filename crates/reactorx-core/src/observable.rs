//! # Observable Primitives
//!
//! A small push-based stream library: the store, connections and epics are all built
//! on it.
//!
//! ## Key Types
//!
//! - [`Observable`]: a cold, cloneable stream description. Nothing runs until
//!   [`Observable::subscribe`] is called; every subscription gets its own pipeline.
//! - [`Subscriber`]: the receiving end handed to a producer (`next`, `error`,
//!   `complete`). Once closed it ignores further signals.
//! - [`Subscription`]: the handle returned by `subscribe`. Dropping it unsubscribes,
//!   so hold on to it for as long as the stream should stay live.
//! - [`Subject`]: a hot multicast source. The store uses two of them, one for state
//!   and one for the actor broadcast.
//!
//! ## Delivery
//!
//! Emissions are synchronous: `Subject::next` calls every subscriber on the calling
//! thread before returning. Operators that need time (`buffer_time`, `from_future`)
//! spawn tokio tasks and emit from there, so they must run inside a tokio runtime.
//!
//! ```rust
//! use reactorx_core::observable::Subject;
//! use std::sync::{Arc, Mutex};
//!
//! let subject = Subject::<i32>::new();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//!
//! let sink = seen.clone();
//! let _subscription = subject
//!     .observe()
//!     .filter(|n| n % 2 == 0)
//!     .map(|n| n * 10)
//!     .subscribe(move |n| sink.lock().unwrap().push(n));
//!
//! for n in 1..=4 {
//!     subject.next(n);
//! }
//! assert_eq!(*seen.lock().unwrap(), vec![20, 40]);
//! ```

use crate::error::EpicError;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Locks a mutex, recovering the guard if a panicking holder poisoned it.
///
/// Every critical section in this crate leaves its data consistent before calling
/// user code, so a poisoned lock still guards valid data.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type NextFn<T> = Box<dyn Fn(T) + Send + Sync>;
type ErrorFn = Box<dyn Fn(EpicError) + Send + Sync>;
type CompleteFn = Box<dyn Fn() + Send + Sync>;
type SubscribeFn<T> = dyn Fn(Subscriber<T>) -> Subscription + Send + Sync;

// =============================================================================
// 1. SUBSCRIBER
// =============================================================================

/// The receiving side of a stream.
///
/// Cloning is cheap and all clones share the same closed flag: after `error` or
/// `complete` (or after the owning [`Subscription`] is dropped) every clone turns
/// into a no-op.
pub struct Subscriber<T> {
    inner: Arc<SubscriberInner<T>>,
}

struct SubscriberInner<T> {
    on_next: NextFn<T>,
    on_error: ErrorFn,
    on_complete: CompleteFn,
    closed: Arc<AtomicBool>,
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Subscriber<T> {
    /// A subscriber that only cares about values.
    pub fn new<N>(on_next: N) -> Self
    where
        N: Fn(T) + Send + Sync + 'static,
    {
        Self::with_handlers(on_next, |_| {}, || {})
    }

    pub fn with_handlers<N, E, C>(on_next: N, on_error: E, on_complete: C) -> Self
    where
        N: Fn(T) + Send + Sync + 'static,
        E: Fn(EpicError) + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(SubscriberInner {
                on_next: Box::new(on_next),
                on_error: Box::new(on_error),
                on_complete: Box::new(on_complete),
                closed: Arc::new(AtomicBool::new(false)),
            }),
        }
    }

    pub fn next(&self, value: T) {
        if !self.is_closed() {
            (self.inner.on_next)(value);
        }
    }

    /// Terminates the stream with an error. Only the first terminal signal is delivered.
    pub fn error(&self, error: EpicError) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            (self.inner.on_error)(error);
        }
    }

    /// Terminates the stream normally. Only the first terminal signal is delivered.
    pub fn complete(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            (self.inner.on_complete)();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.inner.closed)
    }
}

/// Builds an upstream subscriber that forwards terminal signals to `downstream`
/// and hands each value to `on_next`.
fn forward<T, U, N>(downstream: &Subscriber<U>, on_next: N) -> Subscriber<T>
where
    T: 'static,
    U: 'static,
    N: Fn(T, &Subscriber<U>) + Send + Sync + 'static,
{
    let next_out = downstream.clone();
    let error_out = downstream.clone();
    let complete_out = downstream.clone();
    Subscriber::with_handlers(
        move |value| on_next(value, &next_out),
        move |error| error_out.error(error),
        move || complete_out.complete(),
    )
}

// =============================================================================
// 2. SUBSCRIPTION
// =============================================================================

/// Handle to a live subscription. Dropping it (or calling [`unsubscribe`]) runs all
/// registered teardown logic exactly once.
///
/// [`unsubscribe`]: Subscription::unsubscribe
#[must_use = "dropping a Subscription unsubscribes it"]
pub struct Subscription {
    closed: Arc<AtomicBool>,
    teardown: Mutex<Vec<Teardown>>,
}

type Teardown = Box<dyn FnOnce() + Send>;

impl Subscription {
    pub fn new<F>(teardown: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let mut subscription = Self::empty();
        subscription.add(teardown);
        subscription
    }

    pub fn empty() -> Self {
        Self {
            closed: Arc::new(AtomicBool::new(false)),
            teardown: Mutex::new(Vec::new()),
        }
    }

    pub fn add<F>(&mut self, teardown: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.teardown
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(teardown));
    }

    /// Ties the lifetime of `other` to this subscription.
    pub fn add_subscription(&mut self, other: Subscription) {
        self.add(move || drop(other));
    }

    /// True once the stream terminated or the subscription was dropped.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        let teardown = std::mem::take(
            self.teardown
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for teardown in teardown {
            teardown();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .field("teardown", &lock(&self.teardown).len())
            .finish()
    }
}

// =============================================================================
// 3. OBSERVABLE
// =============================================================================

/// A cold stream of `T`.
pub struct Observable<T> {
    subscribe_fn: Arc<SubscribeFn<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            subscribe_fn: Arc::clone(&self.subscribe_fn),
        }
    }
}

impl<T: Send + 'static> Observable<T> {
    /// Creates an observable from a subscribe function. The function runs once per
    /// subscriber and returns the teardown for that subscriber.
    pub fn new<F>(subscribe_fn: F) -> Self
    where
        F: Fn(Subscriber<T>) -> Subscription + Send + Sync + 'static,
    {
        Self {
            subscribe_fn: Arc::new(subscribe_fn),
        }
    }

    /// Completes immediately without emitting.
    pub fn empty() -> Self {
        Self::new(|subscriber| {
            subscriber.complete();
            Subscription::empty()
        })
    }

    /// Emits each value synchronously, then completes.
    pub fn of(values: Vec<T>) -> Self
    where
        T: Clone + Sync,
    {
        Self::new(move |subscriber| {
            for value in values.iter().cloned() {
                if subscriber.is_closed() {
                    break;
                }
                subscriber.next(value);
            }
            subscriber.complete();
            Subscription::empty()
        })
    }

    /// Runs the future produced by `factory` on a tokio task, emits its output and
    /// completes. Unsubscribing aborts the task.
    pub fn from_future<F, Fut>(factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        Self::new(move |subscriber| {
            let future = factory();
            let handle = tokio::spawn(async move {
                let value = future.await;
                subscriber.next(value);
                subscriber.complete();
            });
            Subscription::new(move || handle.abort())
        })
    }

    pub fn subscribe<N>(&self, on_next: N) -> Subscription
    where
        N: Fn(T) + Send + Sync + 'static,
    {
        self.subscribe_with(Subscriber::new(on_next))
    }

    pub fn subscribe_with(&self, subscriber: Subscriber<T>) -> Subscription {
        let upstream = (self.subscribe_fn)(subscriber.clone());
        let mut subscription = Subscription {
            closed: subscriber.closed_flag(),
            teardown: Mutex::new(Vec::new()),
        };
        subscription.add(move || {
            subscriber.inner.closed.store(true, Ordering::SeqCst);
            drop(upstream);
        });
        subscription
    }

    // -------------------------------------------------------------------------
    // Operators
    // -------------------------------------------------------------------------

    pub fn map<U, F>(&self, project: F) -> Observable<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let source = self.clone();
        let project = Arc::new(project);
        Observable::new(move |downstream: Subscriber<U>| {
            let project = Arc::clone(&project);
            source.subscribe_with(forward(&downstream, move |value, out| {
                out.next(project(value))
            }))
        })
    }

    pub fn filter<P>(&self, predicate: P) -> Observable<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let source = self.clone();
        let predicate = Arc::new(predicate);
        Observable::new(move |downstream: Subscriber<T>| {
            let predicate = Arc::clone(&predicate);
            source.subscribe_with(forward(&downstream, move |value, out| {
                if predicate(&value) {
                    out.next(value);
                }
            }))
        })
    }

    pub fn filter_map<U, F>(&self, project: F) -> Observable<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Option<U> + Send + Sync + 'static,
    {
        let source = self.clone();
        let project = Arc::new(project);
        Observable::new(move |downstream: Subscriber<U>| {
            let project = Arc::clone(&project);
            source.subscribe_with(forward(&downstream, move |value, out| {
                if let Some(mapped) = project(value) {
                    out.next(mapped);
                }
            }))
        })
    }

    /// Like `map`, but an `Err` terminates the stream with that error.
    pub fn try_map<U, F>(&self, project: F) -> Observable<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Result<U, EpicError> + Send + Sync + 'static,
    {
        let source = self.clone();
        let project = Arc::new(project);
        Observable::new(move |downstream: Subscriber<U>| {
            let project = Arc::clone(&project);
            source.subscribe_with(forward(&downstream, move |value, out| {
                match project(value) {
                    Ok(mapped) => out.next(mapped),
                    Err(error) => out.error(error),
                }
            }))
        })
    }

    /// Runs a side effect for each value and passes it through unchanged.
    pub fn tap<F>(&self, effect: F) -> Observable<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let source = self.clone();
        let effect = Arc::new(effect);
        Observable::new(move |downstream: Subscriber<T>| {
            let effect = Arc::clone(&effect);
            source.subscribe_with(forward(&downstream, move |value, out| {
                effect(&value);
                out.next(value);
            }))
        })
    }

    /// Drops all values; only terminal signals pass.
    pub fn ignore_elements<U: Send + 'static>(&self) -> Observable<U> {
        let source = self.clone();
        Observable::new(move |downstream: Subscriber<U>| {
            source.subscribe_with(forward(&downstream, |_value: T, _out| {}))
        })
    }

    /// Emits only values that differ from the previously emitted one.
    pub fn distinct_until_changed_by<E>(&self, equal: E) -> Observable<T>
    where
        T: Clone,
        E: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        let source = self.clone();
        let equal = Arc::new(equal);
        Observable::new(move |downstream: Subscriber<T>| {
            let equal = Arc::clone(&equal);
            let last: Mutex<Option<T>> = Mutex::new(None);
            source.subscribe_with(forward(&downstream, move |value: T, out| {
                {
                    let mut last = lock(&last);
                    if let Some(previous) = last.as_ref() {
                        if equal(previous, &value) {
                            return;
                        }
                    }
                    *last = Some(value.clone());
                }
                out.next(value);
            }))
        })
    }

    /// Interleaves both streams. Completes once both sources completed.
    pub fn merge(&self, other: &Observable<T>) -> Observable<T> {
        let first = self.clone();
        let second = other.clone();
        Observable::new(move |downstream: Subscriber<T>| {
            let remaining = Arc::new(AtomicUsize::new(2));
            let mut subscription =
                first.subscribe_with(merged_subscriber(&downstream, &remaining));
            subscription.add_subscription(
                second.subscribe_with(merged_subscriber(&downstream, &remaining)),
            );
            subscription
        })
    }

    /// Maps every value to an inner observable and flattens all of them concurrently.
    ///
    /// Inner subscriptions live until they complete or the outer subscription is
    /// dropped. The result completes once the source and every inner stream completed.
    pub fn merge_map<U, F>(&self, project: F) -> Observable<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Observable<U> + Send + Sync + 'static,
    {
        let source = self.clone();
        let project = Arc::new(project);
        Observable::new(move |downstream: Subscriber<U>| {
            let project = Arc::clone(&project);
            let inners: Arc<Mutex<Vec<Subscription>>> = Arc::new(Mutex::new(Vec::new()));
            let active = Arc::new(AtomicUsize::new(1));

            let on_value = {
                let downstream = downstream.clone();
                let inners = Arc::clone(&inners);
                let active = Arc::clone(&active);
                move |value: T| {
                    active.fetch_add(1, Ordering::SeqCst);
                    let forward_next = downstream.clone();
                    let forward_error = downstream.clone();
                    let forward_complete = downstream.clone();
                    let active = Arc::clone(&active);
                    let inner = project(value).subscribe_with(Subscriber::with_handlers(
                        move |item| forward_next.next(item),
                        move |error| forward_error.error(error),
                        move || {
                            if active.fetch_sub(1, Ordering::SeqCst) == 1 {
                                forward_complete.complete();
                            }
                        },
                    ));
                    let finished = {
                        let mut slots = lock(&inners);
                        let (done, live): (Vec<_>, Vec<_>) =
                            slots.drain(..).partition(Subscription::is_closed);
                        *slots = live;
                        if !inner.is_closed() {
                            slots.push(inner);
                            done
                        } else {
                            let mut done = done;
                            done.push(inner);
                            done
                        }
                    };
                    drop(finished);
                }
            };
            let on_error = {
                let downstream = downstream.clone();
                move |error| downstream.error(error)
            };
            let on_complete = {
                let downstream = downstream.clone();
                let active = Arc::clone(&active);
                move || {
                    if active.fetch_sub(1, Ordering::SeqCst) == 1 {
                        downstream.complete();
                    }
                }
            };

            let mut subscription =
                source.subscribe_with(Subscriber::with_handlers(on_value, on_error, on_complete));
            subscription.add(move || {
                let live = std::mem::take(&mut *lock(&inners));
                drop(live);
            });
            subscription
        })
    }

    /// Collects values into batches. A window opens with the first value after an
    /// empty buffer and closes `window` later; empty batches are never emitted.
    /// Completion flushes the pending batch.
    pub fn buffer_time(&self, window: Duration) -> Observable<Vec<T>> {
        let source = self.clone();
        Observable::new(move |downstream: Subscriber<Vec<T>>| {
            let buffer: Arc<Mutex<Vec<T>>> = Arc::new(Mutex::new(Vec::new()));
            let timer: Arc<Mutex<Option<JoinHandle<()>>>> = Arc::new(Mutex::new(None));

            let on_value = {
                let buffer = Arc::clone(&buffer);
                let timer = Arc::clone(&timer);
                let downstream = downstream.clone();
                move |value: T| {
                    lock(&buffer).push(value);
                    let mut pending = lock(&timer);
                    if pending.is_none() {
                        let buffer = Arc::clone(&buffer);
                        let timer = Arc::clone(&timer);
                        let downstream = downstream.clone();
                        *pending = Some(tokio::spawn(async move {
                            tokio::time::sleep(window).await;
                            lock(&timer).take();
                            let batch = std::mem::take(&mut *lock(&buffer));
                            if !batch.is_empty() {
                                downstream.next(batch);
                            }
                        }));
                    }
                }
            };
            let on_error = {
                let downstream = downstream.clone();
                move |error| downstream.error(error)
            };
            let on_complete = {
                let buffer = Arc::clone(&buffer);
                let timer = Arc::clone(&timer);
                let downstream = downstream.clone();
                move || {
                    if let Some(handle) = lock(&timer).take() {
                        handle.abort();
                    }
                    let batch = std::mem::take(&mut *lock(&buffer));
                    if !batch.is_empty() {
                        downstream.next(batch);
                    }
                    downstream.complete();
                }
            };

            let mut subscription =
                source.subscribe_with(Subscriber::with_handlers(on_value, on_error, on_complete));
            subscription.add(move || {
                if let Some(handle) = lock(&timer).take() {
                    handle.abort();
                }
            });
            subscription
        })
    }
}

fn merged_subscriber<T: Send + 'static>(
    downstream: &Subscriber<T>,
    remaining: &Arc<AtomicUsize>,
) -> Subscriber<T> {
    let next_out = downstream.clone();
    let error_out = downstream.clone();
    let complete_out = downstream.clone();
    let remaining = Arc::clone(remaining);
    Subscriber::with_handlers(
        move |value| next_out.next(value),
        move |error| error_out.error(error),
        move || {
            if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                complete_out.complete();
            }
        },
    )
}

// =============================================================================
// 4. SUBJECT
// =============================================================================

/// A hot multicast source. Values pushed with [`Subject::next`] reach every current
/// subscriber synchronously, in subscription order. There is no replay.
pub struct Subject<T> {
    listeners: Arc<Mutex<Listeners<T>>>,
}

struct Listeners<T> {
    next_id: u64,
    entries: Vec<(u64, Subscriber<T>)>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            listeners: Arc::clone(&self.listeners),
        }
    }
}

impl<T: Clone + Send + 'static> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Subject<T> {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(Listeners {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Delivers `value` to a snapshot of the current subscribers. Subscribers added
    /// or removed during delivery take effect for the next value.
    pub fn next(&self, value: T) {
        let snapshot: Vec<Subscriber<T>> = lock(&self.listeners)
            .entries
            .iter()
            .map(|(_, subscriber)| subscriber.clone())
            .collect();
        for subscriber in snapshot {
            subscriber.next(value.clone());
        }
    }

    /// Completes every current subscriber and forgets them.
    pub fn complete(&self) {
        let drained = std::mem::take(&mut lock(&self.listeners).entries);
        for (_, subscriber) in drained {
            subscriber.complete();
        }
    }

    pub fn observe(&self) -> Observable<T> {
        let listeners = Arc::clone(&self.listeners);
        Observable::new(move |subscriber| {
            let id = {
                let mut listeners = lock(&listeners);
                let id = listeners.next_id;
                listeners.next_id += 1;
                listeners.entries.push((id, subscriber));
                id
            };
            let listeners = Arc::clone(&listeners);
            Subscription::new(move || {
                let removed = {
                    let mut listeners = lock(&listeners);
                    listeners
                        .entries
                        .iter()
                        .position(|(entry, _)| *entry == id)
                        .map(|index| listeners.entries.remove(index))
                };
                drop(removed);
            })
        })
    }

    pub fn observer_count(&self) -> usize {
        lock(&self.listeners)
            .entries
            .iter()
            .filter(|(_, subscriber)| !subscriber.is_closed())
            .count()
    }
}
