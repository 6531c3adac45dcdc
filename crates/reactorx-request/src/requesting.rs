//! In-flight request tracking.

use crate::utils::is_request_actor;
use reactorx_core::{Actor, AsyncStage, Observable, Store, Subscription};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;

/// Counts pending requests per request type from the store's actor broadcast.
///
/// `::STARTED` increments the count for its base type; `::DONE` and `::FAILED`
/// decrement it (`::CANCEL` is only a request, the `::FAILED` that follows settles
/// it). Both the counts and the overall "anything pending" flag are `watch`
/// channels.
pub struct RequestingTracker {
    counts: watch::Receiver<BTreeMap<String, usize>>,
    requesting: watch::Receiver<bool>,
    _subscription: Subscription,
}

impl RequestingTracker {
    pub fn attach(store: &Store) -> Self {
        let (counts_tx, counts) = watch::channel(BTreeMap::new());
        let (requesting_tx, requesting) = watch::channel(false);
        let counts_tx = Arc::new(counts_tx);
        let requesting_tx = Arc::new(requesting_tx);

        let subscription = store.epic_on(move |actions: Observable<Actor>| {
            let counts_tx = Arc::clone(&counts_tx);
            let requesting_tx = Arc::clone(&requesting_tx);
            actions
                .filter(is_request_actor)
                .tap(move |actor| {
                    counts_tx.send_modify(|counts| apply(counts, actor));
                    let pending = !counts_tx.borrow().is_empty();
                    requesting_tx.send_if_modified(|current| {
                        let changed = *current != pending;
                        *current = pending;
                        changed
                    });
                })
                .ignore_elements()
        });

        Self {
            counts,
            requesting,
            _subscription: subscription,
        }
    }

    pub fn requesting(&self) -> watch::Receiver<bool> {
        self.requesting.clone()
    }

    pub fn is_requesting(&self) -> bool {
        *self.requesting.borrow()
    }

    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.counts.borrow().clone()
    }

    pub fn count_of(&self, actor_type: &str) -> usize {
        self.counts.borrow().get(actor_type).copied().unwrap_or(0)
    }
}

fn apply(counts: &mut BTreeMap<String, usize>, actor: &Actor) {
    let base_type = actor.base_type();
    match actor.stage() {
        Some(AsyncStage::Started) => *counts.entry(base_type).or_insert(0) += 1,
        Some(AsyncStage::Done) | Some(AsyncStage::Failed) => {
            if let Some(count) = counts.get_mut(&base_type) {
                if *count > 1 {
                    *count -= 1;
                } else {
                    counts.remove(&base_type);
                }
            }
        }
        _ => {}
    }
}
