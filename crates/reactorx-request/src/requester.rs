//! # Requester
//!
//! Correlates a request with its outcome. A request is identified by its type and
//! its arg: [`Requester::request`] dispatches the base actor and resolves with the
//! first `::DONE` or `::FAILED` actor whose parent has the same type and an equal
//! arg. Identical requests that were combined upstream therefore all resolve from
//! the single call that was made.
//!
//! Callbacks registered on the builder fire for outcomes of the *latest* arg passed
//! to `request`, mirroring a UI component that only cares about its newest query.

use crate::error::RequestError;
use crate::request_actor::RequestActor;
use reactorx_core::{Actor, ActorKind, AsyncStage, Store, Subscription};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{oneshot, watch};
use tracing::{debug, instrument};

type Callback = Box<dyn Fn(&Actor, &Store) + Send + Sync>;
type FinishCallback = Box<dyn Fn(&Store) + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    Done(Actor),
    Failed(Actor),
}

impl RequestOutcome {
    pub fn actor(&self) -> &Actor {
        match self {
            RequestOutcome::Done(actor) | RequestOutcome::Failed(actor) => actor,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, RequestOutcome::Done(_))
    }

    /// The response payload (`HttpResponse` for done, the error payload for failed).
    pub fn payload(&self) -> &Value {
        self.actor().arg()
    }

    pub fn into_result(self) -> Result<Actor, Actor> {
        match self {
            RequestOutcome::Done(actor) => Ok(actor),
            RequestOutcome::Failed(actor) => Err(actor),
        }
    }
}

fn outcome_for(actor: &Actor, family_type: &str, arg: &Value) -> Option<RequestOutcome> {
    let parent = actor.parent()?;
    if parent.actor_type() != family_type || parent.arg() != arg {
        return None;
    }
    match actor.stage() {
        Some(AsyncStage::Done) => Some(RequestOutcome::Done(actor.clone())),
        Some(AsyncStage::Failed) => Some(RequestOutcome::Failed(actor.clone())),
        _ => None,
    }
}

#[derive(Default)]
struct Callbacks {
    on_success: Option<Callback>,
    on_fail: Option<Callback>,
    on_finish: Option<FinishCallback>,
}

pub struct RequesterBuilder<Req> {
    store: Store,
    actor: RequestActor<Req>,
    required: bool,
    callbacks: Callbacks,
}

impl<Req: Serialize> RequesterBuilder<Req> {
    /// Start in the `requesting` state, for views that issue their request at once.
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Actor, &Store) + Send + Sync + 'static,
    {
        self.callbacks.on_success = Some(Box::new(callback));
        self
    }

    pub fn on_fail<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Actor, &Store) + Send + Sync + 'static,
    {
        self.callbacks.on_fail = Some(Box::new(callback));
        self
    }

    pub fn on_finish<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Store) + Send + Sync + 'static,
    {
        self.callbacks.on_finish = Some(Box::new(callback));
        self
    }

    pub fn build(self) -> Requester<Req> {
        let (requesting_tx, requesting) = watch::channel(self.required);
        let requesting_tx = Arc::new(requesting_tx);
        let last_arg: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
        let callbacks = Arc::new(self.callbacks);

        let subscription = {
            let family_type = self.actor.actor_type().to_string();
            let last_arg = Arc::clone(&last_arg);
            let requesting_tx = Arc::clone(&requesting_tx);
            let store = self.store.clone();
            self.store.actions().subscribe(move |actor| {
                let current = last_arg
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                let Some(arg) = current else {
                    return;
                };
                let Some(outcome) = outcome_for(&actor, &family_type, &arg) else {
                    return;
                };
                match &outcome {
                    RequestOutcome::Done(actor) => {
                        if let Some(on_success) = &callbacks.on_success {
                            on_success(actor, &store);
                        }
                    }
                    RequestOutcome::Failed(actor) => {
                        if let Some(on_fail) = &callbacks.on_fail {
                            on_fail(actor, &store);
                        }
                    }
                }
                requesting_tx.send_replace(false);
                if let Some(on_finish) = &callbacks.on_finish {
                    on_finish(&store);
                }
            })
        };

        Requester {
            store: self.store,
            actor: self.actor,
            last_arg,
            requesting_tx,
            requesting,
            _subscription: subscription,
        }
    }
}

pub struct Requester<Req> {
    store: Store,
    actor: RequestActor<Req>,
    last_arg: Arc<Mutex<Option<Value>>>,
    requesting_tx: Arc<watch::Sender<bool>>,
    requesting: watch::Receiver<bool>,
    _subscription: Subscription,
}

impl<Req: Serialize> Requester<Req> {
    pub fn new(store: &Store, actor: RequestActor<Req>) -> Self {
        Self::builder(store, actor).build()
    }

    pub fn builder(store: &Store, actor: RequestActor<Req>) -> RequesterBuilder<Req> {
        RequesterBuilder {
            store: store.clone(),
            actor,
            required: false,
            callbacks: Callbacks::default(),
        }
    }

    /// Dispatches the request and waits for its outcome.
    ///
    /// Only returns an error when the store rejects the dispatch or is dropped
    /// before an outcome arrives; a failed call resolves to
    /// [`RequestOutcome::Failed`].
    #[instrument(skip_all, fields(actor_type = %self.actor.actor_type()))]
    pub async fn request(&self, arg: Req) -> Result<RequestOutcome, RequestError> {
        let actor = self.actor.with(arg);
        let arg = actor.arg().clone();
        *self.last_arg.lock().unwrap_or_else(PoisonError::into_inner) = Some(arg.clone());
        self.requesting_tx.send_replace(true);

        let (sender, receiver) = oneshot::channel();
        let sender = Mutex::new(Some(sender));
        let family_type = self.actor.actor_type().to_string();
        let waiter = self.store.actions().subscribe(move |candidate| {
            if let Some(outcome) = outcome_for(&candidate, &family_type, &arg) {
                let pending = sender.lock().unwrap_or_else(PoisonError::into_inner).take();
                if let Some(sender) = pending {
                    let _ = sender.send(outcome);
                }
            }
        });

        debug!("Dispatching request");
        self.store.dispatch(actor)?;

        let outcome = receiver
            .await
            .map_err(|_| RequestError::Abandoned(self.actor.actor_type().to_string()));
        drop(waiter);
        outcome
    }

    /// Dispatches `::CANCEL` for the latest request, if any.
    pub fn cancel(&self) -> Result<(), RequestError> {
        let last = self
            .last_arg
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(arg) = last {
            let base = Actor::new(crate::REQUEST_GROUP, self.actor.name()).with_payload(arg, Value::Null);
            self.store.dispatch(base.cancel())?;
        }
        Ok(())
    }

    pub fn requesting(&self) -> watch::Receiver<bool> {
        self.requesting.clone()
    }

    pub fn is_requesting(&self) -> bool {
        *self.requesting.borrow()
    }
}
