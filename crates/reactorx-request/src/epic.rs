//! # Request Epics
//!
//! [`create_request_epic`] turns base request actors into transport calls:
//!
//! ```text
//! @@request/x            (dispatched by the caller)
//! @@request/x::STARTED   (synchronously, arg = resolved RequestConfig)
//! @@request/x::DONE      (arg = HttpResponse)
//! @@request/x::FAILED    (arg = error response, or { message, cancelled })
//! ```
//!
//! Each call gets its own `CancellationToken`. Dispatching `actor.cancel()` (same
//! request type, equal arg) while the call is pending cancels it and produces a
//! `::FAILED` actor with `cancelled: true`; `::DONE` is never emitted for it.
//!
//! [`combine_duplicated_request_epic`] collapses identical pending requests that
//! arrive within one window. It is a pipeline stage for [`compose_epics`]:
//!
//! ```rust,ignore
//! store.epic_on(compose_epics(
//!     combine_duplicated_request_epic(Duration::from_millis(100)),
//!     create_request_epic(transport, config),
//! ));
//! ```
//!
//! [`compose_epics`]: reactorx_core::compose_epics

use crate::error::TransportError;
use crate::request_actor::RequestConfig;
use crate::transport::Transport;
use crate::utils::{is_pre_request_actor, request_config};
use reactorx_core::{Actor, AsyncStage, Epic, Observable, Subject, Subscriber, Subscription};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestEpicConfig {
    /// Used when a request actor carries no base URL of its own.
    pub base_url: Option<String>,
    /// Applied beneath each request's own headers.
    pub default_headers: BTreeMap<String, String>,
    pub dedup_window_ms: u64,
    /// Upper bound for a single call; `None` waits for the transport.
    pub timeout_ms: Option<u64>,
}

impl Default for RequestEpicConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            default_headers: BTreeMap::new(),
            dedup_window_ms: 100,
            timeout_ms: None,
        }
    }
}

impl RequestEpicConfig {
    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }

    /// Fills in base URL, default headers, timeout and the default content type.
    pub fn resolve(&self, mut config: RequestConfig) -> RequestConfig {
        if config.base_url.is_none() {
            config.base_url = self.base_url.clone();
        }
        if config.timeout_ms.is_none() {
            config.timeout_ms = self.timeout_ms;
        }
        for (name, value) in &self.default_headers {
            if config.header(name).is_none() {
                config.headers.insert(name.clone(), Value::String(value.clone()));
            }
        }
        if config.content_type().is_none() {
            config.headers.insert(
                "Content-Type".to_string(),
                Value::String(DEFAULT_CONTENT_TYPE.to_string()),
            );
        }
        config
    }
}

pub struct RequestEpic<T> {
    transport: Arc<T>,
    config: Arc<RequestEpicConfig>,
}

pub fn create_request_epic<T: Transport>(transport: Arc<T>, config: RequestEpicConfig) -> RequestEpic<T> {
    RequestEpic {
        transport,
        config: Arc::new(config),
    }
}

fn is_request_cancel(actor: &Actor) -> bool {
    actor.group() == crate::REQUEST_GROUP && actor.stage() == Some(AsyncStage::Cancel)
}

impl<T: Transport> Epic for RequestEpic<T> {
    /// The input is subscribed once and fanned out through a local subject, so
    /// per-request cancel listeners never re-run upstream stages.
    fn run(&self, actions: Observable<Actor>) -> Observable<Actor> {
        let transport = Arc::clone(&self.transport);
        let config = Arc::clone(&self.config);

        Observable::new(move |downstream: Subscriber<Actor>| {
            let hub = Subject::<Actor>::new();
            let cancels = hub.observe().filter(is_request_cancel);
            let transport = Arc::clone(&transport);
            let config = Arc::clone(&config);

            let mut subscription = hub
                .observe()
                .filter(is_pre_request_actor)
                .merge_map(move |actor| {
                    request_operation(
                        actor,
                        Arc::clone(&transport),
                        Arc::clone(&config),
                        cancels.clone(),
                    )
                })
                .subscribe_with(downstream.clone());

            let feed = hub.clone();
            subscription.add_subscription(actions.subscribe_with(Subscriber::with_handlers(
                move |actor| feed.next(actor),
                move |error| downstream.error(error),
                move || hub.complete(),
            )));
            subscription
        })
    }
}

fn request_operation<T: Transport>(
    actor: Actor,
    transport: Arc<T>,
    config: Arc<RequestEpicConfig>,
    cancels: Observable<Actor>,
) -> Observable<Actor> {
    Observable::new(move |subscriber: Subscriber<Actor>| {
        let request = match request_config(&actor) {
            Ok(request) => config.resolve(request),
            Err(error) => {
                warn!(actor_type = actor.actor_type(), %error, "Invalid request actor");
                subscriber.next(actor.failed(json!({ "message": error.to_string(), "cancelled": false })));
                subscriber.complete();
                return Subscription::empty();
            }
        };

        debug!(actor_type = actor.actor_type(), method = %request.method, url = %request.full_url(), "Request started");
        subscriber.next(actor.started(&request));

        let token = CancellationToken::new();
        let mut subscription = {
            let token = token.clone();
            let target = actor.clone();
            cancels.subscribe(move |cancel| {
                if cancel.base_type() == target.actor_type() && cancel.arg() == target.arg() {
                    info!(actor_type = target.actor_type(), "Request cancelled");
                    token.cancel();
                }
            })
        };

        let handle = {
            let token = token.clone();
            let transport = Arc::clone(&transport);
            let actor = actor.clone();
            let subscriber = subscriber.clone();
            tokio::spawn(async move {
                let timeout = request.timeout_ms.map(Duration::from_millis);
                let url = request.full_url();
                let call = transport.send(request, token.clone());
                let result = tokio::select! {
                    _ = token.cancelled() => Err(TransportError::Cancelled),
                    result = with_timeout(call, timeout) => result,
                };
                let outcome = match result {
                    Ok(response) => {
                        debug!(actor_type = actor.actor_type(), %url, status = response.status, "Request done");
                        actor.done(&response)
                    }
                    Err(error) => {
                        debug!(actor_type = actor.actor_type(), %url, %error, "Request failed");
                        actor.failed(error.to_payload())
                    }
                };
                subscriber.next(outcome);
                subscriber.complete();
            })
        };

        subscription.add(move || {
            token.cancel();
            handle.abort();
        });
        subscription
    })
}

async fn with_timeout<F>(call: F, timeout: Option<Duration>) -> Result<crate::HttpResponse, TransportError>
where
    F: std::future::Future<Output = Result<crate::HttpResponse, TransportError>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .unwrap_or_else(|_| Err(TransportError::Network(format!("timed out after {limit:?}")))),
        None => call.await,
    }
}

// =============================================================================
// Duplicate combining
// =============================================================================

/// Buffers pending request actors for `window` and forwards one actor per distinct
/// `(type, arg)`, in order of first appearance. Cancel actors pass straight through
/// so a downstream request epic can still see them.
pub fn combine_duplicated_request_epic(window: Duration) -> impl Epic {
    move |actions: Observable<Actor>| {
        let cancels = actions.filter(|actor| {
            actor.group() == crate::REQUEST_GROUP && actor.stage() == Some(AsyncStage::Cancel)
        });
        actions
            .filter(is_pre_request_actor)
            .buffer_time(window)
            .merge_map(|batch| Observable::of(dedupe(batch)))
            .merge(&cancels)
    }
}

fn dedupe(batch: Vec<Actor>) -> Vec<Actor> {
    let total = batch.len();
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<Actor> = Vec::new();
    for actor in batch {
        let key = format!("{}{}", actor.actor_type(), actor.arg());
        match slots.get(&key) {
            Some(&index) => unique[index] = actor,
            None => {
                slots.insert(key, unique.len());
                unique.push(actor);
            }
        }
    }
    if unique.len() < total {
        debug!(received = total, forwarded = unique.len(), "Combined duplicate requests");
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use crate::request_actor::{Method, RequestActor, RequestOpts};
    use crate::transport::HttpResponse;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn test_resolve_defaults() {
        let config = RequestEpicConfig {
            base_url: Some("https://api.example.com".into()),
            default_headers: BTreeMap::from([("Accept".to_string(), "application/json".to_string())]),
            ..RequestEpicConfig::default()
        };

        let resolved = config.resolve(RequestConfig::default());

        assert_eq!(resolved.base_url.as_deref(), Some("https://api.example.com"));
        assert_eq!(resolved.content_type(), Some(DEFAULT_CONTENT_TYPE));
        assert_eq!(resolved.header("accept"), Some("application/json"));
    }

    #[test]
    fn test_resolve_keeps_explicit_content_type() {
        let mut request = RequestConfig::default();
        request
            .headers
            .insert("content-type".into(), json!("application/x-www-form-urlencoded"));

        let resolved = RequestEpicConfig::default().resolve(request);

        assert_eq!(resolved.content_type(), Some("application/x-www-form-urlencoded"));
        assert_eq!(resolved.headers.len(), 1);
    }

    #[test]
    fn test_dedupe_by_type_and_arg() {
        let get = RequestActor::<u32>::create("item", |id| RequestOpts::new(Method::Get, format!("/items/{id}")));
        let batch = vec![get.with(1), get.with(2), get.with(1), get.with(1)];

        let unique = dedupe(batch);

        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].arg(), &json!(1));
        assert_eq!(unique[1].arg(), &json!(2));
    }

    #[tokio::test]
    async fn test_in_flight_requests_share_one_input_subscription() {
        // 1. Setup
        let transport = Arc::new(MockTransport::new());
        for _ in 0..3 {
            transport
                .expect_request()
                .delay(Duration::from_millis(50))
                .return_ok(HttpResponse::ok(json!(null)));
        }
        let input = Subject::<Actor>::new();
        let subscriptions = Arc::new(AtomicUsize::new(0));
        let counted = {
            let source = input.observe();
            let subscriptions = subscriptions.clone();
            Observable::new(move |subscriber: Subscriber<Actor>| {
                subscriptions.fetch_add(1, Ordering::SeqCst);
                source.subscribe_with(subscriber)
            })
        };
        let stages = Arc::new(Mutex::new(Vec::new()));
        let sink = stages.clone();
        let epic = create_request_epic(transport.clone(), RequestEpicConfig::default());
        let _subscription = epic
            .run(counted)
            .subscribe(move |actor: Actor| sink.lock().unwrap().push(actor.stage()));

        // 2. Three requests in flight, one of them cancelled
        let get = RequestActor::<u32>::create("item", |id| RequestOpts::new(Method::Get, format!("/items/{id}")));
        for id in 1..=3 {
            input.next(get.with(id));
        }
        input.next(get.with(2).cancel());
        tokio::time::sleep(Duration::from_millis(200)).await;

        // 3. Verify
        assert_eq!(subscriptions.load(Ordering::SeqCst), 1);
        let stages = stages.lock().unwrap().clone();
        let count = |stage: AsyncStage| stages.iter().filter(|s| **s == Some(stage)).count();
        assert_eq!(count(AsyncStage::Started), 3);
        assert_eq!(count(AsyncStage::Done), 2);
        assert_eq!(count(AsyncStage::Failed), 1);
        transport.verify();
    }
}
