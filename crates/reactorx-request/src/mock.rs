//! # Mock Transport
//!
//! [`MockTransport`] stands in for a real HTTP client in tests. Queue the responses
//! you expect, in order, then check that every expectation was consumed:
//!
//! ```rust
//! use reactorx_request::mock::MockTransport;
//! use reactorx_request::{HttpResponse, TransportError};
//! use serde_json::json;
//!
//! let mock = MockTransport::new();
//! mock.expect_request().return_ok(HttpResponse::ok(json!({ "id": 1 })));
//! mock.expect_request().return_err(TransportError::Network("connection reset".into()));
//!
//! // ... run the request epic with `mock.clone()` ...
//! # let _ = &mock;
//! ```
//!
//! ## When to use it
//!
//! | Need | Use |
//! |------|-----|
//! | Deterministic responses | `return_ok` / `return_err` |
//! | A call still pending when something else happens (cancel, dedup) | `.delay(..)` |
//! | How many calls actually went out | `call_count()` |
//! | What was sent | `requests()` |
//!
//! A call with no queued expectation fails with a `Network` error rather than
//! panicking inside a tokio task, so the failure shows up as a `::FAILED` actor.

use crate::error::TransportError;
use crate::request_actor::RequestConfig;
use crate::transport::{HttpResponse, Transport};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Expectation {
    delay: Option<Duration>,
    response: Result<HttpResponse, TransportError>,
}

#[derive(Clone, Default)]
pub struct MockTransport {
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
    requests: Arc<Mutex<Vec<RequestConfig>>>,
    calls: Arc<AtomicUsize>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect_request(&self) -> RequestExpectationBuilder {
        RequestExpectationBuilder {
            delay: None,
            expectations: self.expectations.clone(),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RequestConfig> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Panics if queued expectations were never consumed.
    pub fn verify(&self) {
        let remaining = self.expectations.lock().unwrap_or_else(|e| e.into_inner()).len();
        if remaining > 0 {
            panic!("Not all expectations were met. {} remaining", remaining);
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        config: RequestConfig,
        cancel: CancellationToken,
    ) -> Result<HttpResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(config.clone());

        let expectation = self
            .expectations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        let Some(expectation) = expectation else {
            return Err(TransportError::Network(format!(
                "unexpected request to {}",
                config.full_url()
            )));
        };

        if let Some(delay) = expectation.delay {
            tokio::select! {
                _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        expectation
            .response
            .map(|response| response.with_config(config))
    }
}

/// Builder for one queued response.
pub struct RequestExpectationBuilder {
    delay: Option<Duration>,
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
}

impl RequestExpectationBuilder {
    /// Holds the response back for `delay` (cancellable).
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn return_ok(self, response: HttpResponse) {
        self.push(Ok(response));
    }

    pub fn return_err(self, error: TransportError) {
        self.push(Err(error));
    }

    fn push(self, response: Result<HttpResponse, TransportError>) {
        self.expectations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Expectation {
                delay: self.delay,
                response,
            });
    }
}
