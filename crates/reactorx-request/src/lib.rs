//! # reactorx request
//!
//! HTTP requests as actors. A request is dispatched as a base actor in the `request`
//! group; the request epic performs it through a [`Transport`] and answers with
//! lifecycle actors that reducers and other epics can react to.
//!
//! ## Pieces
//!
//! - [`RequestActor`] - typed request families (`RequestActor::<Req>::create`)
//! - [`create_request_epic`] - runs requests, with per-call cancellation
//! - [`combine_duplicated_request_epic`] - collapses identical requests in a window
//! - [`Requester`] - dispatch a request and await its outcome
//! - [`RequestingTracker`] - "is anything loading" as a `watch` channel
//! - [`ReqwestTransport`] - the HTTP transport
//! - [`mock::MockTransport`] - queued responses for tests
//!
//! ## Wiring
//!
//! ```rust
//! use reactorx_core::{compose_epics, Store};
//! use reactorx_request::mock::MockTransport;
//! use reactorx_request::{
//!     combine_duplicated_request_epic, create_request_epic, HttpResponse, Method,
//!     RequestActor, RequestEpicConfig, RequestOpts, Requester,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let transport = Arc::new(MockTransport::new());
//!     transport.expect_request().return_ok(HttpResponse::ok(json!({ "100": "💯" })));
//!
//!     let config = RequestEpicConfig::default();
//!     let store = Store::new();
//!     let _epic = store.epic_on(compose_epics(
//!         combine_duplicated_request_epic(config.dedup_window()),
//!         create_request_epic(transport.clone(), config),
//!     ));
//!
//!     let emojis = RequestActor::<()>::create("github.emojis", |_| RequestOpts::new(Method::Get, "/emojis"));
//!     let outcome = Requester::new(&store, emojis).request(()).await.unwrap();
//!
//!     assert!(outcome.is_done());
//!     assert_eq!(outcome.payload()["data"]["100"], json!("💯"));
//! }
//! ```

pub mod epic;
pub mod error;
pub mod http;
pub mod mock;
pub mod request_actor;
pub mod requester;
pub mod requesting;
pub mod transport;
pub mod utils;

pub use epic::{
    combine_duplicated_request_epic, create_request_epic, RequestEpic, RequestEpicConfig,
    DEFAULT_CONTENT_TYPE,
};
pub use error::{RequestError, TransportError};
pub use http::{request_url, ReqwestTransport};
pub use request_actor::{
    request_config_from_opts, Method, RequestActor, RequestConfig, RequestOpts, REQUEST_GROUP,
};
pub use requester::{RequestOutcome, Requester, RequesterBuilder};
pub use requesting::RequestingTracker;
pub use transport::{HttpResponse, Transport};
pub use utils::{
    error_response_status_equal, href, is_cancelled, is_failed_request_actor,
    is_pre_request_actor, is_request_actor, params_serializer, request_config,
    transform_request, RequestBody,
};
