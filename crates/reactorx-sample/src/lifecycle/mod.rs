//! # Application Lifecycle
//!
//! Wiring a store into a working application: reducers, middleware, epics and the
//! persister are assembled in one place, [`AppSystem`], and torn down in one place,
//! [`AppSystem::shutdown`].
//!
//! ## Startup order
//!
//! 1. **Store** - built with every reducer (forms, persister registry, GitHub data)
//!    and [`LoggingMiddleware`](reactorx_core::LoggingMiddleware)
//! 2. **Hydration** - [`AppSystem::start`] loads unexpired persisted keys into the
//!    store before anything follows it, so a fresh snapshot does not overwrite the
//!    stored one
//! 3. **Epics** - duplicate-combining stage piped into the request epic
//! 4. **Persister** - connected last, writing through its own task
//!
//! ```rust,no_run
//! use reactorx_persister::MemoryStorage;
//! use reactorx_request::mock::MockTransport;
//! use reactorx_sample::lifecycle::{AppConfig, AppSystem};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let system = AppSystem::start(
//!         AppConfig::default(),
//!         Arc::new(MockTransport::new()),
//!         Arc::new(MemoryStorage::new()),
//!     )
//!     .await?;
//!
//!     // ... dispatch actors, use requesters and forms ...
//!
//!     system.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Shutdown
//!
//! Dropping the epic subscription cancels in-flight requests (each request task is
//! aborted with its subscription). The persister handle is then closed, which waits
//! for queued snapshots to reach storage.
//!
//! ## Configuration
//!
//! [`AppConfig`] aggregates the request and persister settings and deserializes
//! from JSON, with every field optional:
//!
//! ```json
//! {
//!   "request": { "base_url": "https://api.github.com", "dedup_window_ms": 100 },
//!   "persister": { "name": "app", "defaultExpiresInSecs": 86400 }
//! }
//! ```

pub mod app_system;
pub mod error;

pub use app_system::*;
pub use error::*;
