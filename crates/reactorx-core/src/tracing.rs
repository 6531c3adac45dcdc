//! # Observability
//!
//! The store logs through `tracing` with structured fields (`actor_type`, `key`,
//! `epic`). Nothing is printed until a subscriber is installed; binaries call
//! [`setup_tracing`] once at startup.
//!
//! ## Filtering
//!
//! Verbosity follows `RUST_LOG`:
//! - `RUST_LOG=info` shows epic lifecycle and application events
//! - `RUST_LOG=reactorx_core=debug` adds every dispatched actor and state change
//!   (with [`LoggingMiddleware`](crate::LoggingMiddleware) installed)

/// Installs a compact `fmt` subscriber filtered by `RUST_LOG`.
///
/// Calling it twice panics inside `tracing-subscriber`; use [`try_setup_tracing`]
/// from tests.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}

/// Like [`setup_tracing`], but returns `false` instead of panicking when a global
/// subscriber is already set.
pub fn try_setup_tracing() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init()
        .is_ok()
}
