//! # Store Errors
//!
//! This module defines the error types shared by the store and the epic runtime.
//! Asynchronous failures (transport, storage) never appear here: they travel through
//! the actor stream as `::FAILED` lifecycle actors.

/// Errors returned synchronously by [`Store`](crate::Store) operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// A reducer (or something it called) dispatched while the store was folding.
    #[error("Reentrant dispatch of {0} while reducing")]
    ReentrantDispatch(String),
    /// Initial or replacement state was not a JSON object.
    #[error("State must be a JSON object, got {0}")]
    InvalidState(String),
}

/// Errors that terminate a single epic subscription.
///
/// An epic failing never affects sibling epics or the store; the store logs the
/// error and drops that epic's pipeline.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EpicError {
    #[error("Epic panicked: {0}")]
    Panicked(String),
    #[error("Custom error: {0}")]
    Custom(String),
}

impl From<String> for EpicError {
    fn from(message: String) -> Self {
        EpicError::Custom(message)
    }
}

impl From<&str> for EpicError {
    fn from(message: &str) -> Self {
        EpicError::Custom(message.to_string())
    }
}
