//! # Request Errors
//!
//! Two layers:
//! - [`TransportError`] is what a [`Transport`](crate::Transport) returns. The request
//!   epic never propagates it; it becomes the payload of a `::FAILED` actor.
//! - [`RequestError`] is returned to callers of [`Requester`](crate::Requester) and
//!   of the config helpers.

use crate::transport::HttpResponse;
use reactorx_core::StoreError;
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    /// The server answered with a non-success status.
    #[error("Request failed with status {}", .0.status)]
    Status(HttpResponse),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Request cancelled")]
    Cancelled,
}

impl TransportError {
    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            TransportError::Status(response) => Some(response),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransportError::Cancelled)
    }

    /// The `::FAILED` actor payload: the error response when there is one, otherwise
    /// `{ message, cancelled }`.
    pub fn to_payload(&self) -> Value {
        match self {
            TransportError::Status(response) => {
                serde_json::to_value(response).unwrap_or_else(|_| json!({ "status": response.status }))
            }
            TransportError::Network(message) => json!({ "message": message, "cancelled": false }),
            TransportError::Cancelled => json!({ "message": self.to_string(), "cancelled": true }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RequestError {
    #[error("Actor {0} is not a request actor")]
    NotRequestActor(String),
    #[error("Invalid request config: {0}")]
    InvalidConfig(String),
    #[error("Dispatch rejected: {0}")]
    Store(#[from] StoreError),
    #[error("Store dropped before {0} completed")]
    Abandoned(String),
}

impl From<serde_json::Error> for RequestError {
    fn from(error: serde_json::Error) -> Self {
        RequestError::InvalidConfig(error.to_string())
    }
}
