//! # Transport Seam
//!
//! The request epic is transport-agnostic: anything implementing [`Transport`] can
//! execute a [`RequestConfig`]. Implementations should watch the cancellation token
//! for long-running work; the epic also races the call against it, so a transport
//! that ignores the token is still abandoned on cancel.

use crate::error::TransportError;
use crate::request_actor::RequestConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: Map<String, Value>,
    pub data: Value,
    pub config: RequestConfig,
}

impl HttpResponse {
    pub fn new(status: u16, data: Value) -> Self {
        Self {
            status,
            status_text: status_text(status).to_string(),
            data,
            ..Self::default()
        }
    }

    pub fn ok(data: Value) -> Self {
        Self::new(200, data)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn with_config(mut self, config: RequestConfig) -> Self {
        self.config = config;
        self
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        409 => "Conflict",
        422 => "Unprocessable Entity",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "",
    }
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(
        &self,
        config: RequestConfig,
        cancel: CancellationToken,
    ) -> Result<HttpResponse, TransportError>;
}
