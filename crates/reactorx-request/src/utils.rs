//! Helpers for reading request actors and encoding request parts.

use crate::error::RequestError;
use crate::request_actor::{RequestConfig, REQUEST_GROUP};
use reactorx_core::{Actor, AsyncStage};
use serde_json::{Map, Value};

/// The resolved config carried in a request actor's opts. Works for the base actor
/// and for its lifecycle variants.
pub fn request_config(actor: &Actor) -> Result<RequestConfig, RequestError> {
    let operation = actor.operation();
    if operation.group() != REQUEST_GROUP {
        return Err(RequestError::NotRequestActor(actor.actor_type().to_string()));
    }
    Ok(operation.opts_as()?)
}

/// `{base}{url}?{query}`. A non-empty `base_url` argument wins over the configured one.
pub fn href(actor: &Actor, base_url: &str) -> Result<String, RequestError> {
    let config = request_config(actor)?;
    let base = if base_url.is_empty() {
        config.base_url.as_deref().unwrap_or("")
    } else {
        base_url
    };
    Ok(format!("{base}{}?{}", config.url, params_serializer(&config.params)))
}

/// A base request actor waiting to be sent.
pub fn is_pre_request_actor(actor: &Actor) -> bool {
    actor.group() == REQUEST_GROUP && actor.stage().is_none()
}

/// Any lifecycle variant of a request actor.
pub fn is_request_actor(actor: &Actor) -> bool {
    actor.group() == REQUEST_GROUP && actor.stage().is_some()
}

pub fn is_failed_request_actor(actor: &Actor) -> bool {
    actor.group() == REQUEST_GROUP && actor.stage() == Some(AsyncStage::Failed)
}

pub fn is_cancelled(actor: &Actor) -> bool {
    is_failed_request_actor(actor) && actor.arg()["cancelled"] == Value::Bool(true)
}

/// Matches failed request actors whose error response has `status`.
pub fn error_response_status_equal(status: u16) -> impl Fn(&Actor) -> bool + Send + Sync + Clone {
    move |actor| {
        is_failed_request_actor(actor) && actor.arg()["status"].as_u64() == Some(u64::from(status))
    }
}

// =============================================================================
// Encoding
// =============================================================================

pub fn is_multipart_form_data(content_type: &str) -> bool {
    content_type.contains("multipart/form-data")
}

pub fn is_form_url_encoded(content_type: &str) -> bool {
    content_type.contains("application/x-www-form-urlencoded")
}

/// Encodes query params. Arrays repeat the key, objects are JSON-encoded, and
/// `null` or empty values are skipped.
pub fn params_serializer(params: &Map<String, Value>) -> String {
    let mut pairs = Vec::new();
    for (key, value) in params {
        append_pair(&mut pairs, key, value);
    }
    pairs
        .iter()
        .map(|(key, value)| format!("{}={}", encode_component(key), encode_component(value)))
        .collect::<Vec<_>>()
        .join("&")
}

fn append_pair(pairs: &mut Vec<(String, String)>, key: &str, value: &Value) {
    let text = match value {
        Value::Null => return,
        Value::Array(items) => {
            for item in items {
                append_pair(pairs, key, item);
            }
            return;
        }
        Value::String(text) => text.clone(),
        Value::Object(_) => value.to_string(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
    };
    if !text.is_empty() {
        pairs.push((key.to_string(), text));
    }
}

/// Percent-encodes everything except `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
pub fn encode_component(input: &str) -> String {
    let mut encoded = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'\''
            | b'('
            | b')' => encoded.push(byte as char),
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

/// A request body ready for the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(String),
    FormUrlEncoded(String),
    /// Multipart fields; objects are JSON-encoded, arrays repeat the field.
    Multipart(Vec<(String, String)>),
}

/// Encodes `data` according to the `Content-Type` header (JSON by default).
pub fn transform_request(data: &Value, config: &RequestConfig) -> RequestBody {
    let content_type = config.content_type().unwrap_or("");
    let empty = Map::new();
    let fields = data.as_object().unwrap_or(&empty);

    if is_multipart_form_data(content_type) {
        let mut parts = Vec::new();
        for (key, value) in fields {
            append_part(&mut parts, key, value);
        }
        return RequestBody::Multipart(parts);
    }
    if is_form_url_encoded(content_type) {
        return RequestBody::FormUrlEncoded(params_serializer(fields));
    }
    RequestBody::Json(data.to_string())
}

fn append_part(parts: &mut Vec<(String, String)>, key: &str, value: &Value) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| append_part(parts, key, item)),
        Value::String(text) => parts.push((key.to_string(), text.clone())),
        other => parts.push((key.to_string(), other.to_string())),
    }
}
