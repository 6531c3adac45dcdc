//! [`Transport`] over a `reqwest` client.

use crate::error::TransportError;
use crate::request_actor::{Method, RequestConfig};
use crate::transport::{HttpResponse, Transport};
use crate::utils::{params_serializer, transform_request, RequestBody};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn method_of(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
    }
}

/// Full URL including the serialized query string.
pub fn request_url(config: &RequestConfig) -> String {
    let query = params_serializer(&config.params);
    if query.is_empty() {
        config.full_url()
    } else {
        format!("{}?{query}", config.full_url())
    }
}

fn build(client: &reqwest::Client, config: &RequestConfig) -> reqwest::RequestBuilder {
    let mut request = client.request(method_of(config.method), request_url(config));

    for (name, value) in &config.headers {
        let value = match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        // reqwest sets its own boundary for multipart bodies
        if name.eq_ignore_ascii_case("content-type")
            && crate::utils::is_multipart_form_data(&value)
        {
            continue;
        }
        request = request.header(name.as_str(), value);
    }
    if let Some(timeout_ms) = config.timeout_ms {
        request = request.timeout(Duration::from_millis(timeout_ms));
    }

    match config.data.as_ref().map(|data| transform_request(data, config)) {
        Some(RequestBody::Json(body)) | Some(RequestBody::FormUrlEncoded(body)) => {
            request.body(body)
        }
        Some(RequestBody::Multipart(parts)) => {
            let form = parts
                .into_iter()
                .fold(reqwest::multipart::Form::new(), |form, (name, value)| {
                    form.text(name, value)
                });
            request.multipart(form)
        }
        None => request,
    }
}

async fn read_response(
    response: reqwest::Response,
    config: RequestConfig,
) -> Result<HttpResponse, TransportError> {
    let status = response.status().as_u16();
    let headers: Map<String, Value> = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            let value = value.to_str().ok()?;
            Some((name.as_str().to_string(), Value::String(value.to_string())))
        })
        .collect();
    let text = response
        .text()
        .await
        .map_err(|e| TransportError::Network(e.to_string()))?;
    let data = if text.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    };

    let mut response = HttpResponse::new(status, data).with_config(config);
    response.headers = headers;
    Ok(response)
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[instrument(skip_all, fields(method = %config.method, url = %config.full_url()))]
    async fn send(
        &self,
        config: RequestConfig,
        cancel: CancellationToken,
    ) -> Result<HttpResponse, TransportError> {
        let request = build(&self.client, &config);

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            response = request.send() => response.map_err(|e| TransportError::Network(e.to_string()))?,
        };
        let response = read_response(response, config).await?;
        debug!(status = response.status, "Response received");

        if response.is_success() {
            Ok(response)
        } else {
            Err(TransportError::Status(response))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_url() {
        let mut config = RequestConfig {
            url: "/search".into(),
            base_url: Some("https://api.github.com".into()),
            ..RequestConfig::default()
        };
        assert_eq!(request_url(&config), "https://api.github.com/search");

        config.params = json!({ "q": "rust lang", "page": 2 })
            .as_object()
            .cloned()
            .unwrap();
        assert_eq!(
            request_url(&config),
            "https://api.github.com/search?page=2&q=rust%20lang"
        );
    }
}
