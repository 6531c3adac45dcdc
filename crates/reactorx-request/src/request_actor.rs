//! # Request Actors
//!
//! A [`RequestActor`] is an async actor family in the `request` group whose base
//! actor carries a fully resolved [`RequestConfig`] in its opts. The request epic
//! picks base actors up, performs the call and answers with
//! `::STARTED` and then `::DONE` or `::FAILED`.
//!
//! ```rust
//! use reactorx_request::{href, Method, RequestActor, RequestOpts};
//!
//! let get_user = RequestActor::<u32>::create("user.get", |id| {
//!     RequestOpts::new(Method::Get, format!("/users/{id}"))
//! });
//!
//! let actor = get_user.with(7);
//! assert_eq!(actor.actor_type(), "@@request/user.get");
//! assert_eq!(href(&actor, "https://api.example.com").unwrap(), "https://api.example.com/users/7?");
//! ```

use reactorx_core::{Actor, ActorKind, AsyncActor, AsyncNamedActor, StageActor};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

pub const REQUEST_GROUP: &str = "request";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Delete,
    Head,
    Post,
    Put,
    Patch,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let method = match self {
            Method::Get => "GET",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
        };
        f.write_str(method)
    }
}

/// What a request actor's builder produces from its arg.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOpts {
    pub method: Method,
    pub url: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub headers: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub query: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RequestOpts {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn data(mut self, data: impl Serialize) -> Self {
        self.data = serde_json::to_value(data).ok();
        self
    }
}

/// The resolved request a transport executes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestConfig {
    pub method: Method,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub headers: Map<String, Value>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl RequestConfig {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .and_then(|(_, value)| value.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }

    /// `base_url + url`, without the query string.
    pub fn full_url(&self) -> String {
        format!("{}{}", self.base_url.as_deref().unwrap_or(""), self.url)
    }
}

/// Merges builder output over extra config. Method, url, params and data come from
/// `opts`; headers from both, `opts` winning; null headers are dropped.
pub fn request_config_from_opts(opts: RequestOpts, extra: RequestConfig) -> RequestConfig {
    let mut headers = extra.headers;
    headers.extend(opts.headers);
    headers.retain(|_, value| !value.is_null());
    RequestConfig {
        method: opts.method,
        url: opts.url,
        params: opts.query,
        data: opts.data,
        headers,
        ..extra
    }
}

type BuildFn<Req> = dyn Fn(&Req) -> RequestOpts + Send + Sync;

pub struct RequestActor<Req = Value> {
    family: AsyncNamedActor<Req, RequestConfig>,
    build: Arc<BuildFn<Req>>,
}

impl<Req> Clone for RequestActor<Req> {
    fn clone(&self) -> Self {
        Self {
            family: self.family.clone(),
            build: Arc::clone(&self.build),
        }
    }
}

impl<Req> fmt::Debug for RequestActor<Req> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RequestActor")
            .field(&self.family.actor_type())
            .finish()
    }
}

impl<Req: Serialize> RequestActor<Req> {
    pub fn create<F>(name: impl Into<String>, build: F) -> Self
    where
        F: Fn(&Req) -> RequestOpts + Send + Sync + 'static,
    {
        Self {
            family: AsyncActor::of(REQUEST_GROUP).typed(name),
            build: Arc::new(build),
        }
    }

    pub fn with(&self, arg: Req) -> Actor {
        self.with_config(arg, RequestConfig::default())
    }

    /// Like [`with`](Self::with), layering the builder output over `extra`
    /// (base URL, headers, timeout).
    pub fn with_config(&self, arg: Req, extra: RequestConfig) -> Actor {
        let config = request_config_from_opts((self.build)(&arg), extra);
        self.family.with(arg, config)
    }

    pub fn name(&self) -> &str {
        self.family.base().name()
    }

    pub fn started(&self) -> StageActor {
        self.family.started()
    }

    pub fn done(&self) -> StageActor {
        self.family.done()
    }

    pub fn failed(&self) -> StageActor {
        self.family.failed()
    }

    pub fn cancel(&self) -> StageActor {
        self.family.cancel()
    }

    pub fn is_family(&self, actor: &Actor) -> bool {
        self.family.is_family(actor)
    }
}

impl<Req> ActorKind for RequestActor<Req> {
    fn actor_type(&self) -> &str {
        self.family.actor_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_headers_merge_and_drop_null() {
        let opts = RequestOpts::new(Method::Post, "/items")
            .header("X-Trace", Value::Null)
            .header("Accept", "text/plain");
        let extra = RequestConfig {
            base_url: Some("https://api.example.com".into()),
            headers: json!({ "Accept": "application/json", "X-Tenant": "a" })
                .as_object()
                .cloned()
                .unwrap(),
            ..RequestConfig::default()
        };

        let config = request_config_from_opts(opts, extra);

        assert_eq!(config.header("accept"), Some("text/plain"));
        assert_eq!(config.header("X-Tenant"), Some("a"));
        assert_eq!(config.header("X-Trace"), None);
        assert_eq!(config.full_url(), "https://api.example.com/items");
    }

    #[test]
    fn test_config_serializes_like_opts() {
        let get = RequestActor::<()>::create("github", |_| {
            RequestOpts::new(Method::Get, "/").header("Content-Type", "application/json")
        });

        let actor = get.with(());

        assert_eq!(
            actor.opts(),
            &json!({
                "method": "GET",
                "url": "/",
                "headers": { "Content-Type": "application/json" },
            })
        );
    }
}
