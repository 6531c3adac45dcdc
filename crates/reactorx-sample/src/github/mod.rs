//! # GitHub Requests
//!
//! Request actors for a couple of GitHub endpoints, and reducers that keep their
//! responses in the store.
//!
//! - `emojis` holds the `/emojis` map once fetched.
//! - `users::{login}` holds each fetched user profile.

use reactorx_core::{ActorKind, ReducerBinding, StateKey};
use reactorx_request::{Method, RequestActor, RequestOpts};
use serde_json::Value;

pub const GITHUB_API: &str = "https://api.github.com";

pub const EMOJIS_KEY: &str = "emojis";

pub fn user_key(login: &str) -> String {
    format!("users::{login}")
}

pub fn fetch_emojis() -> RequestActor<()> {
    RequestActor::create("github.emojis", |_| RequestOpts::new(Method::Get, "/emojis"))
}

pub fn fetch_user() -> RequestActor<String> {
    RequestActor::create("github.user", |login: &String| {
        RequestOpts::new(Method::Get, format!("/users/{login}"))
            .header("Accept", "application/vnd.github+json")
    })
}

fn response_data(actor: &reactorx_core::Actor) -> Option<Value> {
    actor.arg().get("data").cloned()
}

pub fn github_reducers() -> Vec<ReducerBinding> {
    vec![
        fetch_emojis()
            .done()
            .effect_on(EMOJIS_KEY, |current, actor| {
                response_data(actor).or_else(|| current.cloned())
            }),
        fetch_user().done().effect_on(
            StateKey::derived(|actor| {
                let login = actor
                    .parent()
                    .and_then(|request| request.arg().as_str())
                    .unwrap_or_default();
                user_key(login)
            }),
            |current, actor| response_data(actor).or_else(|| current.cloned()),
        ),
    ]
}
