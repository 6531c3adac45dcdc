//! # reactorx sample
//!
//! A small application on top of the reactorx store:
//!
//! - **github**: request actors for the GitHub API and reducers keeping responses
//! - **form**: form actors with derived state keys, driven through a `FormClient`
//! - **lifecycle**: `AppSystem`, which wires the store, epics and persister
//!
//! ## Run
//!
//! ```bash
//! RUST_LOG=info cargo run -p reactorx-sample
//! RUST_LOG=debug cargo run -p reactorx-sample   # every dispatched actor
//! ```
//!
//! The second run starts with the emoji map hydrated from the redb file in the
//! system temp directory and skips the request.

use reactorx_core::tracing::setup_tracing;
use reactorx_persister::RedbStorage;
use reactorx_request::{ReqwestTransport, RequestEpicConfig};
use reactorx_sample::form::FormErrors;
use reactorx_sample::github::{fetch_emojis, fetch_user, user_key, EMOJIS_KEY, GITHUB_API};
use reactorx_sample::lifecycle::{AppConfig, AppError, AppSystem};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn, Instrument};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    setup_tracing();

    let config = AppConfig {
        request: RequestEpicConfig {
            base_url: Some(GITHUB_API.to_string()),
            default_headers: BTreeMap::from([(
                "User-Agent".to_string(),
                "reactorx-sample".to_string(),
            )]),
            timeout_ms: Some(10_000),
            ..RequestEpicConfig::default()
        },
        persisted_keys: vec![EMOJIS_KEY.to_string()],
        ..AppConfig::default()
    };

    let path = std::env::temp_dir().join("reactorx-sample.redb");
    let storage = Arc::new(RedbStorage::open(&path, &config.persister.name)?);
    let system = AppSystem::start(config, Arc::new(ReqwestTransport::default()), storage).await?;
    info!(path = %path.display(), "Application started");

    // Emojis: four identical requests collapse into one call
    let span = tracing::info_span!("emojis");
    async {
        if let Some(emojis) = system.store.get_state().get(EMOJIS_KEY) {
            let count = emojis.as_object().map(|map| map.len()).unwrap_or(0);
            info!(count, "Emojis restored from storage");
            return Ok::<_, AppError>(());
        }

        let requester = system.requester(fetch_emojis());
        let outcomes = tokio::join!(
            requester.request(()),
            requester.request(()),
            requester.request(()),
            requester.request(()),
        );
        for outcome in [outcomes.0, outcomes.1, outcomes.2, outcomes.3] {
            let outcome = outcome?;
            if !outcome.is_done() {
                warn!(payload = %outcome.payload(), "Emoji request failed");
            }
        }
        let count = system
            .store
            .get_state()
            .get(EMOJIS_KEY)
            .and_then(|emojis| emojis.as_object().map(|map| map.len()))
            .unwrap_or(0);
        info!(count, "Emojis fetched");
        Ok(())
    }
    .instrument(span)
    .await?;

    // User profile, cancelled if it takes too long
    let requester = system.requester(fetch_user());
    let login = "octocat".to_string();
    match tokio::time::timeout(
        std::time::Duration::from_secs(5),
        requester.request(login.clone()),
    )
    .await
    {
        Ok(outcome) => {
            let outcome = outcome?;
            info!(
                actor_type = outcome.actor().actor_type(),
                stored = system.store.get_state().contains_key(&user_key(&login)),
                "User request finished"
            );
        }
        Err(_) => {
            warn!(%login, "User request too slow, cancelling");
            requester.cancel()?;
        }
    }
    info!(
        requesting = system.tracker.is_requesting(),
        "Requests settled"
    );

    // Forms
    let form = system.form("signup");
    form.initial(json!({ "email": "" }))?;
    form.add_field("email", json!(""), Some("required".into()))?;
    form.add_field("profile.name", json!("anonymous"), None)?;

    let submitted = form.submit(|values| info!(%values, "Submitting"))?;
    info!(submitted, "First submit (with errors)");

    form.focus_field("email")?;
    form.update_field("email", json!("octocat@github.com"), None)?;
    form.blur_field("email")?;
    form.set_errors(FormErrors::new())?;
    let submitted = form.submit(|values| info!(%values, "Submitting"))?;
    info!(submitted, fields = ?form.state().map(|s| s.fields.len()), "Second submit");
    form.destroy()?;

    if let Err(e) = system.flush().await {
        error!(error = %e, "Failed to persist state");
    }
    system.shutdown().await?;
    info!("Application completed");
    Ok(())
}
