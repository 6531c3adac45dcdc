use reactorx_persister::{MemoryStorage, Storage, PERSISTED_KEYS};
use reactorx_request::mock::MockTransport;
use reactorx_request::{HttpResponse, RequestEpicConfig};
use reactorx_sample::github::{fetch_emojis, fetch_user, user_key, EMOJIS_KEY};
use reactorx_sample::lifecycle::{AppConfig, AppSystem};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn config() -> AppConfig {
    AppConfig {
        request: RequestEpicConfig {
            base_url: Some("https://api.github.com".into()),
            ..RequestEpicConfig::default()
        },
        persisted_keys: vec![EMOJIS_KEY.to_string()],
        ..AppConfig::default()
    }
}

/// Full flow through the wired system: dedup, request, reducer, persistence.
#[tokio::test]
async fn test_requests_reduce_into_store() {
    // 1. Setup
    let transport = Arc::new(MockTransport::new());
    transport
        .expect_request()
        .delay(Duration::from_millis(10))
        .return_ok(HttpResponse::ok(json!({ "+1": "https://assets/1f44d.png" })));
    let system = AppSystem::new(config(), transport.clone(), Arc::new(MemoryStorage::new()))
        .expect("Failed to start system");

    // 2. Four identical requests
    let requester = system.requester(fetch_emojis());
    let (a, b, c, d) = tokio::join!(
        requester.request(()),
        requester.request(()),
        requester.request(()),
        requester.request(()),
    );
    for outcome in [a, b, c, d] {
        assert!(outcome.expect("request resolves").is_done());
    }

    // 3. One call, response reduced into the store
    assert_eq!(transport.call_count(), 1);
    assert_eq!(
        system.store.get_state().get(EMOJIS_KEY),
        Some(&json!({ "+1": "https://assets/1f44d.png" }))
    );
    assert!(!system.tracker.is_requesting());

    system.shutdown().await.expect("Failed to shut down");
}

#[tokio::test]
async fn test_user_profile_keyed_by_login() {
    let transport = Arc::new(MockTransport::new());
    transport
        .expect_request()
        .return_ok(HttpResponse::ok(json!({ "login": "octocat", "id": 1 })));
    let system = AppSystem::new(config(), transport.clone(), Arc::new(MemoryStorage::new()))
        .unwrap();

    let outcome = system
        .requester(fetch_user())
        .request("octocat".to_string())
        .await
        .unwrap();

    assert!(outcome.is_done());
    assert_eq!(
        system.store.get_state().get(&user_key("octocat")),
        Some(&json!({ "login": "octocat", "id": 1 }))
    );
    let requests = transport.requests();
    let sent = &requests[0];
    assert_eq!(sent.full_url(), "https://api.github.com/users/octocat");
    assert_eq!(sent.header("accept"), Some("application/vnd.github+json"));

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_state_survives_restart() {
    let storage: Arc<MemoryStorage> = Arc::new(MemoryStorage::new());

    // First run fetches and persists
    {
        let transport = Arc::new(MockTransport::new());
        transport
            .expect_request()
            .return_ok(HttpResponse::ok(json!({ "100": "💯" })));
        let system = AppSystem::new(config(), transport, storage.clone()).unwrap();

        let outcome = system.requester(fetch_emojis()).request(()).await.unwrap();
        assert!(outcome.is_done());
        system.flush().await.unwrap();
        system.shutdown().await.unwrap();
    }
    assert!(storage.get(EMOJIS_KEY).await.unwrap().is_some());

    // Second run hydrates without any request
    let transport = Arc::new(MockTransport::new());
    let system = AppSystem::start(config(), transport.clone(), storage.clone())
        .await
        .unwrap();

    let state = system.store.get_state();
    assert_eq!(state.get(EMOJIS_KEY), Some(&json!({ "100": "💯" })));
    assert_eq!(
        state.get(PERSISTED_KEYS),
        Some(&json!({ "emojis": { "key": "emojis" } }))
    );
    assert_eq!(transport.call_count(), 0);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_with_request_in_flight() {
    let transport = Arc::new(MockTransport::new());
    transport
        .expect_request()
        .delay(Duration::from_secs(30))
        .return_ok(HttpResponse::ok(json!(null)));
    let system = AppSystem::new(config(), transport.clone(), Arc::new(MemoryStorage::new()))
        .unwrap();

    let store = system.store.clone();
    store.dispatch(fetch_emojis().with(())).unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(system.tracker.is_requesting());

    tokio::time::timeout(Duration::from_secs(1), system.shutdown())
        .await
        .expect("shutdown should not wait for the request")
        .unwrap();
    assert!(!store.get_state().contains_key(EMOJIS_KEY));
}

#[tokio::test]
async fn test_forms_through_system() {
    let system = AppSystem::new(
        config(),
        Arc::new(MockTransport::new()),
        Arc::new(MemoryStorage::new()),
    )
    .unwrap();

    let form = system.form("login");
    form.initial(json!({ "user": "" })).unwrap();
    form.add_field("user", json!(""), None).unwrap();
    form.update_field("user", json!("octocat"), None).unwrap();

    let mut submitted = None;
    assert!(form.submit(|values| submitted = Some(values)).unwrap());
    assert_eq!(submitted, Some(json!({ "user": "octocat" })));

    system.shutdown().await.unwrap();
}

#[test]
fn test_config_from_json() {
    let config = AppConfig::from_json(
        r#"{
            "request": { "base_url": "https://example.test", "dedup_window_ms": 250 },
            "persister": { "name": "app", "defaultExpiresInSecs": 60 },
            "persisted_keys": ["session"]
        }"#,
    )
    .unwrap();

    assert_eq!(config.request.base_url.as_deref(), Some("https://example.test"));
    assert_eq!(config.request.dedup_window(), Duration::from_millis(250));
    assert_eq!(config.persister.name, "app");
    assert_eq!(config.persister.default_expires_in_secs, 60);
    assert_eq!(config.persisted_keys, vec!["session"]);

    assert!(AppConfig::from_json("{ \"request\": 3 }").is_err());
    assert_eq!(AppConfig::from_json("{}").unwrap(), AppConfig::default());
}
