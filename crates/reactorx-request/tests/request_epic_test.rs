use reactorx_core::testing::ActorRecorder;
use reactorx_core::{compose_epics, ActorKind, AsyncStage, Store};
use reactorx_request::mock::MockTransport;
use reactorx_request::{
    combine_duplicated_request_epic, create_request_epic, error_response_status_equal,
    is_cancelled, request_config, HttpResponse, Method, RequestActor, RequestEpicConfig,
    RequestOpts, Requester, RequestingTracker, TransportError,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// --- Helpers ---

fn emojis() -> RequestActor<()> {
    RequestActor::create("github.emojis", |_| RequestOpts::new(Method::Get, "/emojis"))
}

fn user() -> RequestActor<u32> {
    RequestActor::create("user.get", |id| RequestOpts::new(Method::Get, format!("/users/{id}")))
}

fn config() -> RequestEpicConfig {
    RequestEpicConfig {
        base_url: Some("https://api.github.com".into()),
        ..RequestEpicConfig::default()
    }
}

// --- Tests ---

#[tokio::test]
async fn test_duplicate_requests_share_one_call() {
    // 1. Setup: dedup stage piped into the request epic
    let transport = Arc::new(MockTransport::new());
    transport
        .expect_request()
        .return_ok(HttpResponse::ok(json!({ "100": "https://assets/1f4af.png" })));

    let store = Store::new();
    let _epic = store.epic_on(compose_epics(
        combine_duplicated_request_epic(Duration::from_millis(100)),
        create_request_epic(transport.clone(), config()),
    ));
    let requester = Requester::new(&store, emojis());

    // 2. Four identical requests inside one window
    let (a, b, c, d) = tokio::join!(
        requester.request(()),
        requester.request(()),
        requester.request(()),
        requester.request(()),
    );

    // 3. One transport call, four resolved callers
    for outcome in [a, b, c, d] {
        let outcome = outcome.expect("request should resolve");
        assert!(outcome.is_done());
        assert_eq!(outcome.payload()["data"]["100"], json!("https://assets/1f4af.png"));
    }
    assert_eq!(transport.call_count(), 1);
    transport.verify();
}

#[tokio::test]
async fn test_distinct_args_are_not_combined() {
    let transport = Arc::new(MockTransport::new());
    transport.expect_request().return_ok(HttpResponse::ok(json!({ "id": 1 })));
    transport.expect_request().return_ok(HttpResponse::ok(json!({ "id": 2 })));

    let store = Store::new();
    let _epic = store.epic_on(compose_epics(
        combine_duplicated_request_epic(Duration::from_millis(50)),
        create_request_epic(transport.clone(), config()),
    ));
    let requester = Requester::new(&store, user());

    let (first, second) = tokio::join!(requester.request(1), requester.request(2));

    assert!(first.unwrap().is_done());
    assert!(second.unwrap().is_done());
    assert_eq!(transport.call_count(), 2);

    let mut urls: Vec<String> = transport.requests().iter().map(|r| r.url.clone()).collect();
    urls.sort();
    assert_eq!(urls, vec!["/users/1", "/users/2"]);
}

#[tokio::test]
async fn test_started_carries_resolved_config() {
    let transport = Arc::new(MockTransport::new());
    transport.expect_request().return_ok(HttpResponse::ok(json!(null)));

    let store = Store::new();
    let recorder = ActorRecorder::attach(&store);
    let _epic = store.epic_on(create_request_epic(transport.clone(), config()));

    store.dispatch(user().with(7)).unwrap();

    // STARTED is emitted synchronously with the dispatch
    let started = user().started();
    let started = recorder
        .actors()
        .into_iter()
        .find(|actor| started.is(actor))
        .expect("started actor");
    assert_eq!(started.arg()["url"], json!("/users/7"));
    assert_eq!(started.arg()["baseUrl"], json!("https://api.github.com"));
    assert_eq!(started.arg()["headers"]["Content-Type"], json!("application/json"));

    let done = recorder
        .wait_for(|actor| actor.stage() == Some(AsyncStage::Done), Duration::from_secs(1))
        .await
        .expect("done actor");
    assert_eq!(request_config(&done).unwrap().url, "/users/7");
    assert_eq!(transport.requests()[0].full_url(), "https://api.github.com/users/7");
}

#[tokio::test]
async fn test_cancel_pending_request() {
    // 1. Setup: a slow response
    let transport = Arc::new(MockTransport::new());
    transport
        .expect_request()
        .delay(Duration::from_millis(500))
        .return_ok(HttpResponse::ok(json!({ "never": "seen" })));

    let store = Store::new();
    let recorder = ActorRecorder::attach(&store);
    let _epic = store.epic_on(create_request_epic(transport.clone(), config()));

    // 2. Start, then cancel before the response arrives
    let request = user().with(1);
    store.dispatch(request.clone()).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    store.dispatch(request.cancel()).unwrap();

    let failed = recorder
        .wait_for(|actor| actor.stage() == Some(AsyncStage::Failed), Duration::from_secs(1))
        .await
        .expect("failed actor");

    // 3. Stages: base, started, cancel, failed; never done
    assert_eq!(
        recorder.stages_of("request", "user.get"),
        vec![
            None,
            Some(AsyncStage::Started),
            Some(AsyncStage::Cancel),
            Some(AsyncStage::Failed)
        ]
    );
    assert!(is_cancelled(&failed));

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(!recorder.types().iter().any(|t| t.ends_with("::DONE")));
}

#[tokio::test]
async fn test_cancel_only_matches_equal_arg() {
    let transport = Arc::new(MockTransport::new());
    transport
        .expect_request()
        .delay(Duration::from_millis(50))
        .return_ok(HttpResponse::ok(json!({ "id": 1 })));

    let store = Store::new();
    let recorder = ActorRecorder::attach(&store);
    let _epic = store.epic_on(create_request_epic(transport.clone(), config()));

    store.dispatch(user().with(1)).unwrap();
    store.dispatch(user().with(2).cancel()).unwrap();

    let done = recorder
        .wait_for(|actor| actor.stage() == Some(AsyncStage::Done), Duration::from_secs(1))
        .await;
    assert!(done.is_some());
}

#[tokio::test]
async fn test_requester_cancel_and_callbacks() {
    let transport = Arc::new(MockTransport::new());
    transport
        .expect_request()
        .delay(Duration::from_secs(5))
        .return_ok(HttpResponse::ok(json!(null)));

    let store = Store::new();
    let _epic = store.epic_on(create_request_epic(transport.clone(), config()));

    let failures = Arc::new(AtomicUsize::new(0));
    let finishes = Arc::new(AtomicUsize::new(0));
    let (fail_count, finish_count) = (failures.clone(), finishes.clone());
    let requester = Arc::new(
        Requester::builder(&store, user())
            .on_fail(move |_, _| {
                fail_count.fetch_add(1, Ordering::SeqCst);
            })
            .on_finish(move |_| {
                finish_count.fetch_add(1, Ordering::SeqCst);
            })
            .build(),
    );

    let pending = {
        let requester = requester.clone();
        tokio::spawn(async move { requester.request(9).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(requester.is_requesting());

    requester.cancel().unwrap();
    let outcome = pending.await.unwrap().unwrap();

    assert!(!outcome.is_done());
    assert!(is_cancelled(outcome.actor()));
    assert_eq!(failures.load(Ordering::SeqCst), 1);
    assert_eq!(finishes.load(Ordering::SeqCst), 1);
    assert!(!requester.is_requesting());
}

#[tokio::test]
async fn test_error_status_becomes_failed_actor() {
    let transport = Arc::new(MockTransport::new());
    transport
        .expect_request()
        .return_err(TransportError::Status(HttpResponse::new(
            401,
            json!({ "message": "Unauthorized", "documentation_url": "" }),
        )));

    let store = Store::new();
    let _epic = store.epic_on(create_request_epic(transport.clone(), config()));

    let outcome = Requester::new(&store, emojis()).request(()).await.unwrap();

    assert!(!outcome.is_done());
    assert!(error_response_status_equal(401)(outcome.actor()));
    assert_eq!(outcome.payload()["data"]["message"], json!("Unauthorized"));
    assert_eq!(outcome.actor().actor_type(), "@@request/github.emojis::FAILED");
}

#[tokio::test]
async fn test_requesting_tracker_counts_in_flight() {
    let transport = Arc::new(MockTransport::new());
    transport
        .expect_request()
        .delay(Duration::from_millis(50))
        .return_ok(HttpResponse::ok(json!(null)));

    let store = Store::new();
    let tracker = RequestingTracker::attach(&store);
    let _epic = store.epic_on(create_request_epic(transport.clone(), config()));
    let mut requesting = tracker.requesting();

    store.dispatch(user().with(3)).unwrap();
    assert!(tracker.is_requesting());
    assert_eq!(tracker.count_of("@@request/user.get"), 1);

    let settled = tokio::time::timeout(Duration::from_secs(1), requesting.wait_for(|busy| !*busy))
        .await
        .expect("tracker should settle")
        .is_ok();
    assert!(settled);
    assert!(tracker.counts().is_empty());
}
