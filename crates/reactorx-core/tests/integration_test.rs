use reactorx_core::testing::ActorRecorder;
use reactorx_core::{
    middleware, shallow_equal, Actor, ActorKind, NamedActor, Observable, State, Store,
    StoreError,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// --- Helpers ---

fn bump(count: Option<&Value>) -> Option<Value> {
    Some(json!(count.and_then(Value::as_i64).unwrap_or(0) + 1))
}

fn ping_pong_store() -> (Store, NamedActor, NamedActor) {
    let ping = Actor::of("app").named("ping");
    let pong = Actor::of("app").named("pong");
    let store = Store::builder()
        .state(State::try_from(json!({ "ping": 0, "pong": 0 })).unwrap())
        .reducer(ping.effect_on("ping", |count, _| bump(count)))
        .reducer(pong.effect_on("pong", |count, _| bump(count)))
        .build();
    (store, ping, pong)
}

fn collect<T: Send + 'static>(observable: Observable<T>) -> (Arc<Mutex<Vec<T>>>, reactorx_core::Subscription) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let subscription = observable.subscribe(move |value| sink.lock().unwrap().push(value));
    (seen, subscription)
}

// --- Tests ---

#[test]
fn test_ping_pong_epic() {
    let (store, ping, pong) = ping_pong_store();

    // 1. Wire the epic
    let _epic = store.epic_on(move |actions: Observable<Actor>| {
        let (ping, pong) = (ping.clone(), pong.clone());
        actions
            .filter(move |actor| ping.is(actor))
            .map(move |_| pong.with_arg(Value::Null))
    });
    let (states, _states_sub) = collect(store.observe().map(|state| state.to_value()));

    // 2. Dispatch five pings
    let ping = Actor::of("app").named("ping");
    for i in 1..=5 {
        ping.with_arg(Value::Null).invoke(&store).unwrap();
        assert_eq!(store.get_state().to_value(), json!({ "ping": i, "pong": i }));
    }

    // 3. Every intermediate state was observed
    let states = states.lock().unwrap();
    assert_eq!(states.first(), Some(&json!({ "ping": 0, "pong": 0 })));
    assert_eq!(states.last(), Some(&json!({ "ping": 5, "pong": 5 })));
    assert_eq!(states.len(), 11);
    assert!(states.contains(&json!({ "ping": 3, "pong": 2 })));
}

#[test]
fn test_connection_suppresses_equal_values() {
    let (store, ping, pong) = ping_pong_store();
    let pings = store.conn(|state| state.get("ping").cloned());
    let (seen, _sub) = collect(pings.observe());

    ping.with_arg(Value::Null).invoke(&store).unwrap();
    pong.with_arg(Value::Null).invoke(&store).unwrap();
    pong.with_arg(Value::Null).invoke(&store).unwrap();
    ping.with_arg(Value::Null).invoke(&store).unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![Some(json!(0)), Some(json!(1)), Some(json!(2))]
    );
}

#[test]
fn test_chained_connections_compose_suppression() {
    let set = Actor::of("app").named("set-user");
    let store = Store::builder()
        .reducer(set.effect_on("user", |_, actor| Some(actor.arg().clone())))
        .build();

    let user = store.conn_with(
        |state| state.get("user").cloned().unwrap_or(Value::Null),
        shallow_equal,
    );
    let name = user.conn(|user| user["name"].as_str().map(str::to_string));
    let (names, _sub) = collect(name.observe());

    set.with_arg(json!({ "name": "ada", "age": 36 })).invoke(&store).unwrap();
    set.with_arg(json!({ "name": "ada", "age": 36 })).invoke(&store).unwrap();
    set.with_arg(json!({ "name": "ada", "age": 37 })).invoke(&store).unwrap();
    set.with_arg(json!({ "name": "grace", "age": 37 })).invoke(&store).unwrap();

    assert_eq!(
        *names.lock().unwrap(),
        vec![None, Some("ada".to_string()), Some("grace".to_string())]
    );
    assert_eq!(name.value(), Some("grace".to_string()));
}

#[test]
fn test_disposing_connection_leaves_siblings() {
    let (store, ping, _) = ping_pong_store();
    let first = store.conn(|state| state.get("ping").cloned());
    let second = store.conn(|state| state.get("ping").cloned());

    let (first_seen, first_sub) = collect(first.observe());
    let (second_seen, _second_sub) = collect(second.observe());

    drop(first_sub);
    ping.with_arg(Value::Null).invoke(&store).unwrap();

    assert_eq!(first_seen.lock().unwrap().len(), 1);
    assert_eq!(second_seen.lock().unwrap().len(), 2);
    assert_eq!(first.value(), Some(json!(1)));
}

#[test]
fn test_actor_without_reducer_is_broadcast() {
    let (store, _, _) = ping_pong_store();
    let recorder = ActorRecorder::attach(&store);
    let before = store.get_state();

    store.dispatch(Actor::new("app", "unhandled")).unwrap();

    assert!(before.ptr_eq(&store.get_state()));
    assert_eq!(recorder.types(), vec!["@@app/unhandled"]);
}

#[test]
fn test_same_key_reducers_fold_in_order() {
    let apply = Actor::of("app").named("apply");
    let store = Store::builder()
        .reducer(apply.effect_on("log", |log, _| {
            let mut log = log.cloned().unwrap_or_else(|| json!([]));
            log.as_array_mut()?.push(json!("first"));
            Some(log)
        }))
        .build();
    store.register(apply.effect_on("log", |log, _| {
        let mut log = log.cloned().unwrap_or_else(|| json!([]));
        log.as_array_mut()?.push(json!("second"));
        Some(log)
    }));

    apply.with_arg(Value::Null).invoke(&store).unwrap();

    assert_eq!(store.get_state().get("log"), Some(&json!(["first", "second"])));
}

#[test]
fn test_epic_sees_state_after_reduce() {
    let (store, ping, _) = ping_pong_store();
    let observed = Arc::new(Mutex::new(Vec::new()));

    let sink = observed.clone();
    let reader = store.clone();
    let _sub = store.actions().subscribe(move |_| {
        sink.lock().unwrap().push(reader.get_state().get("ping").cloned());
    });

    ping.with_arg(Value::Null).invoke(&store).unwrap();
    ping.with_arg(Value::Null).invoke(&store).unwrap();

    assert_eq!(*observed.lock().unwrap(), vec![Some(json!(1)), Some(json!(2))]);
}

#[test]
fn test_middleware_can_swallow() {
    let (store, ping, _) = ping_pong_store();
    store.apply_middleware(middleware::from_fn(|actor, next| {
        if actor.name() == "ping" {
            return Ok(());
        }
        next.run(actor)
    }));

    ping.with_arg(Value::Null).invoke(&store).unwrap();

    assert_eq!(store.get_state().get("ping"), Some(&json!(0)));
}

#[test]
fn test_reentrant_dispatch_from_reducer() {
    let store = Store::new();
    let inner = store.clone();
    let seen: Arc<Mutex<Option<Result<(), StoreError>>>> = Arc::new(Mutex::new(None));
    let sink = seen.clone();

    let outer = Actor::of("app").named("outer");
    store.register(outer.effect_on("x", move |_, _| {
        *sink.lock().unwrap() = Some(inner.dispatch(Actor::new("app", "nested")));
        Some(Value::Bool(true))
    }));

    assert!(outer.with_arg(Value::Null).invoke(&store).is_ok());
    assert!(matches!(
        *seen.lock().unwrap(),
        Some(Err(StoreError::ReentrantDispatch(_)))
    ));
}

#[test]
fn test_independent_stores() {
    let (first, ping, _) = ping_pong_store();
    let (second, _, _) = ping_pong_store();

    ping.with_arg(Value::Null).invoke(&first).unwrap();

    assert_eq!(first.get_state().get("ping"), Some(&json!(1)));
    assert_eq!(second.get_state().get("ping"), Some(&json!(0)));
}

#[tokio::test]
async fn test_async_epic_dispatches_later() {
    let (store, ping, pong) = ping_pong_store();
    let recorder = ActorRecorder::attach(&store);

    let _epic = store.epic_on(move |actions: Observable<Actor>| {
        let (ping, pong) = (ping.clone(), pong.clone());
        actions.filter(move |actor| ping.is(actor)).merge_map(move |_| {
            let pong = pong.clone();
            Observable::from_future(move || {
                let pong = pong.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    pong.with_arg(Value::Null)
                }
            })
        })
    });

    Actor::of("app").named("ping").with_arg(Value::Null).invoke(&store).unwrap();
    assert_eq!(store.get_state().get("pong"), Some(&json!(0)));

    let pong = recorder
        .wait_for(|actor| actor.name() == "pong", Duration::from_secs(1))
        .await;
    assert!(pong.is_some());
    assert_eq!(store.get_state().get("pong"), Some(&json!(1)));
}
