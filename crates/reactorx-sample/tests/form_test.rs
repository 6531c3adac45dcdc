use reactorx_core::{ActorKind, Store};
use reactorx_sample::form::{
    form_key, form_reducers, form_update_field, FieldState, FormClient, FormErrors, FormOpts,
    UpdateField,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn setup(name: &str) -> (Store, FormClient) {
    let store = Store::builder().reducers(form_reducers()).build();
    let form = FormClient::new(&store, name);
    (store, form)
}

#[test]
fn test_initial_and_fields() {
    let (store, form) = setup("profile");

    form.initial(json!({ "name": "alice" })).unwrap();
    form.add_field("name", json!(""), None).unwrap();
    form.add_field("address.city", json!("Berlin"), None).unwrap();

    let state = form.state().expect("form state");
    assert_eq!(state.initials, json!({ "name": "alice" }));
    assert_eq!(
        state.values,
        json!({ "name": "alice", "address": { "city": "Berlin" } })
    );
    assert_eq!(
        state.fields["name"],
        FieldState {
            name: Some("name".into()),
            ..FieldState::default()
        }
    );
    assert!(store.get_state().contains_key("form::profile"));
}

#[test]
fn test_field_flags() {
    let (_store, form) = setup("login");
    form.initial(json!({})).unwrap();
    form.add_field("email", json!(""), Some("required".into())).unwrap();

    form.focus_field("email").unwrap();
    let field = form.field("email").unwrap().state;
    assert!(field.active && field.visited);
    assert!(!field.touched && !field.changed);
    assert_eq!(field.error.as_deref(), Some("required"));

    form.update_field("email", json!("a@b.c"), None).unwrap();
    form.blur_field("email").unwrap();

    let view = form.field("email").unwrap();
    assert_eq!(view.value, json!("a@b.c"));
    assert!(!view.state.active);
    assert!(view.state.touched && view.state.changed && view.state.visited);
    assert_eq!(view.state.error, None);
}

#[test]
fn test_submit_lifecycle_flags() {
    let (_store, form) = setup("order");
    form.initial(json!({})).unwrap();
    form.add_field("qty", json!(1), None).unwrap();
    form.add_field("note", json!(""), None).unwrap();

    form.start_submit().unwrap();
    let state = form.state().unwrap();
    assert!(state.is_submitting());
    assert!(state.fields.values().all(|field| field.visited && field.touched));

    form.end_submit().unwrap();
    assert!(!form.state().unwrap().is_submitting());
}

#[test]
fn test_set_errors_replaces_all_errors() {
    let (_store, form) = setup("signup");
    form.initial(json!({})).unwrap();
    form.add_field("email", json!(""), Some("old".into())).unwrap();
    form.add_field("password", json!(""), None).unwrap();

    let errors = FormErrors::from([("password".to_string(), "too short".to_string())]);
    form.set_errors(errors).unwrap();

    let state = form.state().unwrap();
    assert_eq!(state.fields["email"].error, None);
    assert_eq!(state.fields["password"].error.as_deref(), Some("too short"));
    assert!(!state.is_valid());
}

#[test]
fn test_remove_field_keeps_value() {
    let (_store, form) = setup("search");
    form.initial(json!({ "q": "rust" })).unwrap();
    form.add_field("q", json!(""), None).unwrap();

    form.remove_field("q").unwrap();

    let state = form.state().unwrap();
    assert!(state.fields.is_empty());
    assert_eq!(state.values, json!({ "q": "rust" }));
}

#[test]
fn test_destroy_removes_form_key() {
    let (store, form) = setup("temp");
    form.initial(json!({ "a": 1 })).unwrap();
    form.destroy().unwrap();

    assert!(form.state().is_none());
    assert!(!store.get_state().contains_key(&form_key("temp")));
}

#[test]
fn test_uninitialised_form_is_left_alone() {
    let (store, form) = setup("ghost");
    let before = store.get_state();

    form.add_field("x", json!(1), None).unwrap();
    form.start_submit().unwrap();
    form.end_submit().unwrap();

    assert!(form.state().is_none());
    assert!(store.get_state().ptr_eq(&before));
}

#[test]
fn test_forms_are_independent() {
    let (store, first) = setup("first");
    let second = FormClient::new(&store, "second");
    first.initial(json!({ "v": 1 })).unwrap();
    second.initial(json!({ "v": 2 })).unwrap();

    form_update_field()
        .with(
            UpdateField {
                value: json!(10),
                error: None,
            },
            FormOpts {
                form: "second".into(),
                field: Some("v".into()),
            },
        )
        .invoke(&store)
        .unwrap();

    assert_eq!(first.values(), json!({ "v": 1 }));
    assert_eq!(second.values(), json!({ "v": 10 }));
    assert_eq!(form_update_field().actor_type(), "@@form/field/update");
}

#[test]
fn test_submit_only_when_valid() {
    let (_store, form) = setup("checkout");
    form.initial(json!({ "items": [] })).unwrap();
    form.add_field("items[1]", json!("book"), Some("pick one".into()))
        .unwrap();

    let calls = AtomicUsize::new(0);
    let submitted = form
        .submit(|_| {
            calls.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    assert!(!submitted);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!form.state().unwrap().is_submitting());

    form.update_field("items[1]", json!("book"), None).unwrap();
    let received = Mutex::new(Value::Null);
    let submitted = form
        .submit(|values| *received.lock().unwrap() = values)
        .unwrap();

    assert!(submitted);
    // the hole at items[0] is dropped
    assert_eq!(*received.lock().unwrap(), json!({ "items": ["book"] }));
}

#[test]
fn test_connection_follows_one_form() {
    let (store, form) = setup("watched");
    let other = FormClient::new(&store, "other");
    let notified = Arc::new(AtomicUsize::new(0));

    let conn = form.conn();
    let _subscription = conn.subscribe({
        let notified = notified.clone();
        move |_| {
            notified.fetch_add(1, Ordering::SeqCst);
        }
    });
    assert_eq!(notified.load(Ordering::SeqCst), 1);

    other.initial(json!({})).unwrap();
    assert_eq!(notified.load(Ordering::SeqCst), 1);

    form.initial(json!({ "a": 1 })).unwrap();
    assert_eq!(notified.load(Ordering::SeqCst), 2);
    assert_eq!(conn.value().unwrap().values, json!({ "a": 1 }));
}

#[test]
fn test_oversized_field_index_keeps_values() {
    let (_store, form) = setup("tags");
    form.initial(json!({ "tags": ["rust"] })).unwrap();

    form.update_field("tags[18446744073709551615]", json!("x"), None)
        .unwrap();

    assert_eq!(form.values(), json!({ "tags": ["rust"] }));
}
