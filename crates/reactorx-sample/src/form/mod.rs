//! # Form Actors
//!
//! Form state kept in the store, one key per form: `form::{name}`. The key is
//! derived from the actor's `opts.form`, so a single set of reducers serves every
//! form in the application.
//!
//! ## Structure
//!
//! - [`FormState`] / [`FieldState`] - the serialized shape under the form key
//! - `form_*` functions - the actor kinds (`@@form/initial`, `@@form/field/add`, ...)
//! - [`form_reducers`] - reducer bindings for all of them
//! - [`FormClient`] - dispatch helpers bound to one form name
//!
//! ## Field flags
//!
//! | flag | set by |
//! |------|--------|
//! | `active` | focus (cleared on blur) |
//! | `visited` | focus, start-submit |
//! | `touched` | blur, start-submit |
//! | `changed` | update |
//! | `error` | add, update, set-errors |
//!
//! ## Usage
//!
//! ```rust
//! use reactorx_core::Store;
//! use reactorx_sample::form::{form_reducers, FormClient};
//! use serde_json::json;
//!
//! let store = Store::builder().reducers(form_reducers()).build();
//! let form = FormClient::new(&store, "login");
//!
//! form.initial(json!({ "user": { "name": "" } })).unwrap();
//! form.add_field("user.name", json!(""), None).unwrap();
//! form.update_field("user.name", json!("alice"), None).unwrap();
//!
//! assert_eq!(form.values()["user"]["name"], json!("alice"));
//! ```

pub mod client;
pub mod error;

pub use client::*;
pub use error::*;

use reactorx_core::{Actor, ActorKind, NamedActor, ReducerBinding, StateKey};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

pub const FORM_GROUP: &str = "form";

/// State key of form `name`.
pub fn form_key(name: &str) -> String {
    format!("{FORM_GROUP}::{name}")
}

/// Form name for a named form instance (`name::id`).
pub fn form_name(name: &str, id: Option<&str>) -> String {
    match id {
        Some(id) => format!("{name}::{id}"),
        None => name.to_string(),
    }
}

// =============================================================================
// STATE
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub changed: bool,
    #[serde(default)]
    pub touched: bool,
    #[serde(default)]
    pub visited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormState {
    #[serde(default)]
    pub fields: BTreeMap<String, FieldState>,
    #[serde(default)]
    pub initials: Value,
    #[serde(default)]
    pub values: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitting: Option<bool>,
}

impl FormState {
    /// True when no field carries an error.
    pub fn is_valid(&self) -> bool {
        self.fields.values().all(|field| field.error.is_none())
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.unwrap_or(false)
    }
}

// =============================================================================
// ACTORS
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormOpts {
    pub form: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddField {
    #[serde(default)]
    pub default_value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateField {
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub type FormErrors = BTreeMap<String, String>;

fn form_actor<A, O>(name: &str) -> NamedActor<A, O> {
    Actor::of(FORM_GROUP).typed(name)
}

pub fn form_initial() -> NamedActor<Value, FormOpts> {
    form_actor("initial")
}

pub fn form_destroy() -> NamedActor<(), FormOpts> {
    form_actor("destroy")
}

pub fn form_start_submit() -> NamedActor<(), FormOpts> {
    form_actor("start-submit")
}

pub fn form_end_submit() -> NamedActor<(), FormOpts> {
    form_actor("end-submit")
}

pub fn form_set_errors() -> NamedActor<FormErrors, FormOpts> {
    form_actor("set-errors")
}

pub fn form_add_field() -> NamedActor<AddField, FormOpts> {
    form_actor("field/add")
}

pub fn form_update_field() -> NamedActor<UpdateField, FormOpts> {
    form_actor("field/update")
}

pub fn form_remove_field() -> NamedActor<(), FormOpts> {
    form_actor("field/remove")
}

pub fn form_focus_field() -> NamedActor<(), FormOpts> {
    form_actor("field/focus")
}

pub fn form_blur_field() -> NamedActor<(), FormOpts> {
    form_actor("field/blur")
}

// =============================================================================
// REDUCERS
// =============================================================================

fn form_state_key() -> StateKey {
    StateKey::derived(|actor: &Actor| {
        form_key(
            actor
                .opts()
                .get("form")
                .and_then(Value::as_str)
                .unwrap_or_default(),
        )
    })
}

fn field_of(actor: &Actor) -> Option<&str> {
    actor.opts().get("field").and_then(Value::as_str)
}

/// Binds `effect` to an existing form state. Actors for a form that was never
/// initialised leave the state untouched.
fn on_form<K, F>(kind: &K, effect: F) -> ReducerBinding
where
    K: ActorKind,
    F: Fn(FormState, &Actor) -> FormState + Send + Sync + 'static,
{
    kind.effect_on(form_state_key(), move |current, actor| {
        let current = current?;
        let state = match serde_json::from_value::<FormState>(current.clone()) {
            Ok(state) => state,
            Err(e) => {
                warn!(actor_type = actor.actor_type(), error = %e, "Malformed form state");
                return Some(current.clone());
            }
        };
        match serde_json::to_value(effect(state, actor)) {
            Ok(next) => Some(next),
            Err(e) => {
                warn!(actor_type = actor.actor_type(), error = %e, "Unserializable form state");
                Some(current.clone())
            }
        }
    })
}

/// Same as [`on_form`] for actors addressing a single field through `opts.field`.
fn on_field<K, F>(kind: &K, effect: F) -> ReducerBinding
where
    K: ActorKind,
    F: Fn(FormState, &str, &Actor) -> FormState + Send + Sync + 'static,
{
    on_form(kind, move |state, actor| match field_of(actor) {
        Some(field) => effect(state, field, actor),
        None => state,
    })
}

fn put_values_or_keep(values: Value, field: &str, value: Value) -> Value {
    let mut next = values.clone();
    match put_values(&mut next, field, value) {
        Ok(()) => next,
        Err(e) => {
            warn!(field, error = %e, "Ignoring field value");
            values
        }
    }
}

/// Reducers for every form actor, all writing to `form::{opts.form}`.
pub fn form_reducers() -> Vec<ReducerBinding> {
    let add_field = form_add_field();
    let update_field = form_update_field();
    let set_errors = form_set_errors();

    vec![
        form_initial().effect_on(form_state_key(), |_, actor| {
            let initials = actor.arg().clone();
            let state = FormState {
                fields: BTreeMap::new(),
                values: initials.clone(),
                initials,
                submitting: None,
            };
            serde_json::to_value(state).ok()
        }),
        form_destroy().effect_on(form_state_key(), |_, _| None),
        on_form(&form_start_submit(), |mut state, _| {
            for field in state.fields.values_mut() {
                field.visited = true;
                field.touched = true;
            }
            state.submitting = Some(true);
            state
        }),
        on_form(&form_end_submit(), |mut state, _| {
            state.submitting = Some(false);
            state
        }),
        on_form(&set_errors.clone(), move |mut state, actor| {
            let errors = set_errors.arg_of(actor).unwrap_or_default();
            for (name, field) in state.fields.iter_mut() {
                field.error = errors.get(name).cloned();
            }
            state
        }),
        on_field(&add_field.clone(), move |state, field, actor| {
            let Some(AddField { default_value, error }) = add_field.arg_of(actor) else {
                return state;
            };
            let value = get_value(&state.initials, field)
                .cloned()
                .unwrap_or(default_value);
            FormState {
                values: put_values_or_keep(state.values, field, value),
                fields: put_fields(&state.fields, field, |_| {
                    Some(FieldState {
                        error,
                        ..FieldState::default()
                    })
                }),
                ..state
            }
        }),
        on_field(&update_field.clone(), move |state, field, actor| {
            let Some(UpdateField { value, error }) = update_field.arg_of(actor) else {
                return state;
            };
            FormState {
                values: put_values_or_keep(state.values, field, value),
                fields: put_fields(&state.fields, field, |current| {
                    Some(FieldState {
                        changed: true,
                        error,
                        ..current
                    })
                }),
                ..state
            }
        }),
        on_field(&form_remove_field(), |state, field, _| FormState {
            fields: put_fields(&state.fields, field, |_| None),
            ..state
        }),
        on_field(&form_focus_field(), |state, field, _| FormState {
            fields: put_fields(&state.fields, field, |current| {
                Some(FieldState {
                    active: true,
                    visited: true,
                    ..current
                })
            }),
            ..state
        }),
        on_field(&form_blur_field(), |state, field, _| FormState {
            fields: put_fields(&state.fields, field, |current| {
                Some(FieldState {
                    active: false,
                    touched: true,
                    ..current
                })
            }),
            ..state
        }),
    ]
}

// =============================================================================
// VALUE PATHS
// =============================================================================

/// Largest array a field path may grow.
const MAX_ARRAY_LEN: usize = 10_000;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Key(String),
    Index(usize),
}

/// Splits `user.tags[0].name` (or `user.tags.0.name`) into segments.
fn parse_path(path: &str) -> Result<Vec<Segment>, FormError> {
    let invalid = || FormError::InvalidPath(path.to_string());
    let mut segments = Vec::new();

    for part in path.split('.') {
        let (key, mut rest) = match part.find('[') {
            Some(open) => part.split_at(open),
            None => (part, ""),
        };
        if key.is_empty() && (segments.is_empty() || rest.is_empty()) {
            return Err(invalid());
        }
        if !key.is_empty() {
            segments.push(match key.parse::<usize>() {
                Ok(index) => Segment::Index(index),
                Err(_) => Segment::Key(key.to_string()),
            });
        }
        while !rest.is_empty() {
            let close = rest.find(']').ok_or_else(invalid)?;
            let index = rest[1..close].parse::<usize>().map_err(|_| invalid())?;
            segments.push(Segment::Index(index));
            rest = &rest[close + 1..];
            if !rest.is_empty() && !rest.starts_with('[') {
                return Err(invalid());
            }
        }
    }
    Ok(segments)
}

/// Reads the value at a dotted path.
pub fn get_value<'a>(values: &'a Value, path: &str) -> Option<&'a Value> {
    let segments = parse_path(path).ok()?;
    segments
        .iter()
        .try_fold(values, |current, segment| match segment {
            Segment::Key(key) => current.get(key.as_str()),
            Segment::Index(index) => current.get(*index),
        })
}

/// Writes `value` at a dotted path, creating objects and arrays on the way.
/// Non-container values in the way are replaced.
pub fn put_values(values: &mut Value, path: &str, value: Value) -> Result<(), FormError> {
    let segments = parse_path(path)?;
    let mut current = values;

    for (position, segment) in segments.iter().enumerate() {
        let last = position + 1 == segments.len();
        let slot = match segment {
            Segment::Key(key) => {
                if !current.is_object() {
                    *current = Value::Object(Map::new());
                }
                let Value::Object(map) = current else {
                    return Err(FormError::InvalidPath(path.to_string()));
                };
                map.entry(key.clone()).or_insert(Value::Null)
            }
            Segment::Index(index) => {
                match current {
                    Value::Array(_) => {}
                    // numeric keys on an object stay keys
                    Value::Object(map) => {
                        let slot = map.entry(index.to_string()).or_insert(Value::Null);
                        if last {
                            *slot = value;
                            return Ok(());
                        }
                        current = slot;
                        continue;
                    }
                    _ => *current = Value::Array(Vec::new()),
                }
                let Value::Array(items) = current else {
                    return Err(FormError::InvalidPath(path.to_string()));
                };
                if items.len() <= *index {
                    let len = index
                        .checked_add(1)
                        .filter(|len| *len <= MAX_ARRAY_LEN)
                        .ok_or_else(|| FormError::InvalidPath(path.to_string()))?;
                    items.resize(len, Value::Null);
                }
                &mut items[*index]
            }
        };
        if last {
            *slot = value;
            return Ok(());
        }
        current = slot;
    }
    Ok(())
}

/// Applies `effect` to the state of `field`; `None` removes the field. The
/// field's `name` is filled in when the effect leaves it empty.
pub fn put_fields<F>(
    fields: &BTreeMap<String, FieldState>,
    field: &str,
    effect: F,
) -> BTreeMap<String, FieldState>
where
    F: FnOnce(FieldState) -> Option<FieldState>,
{
    let mut next = fields.clone();
    let current = next.remove(field).unwrap_or_default();
    if let Some(mut state) = effect(current) {
        state.name.get_or_insert_with(|| field.to_string());
        next.insert(field.to_string(), state);
    }
    next
}

/// Drops `null` items from arrays, recursively. Used on submitted values so
/// removed array fields do not leave holes.
pub fn pick_valid_values(values: &Value) -> Value {
    match values {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .filter(|item| !item.is_null())
                .map(pick_valid_values)
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), pick_valid_values(value)))
                .collect(),
        ),
        other => other.clone(),
    }
}
