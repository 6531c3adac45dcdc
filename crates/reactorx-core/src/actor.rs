//! # Actors
//!
//! An [`Actor`] is the message flowing through a [`Store`]: a namespaced type string
//! plus a JSON `arg` payload and `opts` side channel. Actors are values; two actors
//! are "the same kind" when their type strings match, never by identity.
//!
//! ## Naming
//!
//! | factory | type string |
//! |---------|-------------|
//! | `Actor::of("app").named("ping")` | `@@app/ping` |
//! | `AsyncActor::of("request").named("get").started()` | `@@request/get::STARTED` |
//!
//! ## Factories
//!
//! Factories ([`NamedActor`], [`AsyncNamedActor`], [`StageActor`]) describe a kind of
//! actor. They build concrete actors (`with`, `with_arg`), recognise them (`is`), and
//! describe reducers (`effect_on`). A reducer description is inert until it is handed
//! to [`Store::register`](crate::Store::register) or the store builder.
//!
//! ```rust
//! use reactorx_core::{Actor, ActorKind, Store};
//! use serde_json::json;
//!
//! let ping = Actor::of("app").named("ping");
//! let store = Store::builder()
//!     .reducer(ping.effect_on("ping", |count, _| {
//!         Some(json!(count.and_then(|c| c.as_i64()).unwrap_or(0) + 1))
//!     }))
//!     .build();
//!
//! ping.with_arg(json!(null)).invoke(&store).unwrap();
//! assert_eq!(store.get_state().get("ping"), Some(&json!(1)));
//! ```

use crate::error::StoreError;
use crate::reducer::{ReducerBinding, StateKey};
use crate::store::Store;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::warn;

/// Lifecycle stage of an asynchronous operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AsyncStage {
    Started,
    Done,
    Failed,
    Cancel,
}

impl AsyncStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            AsyncStage::Started => "STARTED",
            AsyncStage::Done => "DONE",
            AsyncStage::Failed => "FAILED",
            AsyncStage::Cancel => "CANCEL",
        }
    }

    /// `Done`, `Failed` and `Cancel` end an operation.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AsyncStage::Started)
    }
}

impl fmt::Display for AsyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn type_string(group: &str, name: &str, stage: Option<AsyncStage>) -> String {
    match stage {
        Some(stage) => format!("@@{group}/{name}::{stage}"),
        None => format!("@@{group}/{name}"),
    }
}

/// Serializes a payload, falling back to `null` when it has no JSON form.
pub(crate) fn to_payload<T: Serialize>(value: &T, actor_type: &str) -> Value {
    serde_json::to_value(value).unwrap_or_else(|error| {
        warn!(actor_type, %error, "Payload is not representable as JSON, using null");
        Value::Null
    })
}

// =============================================================================
// ACTOR
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Actor {
    actor_type: String,
    group: String,
    name: String,
    stage: Option<AsyncStage>,
    arg: Value,
    opts: Value,
    parent: Option<Arc<Actor>>,
}

impl Actor {
    pub fn of(group: impl Into<String>) -> ActorGroup {
        ActorGroup {
            group: group.into(),
        }
    }

    /// A plain actor with `null` arg and opts.
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        let group = group.into();
        let name = name.into();
        Self {
            actor_type: type_string(&group, &name, None),
            group,
            name,
            stage: None,
            arg: Value::Null,
            opts: Value::Null,
            parent: None,
        }
    }

    /// Returns a copy carrying the given payloads.
    pub fn with_payload(mut self, arg: Value, opts: Value) -> Self {
        self.arg = arg;
        self.opts = opts;
        self
    }

    pub fn actor_type(&self) -> &str {
        &self.actor_type
    }

    /// The type string without any lifecycle suffix.
    pub fn base_type(&self) -> String {
        type_string(&self.group, &self.name, None)
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage(&self) -> Option<AsyncStage> {
        self.stage
    }

    pub fn arg(&self) -> &Value {
        &self.arg
    }

    pub fn opts(&self) -> &Value {
        &self.opts
    }

    pub fn parent(&self) -> Option<&Actor> {
        self.parent.as_deref()
    }

    pub fn arg_as<A: DeserializeOwned>(&self) -> Result<A, serde_json::Error> {
        A::deserialize(&self.arg)
    }

    pub fn opts_as<O: DeserializeOwned>(&self) -> Result<O, serde_json::Error> {
        O::deserialize(&self.opts)
    }

    pub fn invoke(self, store: &Store) -> Result<(), StoreError> {
        store.dispatch(self)
    }

    // -------------------------------------------------------------------------
    // Lifecycle variants
    // -------------------------------------------------------------------------

    pub fn started(&self, arg: impl Serialize) -> Actor {
        self.stage_actor(AsyncStage::Started, arg)
    }

    pub fn done(&self, arg: impl Serialize) -> Actor {
        self.stage_actor(AsyncStage::Done, arg)
    }

    pub fn failed(&self, arg: impl Serialize) -> Actor {
        self.stage_actor(AsyncStage::Failed, arg)
    }

    /// Cancellation request for this operation. Carries the operation's own arg so
    /// it can be matched against the pending request.
    pub fn cancel(&self) -> Actor {
        let arg = self.operation().arg.clone();
        self.stage_actor(AsyncStage::Cancel, arg)
    }

    /// The base actor an operation was started from: the parent of a lifecycle
    /// actor, or `self` for a base actor.
    pub fn operation(&self) -> &Actor {
        match (&self.stage, &self.parent) {
            (Some(_), Some(parent)) => parent,
            _ => self,
        }
    }

    fn stage_actor(&self, stage: AsyncStage, arg: impl Serialize) -> Actor {
        let actor_type = type_string(&self.group, &self.name, Some(stage));
        let arg = to_payload(&arg, &actor_type);
        let parent = match (&self.stage, &self.parent) {
            (Some(_), Some(parent)) => Arc::clone(parent),
            _ => Arc::new(self.clone()),
        };
        Actor {
            actor_type,
            group: self.group.clone(),
            name: self.name.clone(),
            stage: Some(stage),
            arg,
            opts: self.opts.clone(),
            parent: Some(parent),
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.actor_type)
    }
}

// =============================================================================
// FACTORIES
// =============================================================================

/// Anything that names a kind of actor.
pub trait ActorKind {
    fn actor_type(&self) -> &str;

    fn is(&self, actor: &Actor) -> bool {
        actor.actor_type() == self.actor_type()
    }

    /// Describes a reducer for this actor kind on `key`. The binding does nothing
    /// until registered with a store.
    fn effect_on<F>(&self, key: impl Into<StateKey>, reducer: F) -> ReducerBinding
    where
        F: Fn(Option<&Value>, &Actor) -> Option<Value> + Send + Sync + 'static,
    {
        ReducerBinding::new(key, self.actor_type(), reducer)
    }
}

#[derive(Debug, Clone)]
pub struct ActorGroup {
    group: String,
}

impl ActorGroup {
    pub fn group(&self) -> &str {
        &self.group
    }

    /// An actor kind with untyped JSON payloads.
    pub fn named(&self, name: impl Into<String>) -> NamedActor {
        self.typed(name)
    }

    /// An actor kind whose arg and opts are `A` and `O`.
    pub fn typed<A, O>(&self, name: impl Into<String>) -> NamedActor<A, O> {
        NamedActor::new(self.group.clone(), name.into())
    }
}

pub struct NamedActor<A = Value, O = Value> {
    group: String,
    name: String,
    actor_type: String,
    _payload: PhantomData<fn(A, O)>,
}

impl<A, O> Clone for NamedActor<A, O> {
    fn clone(&self) -> Self {
        Self {
            group: self.group.clone(),
            name: self.name.clone(),
            actor_type: self.actor_type.clone(),
            _payload: PhantomData,
        }
    }
}

impl<A, O> fmt::Debug for NamedActor<A, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NamedActor").field(&self.actor_type).finish()
    }
}

impl<A, O> NamedActor<A, O> {
    fn new(group: String, name: String) -> Self {
        Self {
            actor_type: type_string(&group, &name, None),
            group,
            name,
            _payload: PhantomData,
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arg_of(&self, actor: &Actor) -> Option<A>
    where
        A: DeserializeOwned,
    {
        if !self.is(actor) {
            return None;
        }
        actor.arg_as().ok()
    }

    pub fn opts_of(&self, actor: &Actor) -> Option<O>
    where
        O: DeserializeOwned,
    {
        if !self.is(actor) {
            return None;
        }
        actor.opts_as().ok()
    }
}

impl<A: Serialize, O: Serialize> NamedActor<A, O> {
    pub fn with(&self, arg: A, opts: O) -> Actor {
        let arg = to_payload(&arg, &self.actor_type);
        let opts = to_payload(&opts, &self.actor_type);
        Actor::new(self.group.clone(), self.name.clone()).with_payload(arg, opts)
    }

    pub fn with_arg(&self, arg: A) -> Actor {
        let arg = to_payload(&arg, &self.actor_type);
        Actor::new(self.group.clone(), self.name.clone()).with_payload(arg, Value::Null)
    }
}

impl<A, O> ActorKind for NamedActor<A, O> {
    fn actor_type(&self) -> &str {
        &self.actor_type
    }
}

// =============================================================================
// ASYNC FACTORIES
// =============================================================================

/// Entry point for actor families with `::STARTED`/`::DONE`/`::FAILED`/`::CANCEL`
/// lifecycle variants.
pub struct AsyncActor;

impl AsyncActor {
    pub fn of(group: impl Into<String>) -> AsyncActorGroup {
        AsyncActorGroup {
            group: group.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AsyncActorGroup {
    group: String,
}

impl AsyncActorGroup {
    pub fn named(&self, name: impl Into<String>) -> AsyncNamedActor {
        self.typed(name)
    }

    pub fn typed<A, O>(&self, name: impl Into<String>) -> AsyncNamedActor<A, O> {
        AsyncNamedActor {
            base: NamedActor::new(self.group.clone(), name.into()),
        }
    }
}

pub struct AsyncNamedActor<A = Value, O = Value> {
    base: NamedActor<A, O>,
}

impl<A, O> Clone for AsyncNamedActor<A, O> {
    fn clone(&self) -> Self {
        Self {
            base: self.base.clone(),
        }
    }
}

impl<A, O> fmt::Debug for AsyncNamedActor<A, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AsyncNamedActor")
            .field(&self.base.actor_type)
            .finish()
    }
}

impl<A, O> AsyncNamedActor<A, O> {
    pub fn base(&self) -> &NamedActor<A, O> {
        &self.base
    }

    pub fn started(&self) -> StageActor {
        self.stage(AsyncStage::Started)
    }

    pub fn done(&self) -> StageActor {
        self.stage(AsyncStage::Done)
    }

    pub fn failed(&self) -> StageActor {
        self.stage(AsyncStage::Failed)
    }

    pub fn cancel(&self) -> StageActor {
        self.stage(AsyncStage::Cancel)
    }

    pub fn stage(&self, stage: AsyncStage) -> StageActor {
        StageActor {
            actor_type: type_string(&self.base.group, &self.base.name, Some(stage)),
            stage,
        }
    }

    /// True for the base actor and every lifecycle variant of this family.
    pub fn is_family(&self, actor: &Actor) -> bool {
        actor.group() == self.base.group && actor.name() == self.base.name
    }

    pub fn arg_of(&self, actor: &Actor) -> Option<A>
    where
        A: DeserializeOwned,
    {
        self.base.arg_of(actor)
    }
}

impl<A: Serialize, O: Serialize> AsyncNamedActor<A, O> {
    pub fn with(&self, arg: A, opts: O) -> Actor {
        self.base.with(arg, opts)
    }

    pub fn with_arg(&self, arg: A) -> Actor {
        self.base.with_arg(arg)
    }
}

impl<A, O> ActorKind for AsyncNamedActor<A, O> {
    fn actor_type(&self) -> &str {
        &self.base.actor_type
    }
}

/// One lifecycle stage of an async actor family, e.g. `@@request/get::DONE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageActor {
    actor_type: String,
    stage: AsyncStage,
}

impl StageActor {
    pub fn stage(&self) -> AsyncStage {
        self.stage
    }
}

impl ActorKind for StageActor {
    fn actor_type(&self) -> &str {
        &self.actor_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_strings() {
        let ping = Actor::of("app").named("ping");
        assert_eq!(ping.actor_type(), "@@app/ping");

        let get = AsyncActor::of("request").named("get");
        assert_eq!(get.started().actor_type(), "@@request/get::STARTED");
        assert_eq!(get.cancel().actor_type(), "@@request/get::CANCEL");
    }

    #[test]
    fn test_stage_variants_link_parent() {
        let get = AsyncActor::of("request").named("get");
        let base = get.with_arg(json!({ "id": 1 }));
        let done = base.done(json!({ "ok": true }));

        assert!(get.done().is(&done));
        assert!(!get.is(&done));
        assert!(get.is_family(&done));
        assert_eq!(done.parent(), Some(&base));
        assert_eq!(done.stage(), Some(AsyncStage::Done));

        let cancel = done.cancel();
        assert_eq!(cancel.arg(), &json!({ "id": 1 }));
        assert_eq!(cancel.parent(), Some(&base));
    }

    #[test]
    fn test_typed_payloads() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Login {
            user: String,
        }

        let login = Actor::of("auth").typed::<Login, ()>("login");
        let actor = login.with_arg(Login { user: "ada".into() });

        assert_eq!(actor.arg(), &json!({ "user": "ada" }));
        assert_eq!(login.arg_of(&actor), Some(Login { user: "ada".into() }));

        let other = Actor::new("auth", "logout");
        assert_eq!(login.arg_of(&other), None);
    }

    #[test]
    fn test_unrepresentable_payload_becomes_null() {
        use std::collections::HashMap;

        let mut map = HashMap::new();
        map.insert((1, 2), "tuple keys are not JSON");
        let actor = Actor::of("app").typed::<_, ()>("odd").with_arg(map);
        assert_eq!(actor.arg(), &Value::Null);
    }
}
