use crate::error::PersistError;
use crate::persister::{PersistOpts, PERSISTED_KEYS};
use reactorx_core::{Actor, ActorKind, NamedActor, ReducerBinding, Store};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

pub const PERSISTER_GROUP: &str = "persister";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistKey {
    pub key: String,
}

/// `@@persister/register`: adds a key to the persisted-key registry.
pub fn persist_register() -> NamedActor<PersistKey, PersistOpts> {
    Actor::of(PERSISTER_GROUP).typed("register")
}

/// Reducer for `@@persister/register` on [`PERSISTED_KEYS`].
pub fn persist_register_reducer() -> ReducerBinding {
    let register = persist_register();
    register.clone().effect_on(PERSISTED_KEYS, move |current, actor| {
        let mut keys = match current {
            Some(Value::Object(keys)) => keys.clone(),
            _ => Map::new(),
        };
        let Some(PersistKey { key }) = register.arg_of(actor) else {
            return current.cloned();
        };
        let mut opts = register.opts_of(actor).unwrap_or_default();
        opts.key = key.clone();
        keys.insert(key, serde_json::to_value(opts).unwrap_or(Value::Null));
        Some(Value::Object(keys))
    })
}

/// Registers `key` for persistence unless it already is. Returns whether an
/// actor was dispatched.
pub fn persist(store: &Store, key: &str, opts: Option<PersistOpts>) -> Result<bool, PersistError> {
    let registered = store
        .get_state()
        .get(PERSISTED_KEYS)
        .and_then(|keys| keys.get(key))
        .is_some();
    if registered {
        return Ok(false);
    }

    debug!(key, "Registering persisted key");
    persist_register()
        .with(PersistKey { key: key.to_string() }, opts.unwrap_or_default())
        .invoke(store)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_register_reducer() {
        let store = Store::builder().reducer(persist_register_reducer()).build();

        assert!(persist(&store, "ping", None).unwrap());
        assert!(persist(&store, "auth", Some(PersistOpts::expires_in(60))).unwrap());
        assert!(!persist(&store, "ping", None).unwrap());

        assert_eq!(
            store.get_state().get(PERSISTED_KEYS),
            Some(&json!({
                "ping": { "key": "ping" },
                "auth": { "key": "auth", "expiresIn": 60 },
            }))
        );
    }

    #[test]
    fn test_actor_type() {
        assert_eq!(persist_register().actor_type(), "@@persister/register");
    }
}
