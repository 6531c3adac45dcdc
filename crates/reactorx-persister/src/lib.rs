//! # reactorx persister
//!
//! Best-effort snapshotting of selected store keys into key-value storage, with
//! per-key expiry.
//!
//! ```rust
//! use reactorx_core::Store;
//! use reactorx_persister::{persist, persist_register_reducer, MemoryStorage, Persister, PersisterConfig};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let persister = Persister::new(Arc::new(MemoryStorage::new()), PersisterConfig::default());
//!     let store = Store::builder().reducer(persist_register_reducer()).build();
//!     let handle = persister.connect(&store)?;
//!
//!     persist(&store, "ping", None)?;
//!     store.replace_state(store.get_state().with("ping", Some(json!(2))));
//!     handle.flush().await?;
//!
//!     assert_eq!(persister.hydrate().await?["ping"], json!(2));
//!     Ok(())
//! }
//! ```

pub mod actor;
pub mod error;
pub mod persister;
pub mod storage;

pub use actor::{persist, persist_register, persist_register_reducer, PersistKey, PERSISTER_GROUP};
pub use error::PersistError;
pub use persister::{
    persisted_keys, PersistOpts, Persister, PersisterConfig, PersisterHandle, PERSISTED_KEYS,
};
pub use storage::{MemoryStorage, RedbStorage, Storage};
