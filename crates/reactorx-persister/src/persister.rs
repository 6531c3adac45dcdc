//! # Persister
//!
//! Snapshots selected top-level state keys into a [`Storage`] and loads them back.
//!
//! Which keys are persisted is itself state: the reserved key [`PERSISTED_KEYS`]
//! maps each persisted key to its [`PersistOpts`] (see [`crate::persist`]). Once
//! [`Persister::connect`]ed, every state change that touches a registered key is
//! written as `{ "values": <sub-state>, "expiredAt": <epoch millis> }`; a key that
//! disappears from the state is removed from storage.
//!
//! ## Write ordering
//!
//! Writes go through a single writer task fed by a channel, so a later snapshot is
//! never overtaken by an earlier one. [`PersisterHandle::flush`] waits until
//! everything queued so far has reached storage.
//!
//! ## Expiry
//!
//! A stored value is returned by [`Persister::load`] only while `expiredAt` is not in
//! the past. Expiry is measured with the persister's clock (wall clock by default,
//! replaceable with [`Persister::with_clock`]).

use crate::error::PersistError;
use crate::storage::Storage;
use reactorx_core::{State, Store, Subscription};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// State key holding the persisted-key registry.
pub const PERSISTED_KEYS: &str = "$$persistedKeys";

const DAY_SECS: u64 = 24 * 3600;

type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

// =============================================================================
// CONFIG
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PersisterConfig {
    /// Storage namespace (the redb table name).
    pub name: String,
    /// Lifetime of a saved value when its key has no `expiresIn`.
    pub default_expires_in_secs: u64,
}

impl Default for PersisterConfig {
    fn default() -> Self {
        Self {
            name: "reactorx".to_string(),
            default_expires_in_secs: DAY_SECS,
        }
    }
}

/// Per-key options kept under [`PERSISTED_KEYS`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistOpts {
    #[serde(default)]
    pub key: String,
    /// Seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

impl PersistOpts {
    pub fn expires_in(secs: u64) -> Self {
        Self {
            key: String::new(),
            expires_in: Some(secs),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredValue {
    values: Value,
    expired_at: i64,
}

/// Reads the registry from a state snapshot. Malformed entries count as default opts.
pub fn persisted_keys(state: &State) -> BTreeMap<String, PersistOpts> {
    let Some(Value::Object(entries)) = state.get(PERSISTED_KEYS) else {
        return BTreeMap::new();
    };
    entries
        .iter()
        .map(|(key, opts)| {
            let opts = serde_json::from_value(opts.clone()).unwrap_or_default();
            (key.clone(), opts)
        })
        .collect()
}

// =============================================================================
// PERSISTER
// =============================================================================

#[derive(Clone)]
pub struct Persister {
    inner: Arc<PersisterInner>,
}

struct PersisterInner {
    storage: Arc<dyn Storage>,
    config: PersisterConfig,
    clock: Clock,
}

impl std::fmt::Debug for Persister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persister")
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Persister {
    pub fn new(storage: Arc<dyn Storage>, config: PersisterConfig) -> Self {
        Self {
            inner: Arc::new(PersisterInner {
                storage,
                config,
                clock: Arc::new(|| chrono::Utc::now().timestamp_millis()),
            }),
        }
    }

    /// Replaces the clock used for `expiredAt` (epoch milliseconds).
    pub fn with_clock<F>(self, clock: F) -> Self
    where
        F: Fn() -> i64 + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(PersisterInner {
                storage: Arc::clone(&self.inner.storage),
                config: self.inner.config.clone(),
                clock: Arc::new(clock),
            }),
        }
    }

    pub fn config(&self) -> &PersisterConfig {
        &self.inner.config
    }

    fn now(&self) -> i64 {
        (self.inner.clock)()
    }

    // =========================================================================
    // Storage operations
    // =========================================================================

    /// The stored value of `key`, if present and not expired.
    pub async fn load(&self, key: &str) -> Result<Option<Value>, PersistError> {
        let Some(raw) = self.inner.storage.get(key).await? else {
            return Ok(None);
        };
        let stored: StoredValue = match serde_json::from_value(raw) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(key, error = %e, "Ignoring malformed persisted value");
                return Ok(None);
            }
        };
        if stored.expired_at >= self.now() {
            Ok(Some(stored.values))
        } else {
            debug!(key, expired_at = stored.expired_at, "Persisted value expired");
            Ok(None)
        }
    }

    pub async fn save(
        &self,
        key: &str,
        values: Value,
        opts: Option<&PersistOpts>,
    ) -> Result<(), PersistError> {
        // zero means "not set"
        let expires_in = opts
            .and_then(|opts| opts.expires_in)
            .filter(|secs| *secs > 0)
            .unwrap_or(self.inner.config.default_expires_in_secs);
        let lifetime_ms = i64::try_from(expires_in)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000);
        let stored = StoredValue {
            values,
            expired_at: self.now().saturating_add(lifetime_ms),
        };
        self.inner
            .storage
            .set(key, serde_json::to_value(stored)?)
            .await
    }

    pub async fn remove(&self, key: &str) -> Result<(), PersistError> {
        self.inner.storage.remove(key).await
    }

    /// Saves each entry with the options registered for its key in `registry`.
    pub async fn save_all(
        &self,
        entries: Vec<(String, Value)>,
        registry: &BTreeMap<String, PersistOpts>,
    ) -> Result<(), PersistError> {
        for (key, values) in entries {
            self.save(&key, values, registry.get(&key)).await?;
        }
        Ok(())
    }

    pub async fn remove_all(&self, keys: &[String]) -> Result<(), PersistError> {
        for key in keys {
            self.remove(key).await?;
        }
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), PersistError> {
        self.inner.storage.clear().await
    }

    // =========================================================================
    // Hydration
    // =========================================================================

    /// Loads every registered key that is still stored and unexpired.
    #[instrument(skip(self), fields(name = %self.inner.config.name))]
    pub async fn hydrate(&self) -> Result<Map<String, Value>, PersistError> {
        let registry = self.load_registry().await?;
        let mut data = Map::new();
        for key in registry.keys() {
            if let Some(values) = self.load(key).await? {
                data.insert(key.clone(), values);
            }
        }
        info!(keys = data.len(), "Hydrated persisted state");
        Ok(data)
    }

    /// Hydrates and writes the loaded keys (and their registry entries) into
    /// `store`. Returns the loaded data.
    pub async fn hydrate_into(&self, store: &Store) -> Result<Map<String, Value>, PersistError> {
        let data = self.hydrate().await?;
        let registry = self.load_registry().await?;

        let mut state = store.get_state();
        let mut keys = match state.get(PERSISTED_KEYS) {
            Some(Value::Object(keys)) => keys.clone(),
            _ => Map::new(),
        };
        for (key, values) in &data {
            state = state.with(key, Some(values.clone()));
            if let Some(opts) = registry.get(key) {
                keys.entry(key.clone())
                    .or_insert(serde_json::to_value(opts)?);
            }
        }
        if !keys.is_empty() {
            state = state.with(PERSISTED_KEYS, Some(Value::Object(keys)));
        }
        store.replace_state(state);
        Ok(data)
    }

    async fn load_registry(&self) -> Result<BTreeMap<String, PersistOpts>, PersistError> {
        let Some(Value::Object(entries)) = self.load(PERSISTED_KEYS).await? else {
            return Ok(BTreeMap::new());
        };
        Ok(entries
            .into_iter()
            .map(|(key, opts)| (key, serde_json::from_value(opts).unwrap_or_default()))
            .collect())
    }

    // =========================================================================
    // Connect
    // =========================================================================

    /// Follows `store` and mirrors registered keys into storage until the handle
    /// is dropped or closed. Must be called inside a tokio runtime.
    pub fn connect(&self, store: &Store) -> Result<PersisterHandle, PersistError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| PersistError::NoRuntime)?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let writer = runtime.spawn(run_writer(self.clone(), receiver));

        let previous: Mutex<Option<State>> = Mutex::new(None);
        let queue = sender.clone();
        let subscription = store.subscribe(move |next: State| {
            let mut previous = previous.lock().unwrap_or_else(PoisonError::into_inner);
            let batch = diff(previous.as_ref(), &next);
            *previous = Some(next);
            drop(previous);

            if batch.is_empty() {
                return;
            }
            if queue.send(WriterCommand::Write(batch)).is_err() {
                warn!("Persister writer is gone, dropping snapshot");
            }
        });

        info!(name = %self.inner.config.name, "Persister connected");
        Ok(PersisterHandle {
            sender,
            writer: Some(writer),
            _subscription: subscription,
        })
    }
}

/// Changes between two snapshots, restricted to registered keys and the registry.
#[derive(Debug, Default, PartialEq)]
struct WriteBatch {
    save: Vec<(String, Value)>,
    remove: Vec<String>,
    registry: BTreeMap<String, PersistOpts>,
}

impl WriteBatch {
    fn is_empty(&self) -> bool {
        self.save.is_empty() && self.remove.is_empty()
    }
}

/// A key registered since `previous` is saved even if its value did not change.
fn diff(previous: Option<&State>, next: &State) -> WriteBatch {
    let registry = persisted_keys(next);
    let known = previous.map(persisted_keys).unwrap_or_default();
    let mut batch = WriteBatch::default();

    let keys = registry
        .keys()
        .map(String::as_str)
        .chain(std::iter::once(PERSISTED_KEYS));
    for key in keys {
        match next.get(key) {
            Some(value) => {
                let tracked = key == PERSISTED_KEYS || known.contains_key(key);
                let unchanged =
                    tracked && previous.is_some_and(|prev| prev.same_entry(next, key));
                if !unchanged {
                    batch.save.push((key.to_string(), value.clone()));
                }
            }
            None => {
                if previous.is_some_and(|prev| prev.contains_key(key)) {
                    batch.remove.push(key.to_string());
                }
            }
        }
    }
    batch.registry = registry;
    batch
}

// =============================================================================
// WRITER
// =============================================================================

enum WriterCommand {
    Write(WriteBatch),
    Flush(oneshot::Sender<()>),
}

async fn run_writer(persister: Persister, mut commands: mpsc::UnboundedReceiver<WriterCommand>) {
    while let Some(command) = commands.recv().await {
        match command {
            WriterCommand::Write(batch) => {
                debug!(
                    saved = batch.save.len(),
                    removed = batch.remove.len(),
                    "Persisting snapshot"
                );
                if let Err(e) = persister.save_all(batch.save, &batch.registry).await {
                    warn!(error = %e, "Failed to save persisted keys");
                }
                if let Err(e) = persister.remove_all(&batch.remove).await {
                    warn!(error = %e, "Failed to remove persisted keys");
                }
            }
            WriterCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Persister writer stopped");
}

/// Keeps a persister connected to a store.
pub struct PersisterHandle {
    sender: mpsc::UnboundedSender<WriterCommand>,
    writer: Option<JoinHandle<()>>,
    _subscription: Subscription,
}

impl PersisterHandle {
    /// Waits until every snapshot queued before this call is written.
    pub async fn flush(&self) -> Result<(), PersistError> {
        let (done, flushed) = oneshot::channel();
        self.sender
            .send(WriterCommand::Flush(done))
            .map_err(|_| PersistError::WriterClosed)?;
        flushed.await.map_err(|_| PersistError::WriterClosed)
    }

    /// Stops following the store and waits for pending writes.
    pub async fn close(mut self) -> Result<(), PersistError> {
        self.flush().await?;
        let writer = self.writer.take();
        drop(self);
        if let Some(writer) = writer {
            writer.await.map_err(PersistError::storage)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for PersisterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersisterHandle")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}
