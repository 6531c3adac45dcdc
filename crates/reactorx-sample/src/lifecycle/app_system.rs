use super::error::AppError;
use crate::form::{form_reducers, FormClient};
use crate::github::github_reducers;
use reactorx_core::{compose_epics, LoggingMiddleware, Store, Subscription};
use reactorx_persister::{
    persist, persist_register_reducer, Persister, PersisterConfig, PersisterHandle, Storage,
};
use reactorx_request::{
    combine_duplicated_request_epic, create_request_epic, RequestActor, RequestEpicConfig,
    Requester, RequestingTracker, Transport,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub request: RequestEpicConfig,
    pub persister: PersisterConfig,
    /// State keys registered for persistence at startup.
    pub persisted_keys: Vec<String>,
}

impl AppConfig {
    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// A store with everything the application needs attached to it.
pub struct AppSystem {
    pub store: Store,
    pub persister: Persister,
    pub tracker: RequestingTracker,
    epic: Subscription,
    persister_handle: PersisterHandle,
}

impl AppSystem {
    /// Wires a fresh store without loading persisted state. Must be called inside a
    /// tokio runtime.
    pub fn new<T: Transport>(
        config: AppConfig,
        transport: Arc<T>,
        storage: Arc<dyn Storage>,
    ) -> Result<Self, AppError> {
        let persister = Persister::new(storage, config.persister.clone());
        Self::wire(config, transport, persister, build_store())
    }

    /// Like [`new`](Self::new), hydrating the store from storage first.
    #[instrument(skip_all, fields(persister = %config.persister.name))]
    pub async fn start<T: Transport>(
        config: AppConfig,
        transport: Arc<T>,
        storage: Arc<dyn Storage>,
    ) -> Result<Self, AppError> {
        let persister = Persister::new(storage, config.persister.clone());
        let store = build_store();
        persister.hydrate_into(&store).await?;
        Self::wire(config, transport, persister, store)
    }

    fn wire<T: Transport>(
        config: AppConfig,
        transport: Arc<T>,
        persister: Persister,
        store: Store,
    ) -> Result<Self, AppError> {
        let tracker = RequestingTracker::attach(&store);
        let epic = store.epic_on(compose_epics(
            combine_duplicated_request_epic(config.request.dedup_window()),
            create_request_epic(transport, config.request.clone()),
        ));
        let persister_handle = persister.connect(&store)?;

        for key in &config.persisted_keys {
            persist(&store, key, None)?;
        }

        info!(
            persisted_keys = config.persisted_keys.len(),
            "Application system started"
        );
        Ok(Self {
            store,
            persister,
            tracker,
            epic,
            persister_handle,
        })
    }

    pub fn requester<Req: serde::Serialize>(&self, actor: RequestActor<Req>) -> Requester<Req> {
        Requester::new(&self.store, actor)
    }

    pub fn form(&self, name: impl Into<String>) -> FormClient {
        FormClient::new(&self.store, name)
    }

    /// Waits until state changes so far are persisted.
    pub async fn flush(&self) -> Result<(), AppError> {
        Ok(self.persister_handle.flush().await?)
    }

    /// Stops the epics (aborting in-flight requests) and closes the persister.
    pub async fn shutdown(self) -> Result<(), AppError> {
        info!("Shutting down application system");
        drop(self.epic);
        self.persister_handle.close().await?;
        info!("Application system stopped");
        Ok(())
    }
}

fn build_store() -> Store {
    Store::builder()
        .reducers(form_reducers())
        .reducers(github_reducers())
        .reducer(persist_register_reducer())
        .middleware(LoggingMiddleware)
        .build()
}
