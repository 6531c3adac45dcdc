use reactorx_core::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("persister needs a tokio runtime to write")]
    NoRuntime,

    #[error("persister writer has stopped")]
    WriterClosed,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PersistError {
    pub(crate) fn storage(err: impl std::fmt::Display) -> Self {
        PersistError::Storage(err.to_string())
    }
}
