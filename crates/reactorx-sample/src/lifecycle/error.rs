use crate::form::FormError;
use reactorx_core::StoreError;
use reactorx_persister::PersistError;
use reactorx_request::RequestError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Form(#[from] FormError),
}
