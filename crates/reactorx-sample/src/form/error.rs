use reactorx_core::StoreError;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum FormError {
    #[error("invalid field path: {0:?}")]
    InvalidPath(String),

    #[error("form {0} is not initialised")]
    NotInitialised(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
