//! Error types for the storage sync layer.
//!
//! Internal operations return [`StoreError`] / [`RemoteError`]. The public data API
//! never hands these to callers: failures are logged and collapsed into `bool`,
//! `Option` or empty results, and the FFI boundary converts them into
//! [`AppResponse`](crate::app_response::AppResponse).

use thiserror::Error;

/// Failure of an operation against the local store or while encoding data for it.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Local store error: {0}")]
    Local(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<lmdb::Error> for StoreError {
    fn from(err: lmdb::Error) -> Self {
        StoreError::Local(format!("LMDB error: {err}"))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Local(format!("IO error: {err}"))
    }
}

/// Failure reported by a [`RemoteStore`](crate::remote_store::RemoteStore).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),

    #[error("Remote store rejected the request: {0}")]
    Rejected(String),

    #[error("Could not decode remote document: {0}")]
    Decode(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
pub type RemoteResult<T> = Result<T, RemoteError>;
