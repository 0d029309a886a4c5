use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    /// Store did not acknowledge a write within the configured cap.
    #[error("persistence timeout after {}ms", .0.as_millis())]
    PersistenceTimeout(Duration),

    /// Transport-level failure talking to the store.
    #[error("store unreachable: {0}")]
    Unavailable(String),

    /// The store rejected a write or query.
    #[error("store rejected request: {0}")]
    Rejected(String),

    /// Query could not be built or executed.
    #[error("query error: {0}")]
    Query(String),

    /// Response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}
