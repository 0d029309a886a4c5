use std::time::Duration;
use thiserror::Error;

/// Typed failure raised at the driver boundary (connection manager, reader, writer).
///
/// Protocol-library errors never leave the driver as anything else.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommError {
    /// Session could not be (re)established, or the transport broke underneath it.
    #[error("Connect failed: {0}")]
    ConnectFailed(String),
    /// Connect attempt or register transaction exceeded its bound.
    #[error("Communication timeout after {}ms", .0.as_millis())]
    Timeout(Duration),
    /// A single register operation was rejected on an otherwise healthy session.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),
    /// Caller referenced an unknown device or register, or an unencodable value.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}

impl CommError {
    /// True when the session can no longer be trusted and must be re-established.
    #[inline]
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, CommError::ConnectFailed(_) | CommError::Timeout(_))
    }
}
