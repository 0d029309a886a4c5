pub mod comm;
pub mod init;
pub mod storage;
pub mod web;

use comm::CommError;
use config::ConfigError;
use init::InitContextError;
use storage::StorageError;
use thiserror::Error;
use tokio::task::JoinError;
use web::WebError;

pub type RGResult<T, E = RGError> = anyhow::Result<T, E>;
pub type WebResult<T, E = WebError> = anyhow::Result<T, E>;
pub type StorageResult<T, E = StorageError> = Result<T, E>;
pub type CommResult<T, E = CommError> = Result<T, E>;

#[derive(Error, Debug)]
pub enum RGError {
    #[error("{0}")]
    JoinError(#[from] JoinError),
    #[error("{0}")]
    Msg(String),
    #[error("{0}")]
    ConfigError(#[from] ConfigError),
    #[error("{0}")]
    StorageError(#[from] StorageError),
    #[error("{0}")]
    CommError(#[from] CommError),
    #[error("{0}")]
    InitContextError(#[from] InitContextError),
    #[error("{0}")]
    WebError(#[from] WebError),
    #[error("Device not found: {0}")]
    DeviceNotFound(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl From<String> for RGError {
    #[inline]
    fn from(e: String) -> Self {
        RGError::Msg(e)
    }
}

impl From<&str> for RGError {
    #[inline]
    fn from(e: &str) -> Self {
        RGError::Msg(e.to_string())
    }
}
