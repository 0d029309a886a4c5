use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use crate::{comm::CommError, storage::StorageError, RGError};

#[derive(Error, Debug)]
pub enum WebError {
    #[error("BadRequest: `{0}`")]
    BadRequest(String),
    #[error("`{0}` not found")]
    NotFound(String),
    #[error("ServiceUnavailable: `{0}`")]
    ServiceUnavailable(String),
    #[error("InternalError: `{0}`")]
    InternalError(String),
    #[error("StorageError: `{0}`")]
    StorageError(#[from] StorageError),
}

impl From<std::io::Error> for WebError {
    fn from(e: std::io::Error) -> Self {
        WebError::InternalError(e.to_string())
    }
}

impl From<CommError> for WebError {
    fn from(e: CommError) -> Self {
        match e {
            CommError::InvalidCommand(msg) => WebError::BadRequest(msg),
            other => WebError::ServiceUnavailable(other.to_string()),
        }
    }
}

impl From<RGError> for WebError {
    fn from(e: RGError) -> Self {
        match e {
            RGError::DeviceNotFound(id) => WebError::NotFound(format!("device {id}")),
            RGError::InvalidArgument(msg) => WebError::BadRequest(msg),
            RGError::CommError(c) => c.into(),
            RGError::StorageError(s) => WebError::StorageError(s),
            RGError::WebError(w) => w,
            other => WebError::InternalError(other.to_string()),
        }
    }
}

impl ResponseError for WebError {
    fn error_response(&self) -> HttpResponse {
        let mut body = json!({
            "message": self.to_string()
        });
        match self {
            WebError::BadRequest(_) => {
                body["error"] = json!("Bad Request");
                HttpResponse::BadRequest().json(body)
            }
            WebError::NotFound(_) => {
                body["error"] = json!("Not Found");
                HttpResponse::NotFound().json(body)
            }
            WebError::ServiceUnavailable(_) => {
                body["error"] = json!("Service Unavailable");
                HttpResponse::ServiceUnavailable().json(body)
            }
            WebError::InternalError(_) => {
                body["error"] = json!("Internal Server Error");
                HttpResponse::InternalServerError().json(body)
            }
            WebError::StorageError(_) => {
                body["error"] = json!("Storage Error");
                HttpResponse::BadGateway().json(body)
            }
        }
    }
}
