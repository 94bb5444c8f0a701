use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::error::Category;
use thiserror::Error;

use crate::schema::{Issue, ValidationError};

/// Handler-raised error with a status from a closed set of client errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RpcError {
    status: StatusCode,
    message: String,
}

impl RpcError {
    fn new(status: StatusCode, message: &str) -> Self {
        Self {
            status,
            message: message.to_string(),
        }
    }

    pub fn bad_request() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Bad request")
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized")
    }

    pub fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN, "Forbidden")
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Not found")
    }

    pub fn method_not_allowed() -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    }

    pub fn conflict() -> Self {
        Self::new(StatusCode::CONFLICT, "Conflict")
    }

    /// Replaces the default message; the message is sent to the caller as-is.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse::new(self.message))).into_response()
    }
}

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<Issue>>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }
}

/// Everything that can end a request on the server side other than success.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("invalid input data")]
    InvalidInput(#[from] ValidationError),
    #[error("internal error: {0:#}")]
    Internal(anyhow::Error),
}

impl ServerError {
    /// Sorts a handler or context failure into a domain error or an unclassified one.
    pub fn classify(err: anyhow::Error) -> Self {
        match err.downcast::<RpcError>() {
            Ok(rpc) => Self::Rpc(rpc),
            Err(other) => Self::Internal(other),
        }
    }

    pub fn invalid_json(err: &serde_json::Error) -> Self {
        let message = match err.classify() {
            Category::Syntax | Category::Eof => err.to_string(),
            Category::Io | Category::Data => "Unable to parse JSON".to_string(),
        };
        Self::InvalidJson(message)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Rpc(err) => err.status(),
            Self::InvalidJson(_) | Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::Rpc(err) => ErrorResponse::new(err.message),
            Self::InvalidJson(message) => ErrorResponse::new(message),
            Self::InvalidInput(err) => ErrorResponse {
                error: "Invalid input data".to_string(),
                details: Some(err.issues),
            },
            Self::Internal(err) => {
                tracing::error!(error = ?err, "request failed with internal error");
                ErrorResponse::new("Internal server error")
            }
        };

        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Error)]
pub enum MountError {
    #[error("call name `{0}` is not a valid path segment")]
    InvalidCallName(String),
}
