use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{dao::storage::StorageError, services::reconciler::ReconcileError};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Another caller holds the game state lease; retry later.
    #[error("game state is locked by another operation")]
    LeaseUnavailable,
    /// The lease lapsed before the mutation was written.
    #[error("lease on `{0}` expired before the game state was written")]
    LeaseExpired(String),
    /// A running game already uses a different connect code.
    #[error("connect code `{current}` cannot be replaced by `{requested}`")]
    ConnectCodeImmutable { current: String, requested: String },
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::LeaseExpired { key } => ServiceError::LeaseExpired(key),
            other => ServiceError::Unavailable(other),
        }
    }
}

impl From<ReconcileError> for ServiceError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::LeaseExpired { key } => ServiceError::LeaseExpired(key),
            ReconcileError::GameNotFound(guild_id) => {
                ServiceError::NotFound(format!("no game running in guild {guild_id}"))
            }
            ReconcileError::GuildNotFound(guild_id) => {
                ServiceError::NotFound(format!("no voice presence known for guild {guild_id}"))
            }
            ReconcileError::PresenceUnavailable(message) => {
                ServiceError::InvalidState(format!("voice presence unavailable: {message}"))
            }
            ReconcileError::Storage(source) => ServiceError::Unavailable(source),
            ReconcileError::EnforcementDispatchFailed(message) => {
                ServiceError::InvalidState(format!("enforcement dispatch failed: {message}"))
            }
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::LeaseUnavailable => AppError::Conflict(err.to_string()),
            ServiceError::LeaseExpired(_) => AppError::Internal(err.to_string()),
            ServiceError::ConnectCodeImmutable { .. } => AppError::Conflict(err.to_string()),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
