//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use warden_core::error::DomainError;

/// Startup and runtime errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A configuration source is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Tracing or exporter setup failed.
    #[error("telemetry error: {0}")]
    Telemetry(String),

    /// Database connection, pool, or migration error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// HTTP-layer wrapper around `DomainError` that implements `IntoResponse`.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self.0 {
            DomainError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "invalid_argument"),
            DomainError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            DomainError::AlreadyExists(_) => (StatusCode::CONFLICT, "already_exists"),
            DomainError::ConcurrencyConflict { .. } => {
                (StatusCode::CONFLICT, "concurrency_conflict")
            }
            DomainError::Internal(_) => {
                tracing::error!(error = %self.0, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };

        let body = ErrorBody {
            error: error_code,
            message: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use warden_core::event::AggregateType;

    fn status_of(err: DomainError) -> StatusCode {
        let response = ApiError(err).into_response();
        response.status()
    }

    #[test]
    fn test_invalid_argument_maps_to_400() {
        assert_eq!(
            status_of(DomainError::InvalidArgument("no filters".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_not_found_maps_to_404() {
        assert_eq!(
            status_of(DomainError::NotFound("user u1".into())),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_already_exists_maps_to_409() {
        assert_eq!(
            status_of(DomainError::AlreadyExists("Errors.User.AlreadyExists".into())),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_concurrency_conflict_maps_to_409() {
        assert_eq!(
            status_of(DomainError::ConcurrencyConflict {
                aggregate_type: AggregateType::from("user"),
                aggregate_id: "u1".into(),
                expected: 1,
            }),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_internal_maps_to_500() {
        assert_eq!(
            status_of(DomainError::Internal("db down".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
