use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::Serialize;

/// Standardized JSON error body returned by every handler.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Conflict")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// A reservation or sale would drive a quantity below zero.
    /// Business rule, user-facing, not retryable.
    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    /// Idempotency guard on stock entry processing. Success-equivalent
    /// for retried requests; logged as info, not error.
    #[error("Stock entry already processed: {0}")]
    AlreadyProcessed(String),

    /// Illegal invoice lifecycle transition. The record is left untouched.
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// Client-credential exchange with the capture gateway failed.
    #[error("Gateway authentication failed: {0}")]
    GatewayAuthFailure(String),

    /// Non-2xx from a gateway endpoint; status and body kept for diagnosis.
    #[error("Gateway request failed with status {status}: {body}")]
    GatewayRequestFailure { status: u16, body: String },

    /// Redirect-return signature did not verify. Never retried.
    #[error("Signature verification failed: {0}")]
    SignatureMismatch(String),

    /// The version check on a stock unit lost its race too many times.
    #[error("Concurrent modification of stock unit {0}")]
    ConcurrentModification(uuid::Uuid),

    /// Transient store failure persisted through the single retry.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    pub fn db_error(error: DbErr) -> Self {
        ServiceError::DatabaseError(error)
    }

    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) | Self::EventError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::InsufficientStock(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::AlreadyProcessed(_) | Self::InvalidStateTransition(_) => StatusCode::CONFLICT,
            Self::GatewayAuthFailure(_) | Self::GatewayRequestFailure { .. } => {
                StatusCode::BAD_GATEWAY
            }
            Self::SignatureMismatch(_) => StatusCode::UNAUTHORIZED,
            Self::ConcurrentModification(_) => StatusCode::CONFLICT,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Message suitable for HTTP responses. Internal errors return generic
    /// text so implementation details never leak to callers.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) | Self::EventError(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotency_guards_map_to_conflict() {
        assert_eq!(
            ServiceError::AlreadyProcessed("entry 7".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::InvalidStateTransition("Cancelled -> Paid".into()).status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn database_errors_are_not_leaked() {
        let err = ServiceError::DatabaseError(DbErr::Custom("secret dsn".into()));
        assert_eq!(err.response_message(), "Database error");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
