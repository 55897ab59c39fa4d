//! API error types and responses.
//!
//! Every error renders as a flat `{"error": "<message>"}` body. Internal
//! details are logged, never returned.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use iris_billing_store::StoreError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Conflict - resource already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Webhook arrived without a signature header.
    #[error("missing webhook signature")]
    MissingSignature,

    /// Webhook failed authenticity checks or could not be decoded.
    #[error("invalid webhook signature")]
    InvalidSignature,

    /// Checkout session has not been paid.
    #[error("payment not completed")]
    PaymentIncomplete,

    /// An authenticated webhook could not be processed.
    #[error("webhook processing failed")]
    WebhookFailed,

    /// A checkout session could not be looked up.
    #[error("session verification failed")]
    VerificationFailed,

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// External service error.
    #[error("external service error: {0}")]
    ExternalService(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::MissingSignature => (StatusCode::BAD_REQUEST, "No signature".to_string()),
            Self::InvalidSignature => (StatusCode::BAD_REQUEST, "Invalid signature".to_string()),
            Self::PaymentIncomplete => {
                (StatusCode::BAD_REQUEST, "Payment not completed".to_string())
            }
            Self::WebhookFailed => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Webhook processing failed".to_string(),
            ),
            Self::VerificationFailed => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to verify session".to_string(),
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
            Self::ExternalService(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { entity, .. } => Self::Conflict(format!("{entity} already exists")),
            StoreError::Database(msg) | StoreError::Serialization(msg) => Self::Internal(msg),
        }
    }
}
