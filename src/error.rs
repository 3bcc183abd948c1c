//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Database Errors**: Any sqlx::Error from store operations
/// - **Configuration Errors**: Merchant credentials are absent
/// - **Signature Errors**: A callback hash does not match its fields
/// - **Gateway Errors**: The PayU call failed or timed out
/// - **Resource Errors**: Reference id unknown
/// - **Validation Errors**: Invalid request data
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    ///
    /// This wraps any sqlx::Error using the `#[from]` attribute, which
    /// automatically implements `From<sqlx::Error> for AppError`.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Merchant credentials are missing or empty.
    ///
    /// Returns HTTP 500. Nothing is persisted when this is raised.
    #[error("Payment gateway is not configured: {0}")]
    Configuration(String),

    /// Callback hash did not match the payload.
    ///
    /// Returns HTTP 400. The callback is still audited.
    #[error("Invalid callback signature")]
    InvalidSignature,

    /// Downstream gateway call failed, returned an unexpected response, or timed out.
    ///
    /// Returns HTTP 502. Callers may retry.
    #[error("Gateway request failed: {0}")]
    Gateway(String),

    /// No transaction exists for the given reference id.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    /// The String contains details about what was invalid.
    #[error("Invalid request")]
    InvalidRequest(String),
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// # Status Code Mapping
///
/// - `Configuration` → 500 Internal Server Error
/// - `InvalidSignature` → 400 Bad Request
/// - `Gateway` → 502 Bad Gateway
/// - `TransactionNotFound` → 404 Not Found
/// - `InvalidRequest` → 400 Bad Request
/// - `Database` → 500 Internal Server Error (hides details from client)
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::Configuration(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "configuration_error",
                self.to_string(),
            ),
            AppError::InvalidSignature => (
                StatusCode::BAD_REQUEST,
                "invalid_signature",
                self.to_string(),
            ),
            AppError::Gateway(_) => (StatusCode::BAD_GATEWAY, "gateway_error", self.to_string()),
            AppError::TransactionNotFound(_) => (
                StatusCode::NOT_FOUND,
                "transaction_not_found",
                self.to_string(),
            ),
            AppError::InvalidRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::Database(ref err) => {
                tracing::error!(error = %err, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
