//! Error taxonomy for the authentication service
//!
//! The caller-visible error set is deliberately closed. Unknown-account and
//! wrong-password failures both surface as `InvalidCredentials`, and absent,
//! expired, and revoked refresh tokens all surface as `InvalidRefreshToken`;
//! the distinguishing detail stays inside this service for audit logging and
//! never reaches the response body.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Caller-visible error type for session operations
#[derive(Error, Debug)]
pub enum AuthError {
    /// Malformed login input; rejected before any account lookup
    #[error("Invalid request: {0}")]
    InvalidCredentialsFormat(String),

    /// Unknown account or wrong password; the two are indistinguishable
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Attempt threshold exceeded or an active lockout
    #[error("Too many attempts, try again later")]
    RateLimited,

    /// Refresh token is absent, expired, or revoked
    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    /// Authenticated user no longer exists; the client must re-authenticate
    #[error("User not found")]
    NotFound,

    /// Password hashing primitive failed
    #[error("Password hashing failed: {0}")]
    Hashing(String),

    /// Token signing or entropy primitive failed
    #[error("Token signing failed: {0}")]
    Signing(String),

    /// Backing store unavailable or misbehaving
    #[error("Storage unavailable: {0}")]
    Storage(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AuthError::InvalidCredentialsFormat(msg) => (StatusCode::BAD_REQUEST, msg),
            AuthError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "Invalid email or password".to_string())
            }
            AuthError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many attempts, try again later".to_string(),
            ),
            AuthError::InvalidRefreshToken => {
                (StatusCode::UNAUTHORIZED, "Invalid refresh token".to_string())
            }
            // A vanished account after a valid access token means the client
            // has to log in again, not that the server failed.
            AuthError::NotFound => (StatusCode::UNAUTHORIZED, "User not found".to_string()),
            AuthError::Hashing(_) | AuthError::Signing(_) | AuthError::Storage(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AuthError::InvalidCredentials.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::InvalidRefreshToken.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::RateLimited.into_response().status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AuthError::InvalidCredentialsFormat("bad email".to_string())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::NotFound.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::Storage("pool exhausted".to_string())
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_infrastructure_errors_keep_detail_internally() {
        // Display carries the cause for logs; the HTTP mapping stays opaque.
        let err = AuthError::Storage("connection refused to 10.0.0.5".to_string());
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
