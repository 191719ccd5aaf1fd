use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Application-wide error types with appropriate HTTP status codes.
///
/// # Admission and authentication outcomes
///
/// Denials from the admission and identity machinery are ordinary values of
/// this enum, not panics:
///
/// - `RateLimited` - the client exhausted its token bucket (transient)
/// - `InvalidCredentialFormat` - the Authorization header is malformed
/// - `InvalidCredential` - the bearer token failed verification
/// - `ResolutionUnavailable` - the store failed while resolving an identity;
///   this is an infrastructure fault, never an authentication rejection
///
/// # Concurrency outcomes
///
/// `EditConflict` and `NotFound` surface verbatim so clients can implement
/// read-modify-retry loops against versioned resources.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("rate limit exceeded")]
    RateLimited,

    #[error("malformed authentication credential")]
    InvalidCredentialFormat,

    #[error("invalid authentication credential")]
    InvalidCredential,

    #[error("identity resolution unavailable: {0}")]
    ResolutionUnavailable(String),

    #[error("authentication required")]
    AuthenticationRequired,

    #[error("account not activated")]
    AccountNotActivated,

    #[error("permission denied")]
    PermissionDenied,

    #[error("edit conflict")]
    EditConflict,

    #[error("resource not found")]
    NotFound,

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("validation failed")]
    Validation(BTreeMap<String, String>),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("duplicate email")]
    DuplicateEmail,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("mail delivery failed: {0}")]
    Mail(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),

    /// The shutdown grace period elapsed before the transport drained.
    /// This is process-fatal and is never rendered as an HTTP response.
    #[error("graceful shutdown grace period elapsed before the server drained")]
    ShutdownTimeout,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full error details server-side for debugging
        // but only expose sanitized messages to clients.
        match &self {
            AppError::ResolutionUnavailable(_)
            | AppError::Database(_)
            | AppError::Mail(_)
            | AppError::Config(_)
            | AppError::Internal(_)
            | AppError::ShutdownTimeout => {
                tracing::error!(error = %self, "request failed");
            }
            _ => tracing::debug!(error = %self, "request rejected"),
        }

        let (status, message) = match &self {
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate limit exceeded, please retry later",
            ),

            AppError::InvalidCredentialFormat | AppError::InvalidCredential => {
                return with_header(
                    StatusCode::UNAUTHORIZED,
                    ("WWW-Authenticate", "Bearer"),
                    json!({"error": "invalid or missing authentication token"}),
                );
            }

            AppError::AuthenticationRequired => (
                StatusCode::UNAUTHORIZED,
                "you must be authenticated to access this resource",
            ),
            AppError::AccountNotActivated => (
                StatusCode::FORBIDDEN,
                "your user account must be activated to access this resource",
            ),
            AppError::PermissionDenied => (
                StatusCode::FORBIDDEN,
                "your user account doesn't have the necessary permissions to access this resource",
            ),

            AppError::EditConflict => (
                StatusCode::CONFLICT,
                "unable to update the record due to an edit conflict, please try again",
            ),
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                "the requested resource could not be found",
            ),

            // Timeout errors - client can retry
            AppError::Timeout(_) => (
                StatusCode::GATEWAY_TIMEOUT,
                "the operation timed out, please try again",
            ),

            AppError::Validation(errors) => {
                return envelope(StatusCode::UNPROCESSABLE_ENTITY, json!({"error": errors}));
            }
            AppError::BadRequest(msg) => {
                return envelope(StatusCode::BAD_REQUEST, json!({"error": msg}));
            }
            AppError::DuplicateEmail => {
                return envelope(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    json!({"error": {"email": "a user with this email address already exists"}}),
                );
            }

            // Infrastructure errors - never expose internal details to clients
            AppError::ResolutionUnavailable(_)
            | AppError::Database(_)
            | AppError::Mail(_)
            | AppError::Config(_)
            | AppError::Internal(_)
            | AppError::ShutdownTimeout => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "the server encountered a problem and could not process your request",
            ),
        };

        envelope(status, json!({"error": message}))
    }
}

/// Wrap a JSON value in the standard response envelope.
fn envelope(status: StatusCode, body: serde_json::Value) -> Response {
    (status, axum::Json(body)).into_response()
}

fn with_header(
    status: StatusCode,
    header: (&'static str, &'static str),
    body: serde_json::Value,
) -> Response {
    (status, [header], axum::Json(body)).into_response()
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_admission_statuses() {
        assert_eq!(
            status_of(AppError::RateLimited),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_of(AppError::InvalidCredentialFormat),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(AppError::InvalidCredential),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(AppError::AuthenticationRequired),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(AppError::AccountNotActivated),
            StatusCode::FORBIDDEN
        );
        assert_eq!(status_of(AppError::PermissionDenied), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_concurrency_statuses() {
        assert_eq!(status_of(AppError::EditConflict), StatusCode::CONFLICT);
        assert_eq!(status_of(AppError::NotFound), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_infrastructure_errors_are_sanitized() {
        let response =
            AppError::ResolutionUnavailable("connection refused to 10.0.0.1".to_string())
                .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_resolution_unavailable_is_not_an_auth_rejection() {
        // Infrastructure faults must not carry a WWW-Authenticate challenge.
        let response =
            AppError::ResolutionUnavailable("pool exhausted".to_string()).into_response();
        assert!(response.headers().get("WWW-Authenticate").is_none());
    }

    #[test]
    fn test_invalid_credential_carries_challenge() {
        let response = AppError::InvalidCredential.into_response();
        assert_eq!(
            response.headers().get("WWW-Authenticate").unwrap(),
            "Bearer"
        );
    }

    #[test]
    fn test_timeout_is_distinct_from_not_found() {
        assert_eq!(
            status_of(AppError::Timeout("database query".to_string())),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn test_validation_errors_keep_field_map() {
        let mut errors = BTreeMap::new();
        errors.insert("title".to_string(), "must be provided".to_string());
        assert_eq!(
            status_of(AppError::Validation(errors)),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
