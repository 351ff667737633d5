//! Unified error handling with Sentry integration.
//!
//! Route handlers return `Result<T, AppError>`. Server-side failures are
//! captured to Sentry before responding; clients never see internal details.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::api::ApiError;
use crate::identity::IdentityError;

/// Application-level error type for the web application.
#[derive(Debug, Error)]
pub enum AppError {
    /// Backend API call failed.
    #[error("Backend error: {0}")]
    Api(#[from] ApiError),

    /// Identity provider or session operation failed.
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    /// Session store failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::Api(ApiError::NotFound(_)) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Api(ApiError::Unauthorized(_)) => StatusCode::FORBIDDEN,
            Self::Api(_) => StatusCode::BAD_GATEWAY,
            Self::Identity(
                IdentityError::InvalidCredentials | IdentityError::TokenRevoked,
            ) => StatusCode::UNAUTHORIZED,
            Self::Identity(IdentityError::EmailExists) => StatusCode::CONFLICT,
            Self::Identity(
                IdentityError::WeakPassword(_) | IdentityError::InvalidEmail(_),
            )
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Identity(
                IdentityError::Provider(_) | IdentityError::Http(_) | IdentityError::Session(_),
            ) => StatusCode::BAD_GATEWAY,
            Self::Session(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Session(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::Api(ApiError::NotFound(_)) => "Not found".to_string(),
            Self::Api(ApiError::Unauthorized(_)) => "You do not have access to this".to_string(),
            Self::Api(_) => "External service error".to_string(),
            Self::Identity(err) => err.user_message().to_string(),
            Self::NotFound(_) | Self::BadRequest(_) => self.to_string(),
        };

        (status, message).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context for the signed-in identity.
pub fn set_sentry_user(uid: &str, email: &str) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(uid.to_string()),
            email: Some(email.to_string()),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on sign-out to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("product-123".to_string());
        assert_eq!(err.to_string(), "Not found: product-123");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Api(ApiError::NotFound("p1".to_string()))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Api(ApiError::Status {
                status: 500,
                message: "down".to_string()
            })),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            get_status(AppError::Identity(IdentityError::EmailExists)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
