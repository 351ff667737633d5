//! Identity error types.

use thiserror::Error;

/// Errors that can occur during identity operations.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] market_pulse_core::EmailError),

    /// Wrong email or password (the provider does not say which).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// An account with this email already exists.
    #[error("email already registered")]
    EmailExists,

    /// The provider rejected the password.
    #[error("password rejected: {0}")]
    WeakPassword(String),

    /// The refresh token is no longer valid; the user must sign in again.
    #[error("session token revoked")]
    TokenRevoked,

    /// Any other provider error code.
    #[error("identity provider error: {0}")]
    Provider(String),

    /// HTTP request to the provider failed.
    #[error("identity provider unreachable: {0}")]
    Http(#[from] reqwest::Error),

    /// Reading or writing the browser session failed.
    #[error("session store error: {0}")]
    Session(#[from] tower_sessions::session::Error),
}

impl IdentityError {
    /// Map a Firebase Auth REST error code (e.g. `EMAIL_EXISTS` or
    /// `WEAK_PASSWORD : Password should be at least 6 characters`).
    #[must_use]
    pub fn from_provider_code(message: &str) -> Self {
        let (code, detail) = message
            .split_once(':')
            .map_or((message.trim(), ""), |(code, detail)| {
                (code.trim(), detail.trim())
            });

        match code {
            "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS"
            | "USER_DISABLED" => Self::InvalidCredentials,
            "EMAIL_EXISTS" => Self::EmailExists,
            "WEAK_PASSWORD" => Self::WeakPassword(detail.to_string()),
            "TOKEN_EXPIRED" | "INVALID_REFRESH_TOKEN" | "USER_NOT_FOUND"
            | "INVALID_ID_TOKEN" => Self::TokenRevoked,
            other => Self::Provider(other.to_string()),
        }
    }

    /// Message safe to show on the sign-in and sign-up forms.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidEmail(_) => "Please enter a valid email address.",
            Self::InvalidCredentials => "Incorrect email or password.",
            Self::EmailExists => "An account with this email already exists.",
            Self::WeakPassword(_) => "Please choose a stronger password.",
            Self::TokenRevoked => "Your session has expired. Please sign in again.",
            Self::Provider(_) | Self::Http(_) | Self::Session(_) => {
                "Something went wrong. Please try again."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_codes() {
        assert!(matches!(
            IdentityError::from_provider_code("INVALID_LOGIN_CREDENTIALS"),
            IdentityError::InvalidCredentials
        ));
        assert!(matches!(
            IdentityError::from_provider_code("EMAIL_EXISTS"),
            IdentityError::EmailExists
        ));
        assert!(matches!(
            IdentityError::from_provider_code("TOKEN_EXPIRED"),
            IdentityError::TokenRevoked
        ));
        assert!(matches!(
            IdentityError::from_provider_code("QUOTA_EXCEEDED"),
            IdentityError::Provider(code) if code == "QUOTA_EXCEEDED"
        ));
    }

    #[test]
    fn test_weak_password_keeps_detail() {
        let error = IdentityError::from_provider_code(
            "WEAK_PASSWORD : Password should be at least 6 characters",
        );
        assert!(matches!(
            error,
            IdentityError::WeakPassword(detail) if detail == "Password should be at least 6 characters"
        ));
    }
}
