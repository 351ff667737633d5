//! Session-related types.
//!
//! Types stored in the session for authentication state.

use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use market_pulse_core::Email;

use crate::api::Credentials;

/// Tokens are treated as expired this long before their actual expiry, so a
/// backend call made right after the check still carries a valid token.
const EXPIRY_SKEW_SECONDS: i64 = 60;

/// Session-stored identity, as returned by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentIdentity {
    /// Identity provider user ID.
    pub uid: String,
    /// User's email address (backend key for roles, carts and orders).
    pub email: Email,
    /// Display name, if the user set one.
    pub display_name: Option<String>,
    /// Profile photo URL, if any.
    pub photo_url: Option<String>,
    /// Provider tokens.
    pub tokens: AuthTokens,
}

impl CurrentIdentity {
    /// Name to greet the user with.
    #[must_use]
    pub fn greeting_name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| self.email.local_part())
    }

    /// Credentials for backend API calls on behalf of this identity.
    #[must_use]
    pub fn credentials(&self) -> Credentials {
        Credentials {
            email: self.email.clone(),
            token: SecretString::from(self.tokens.id_token.clone()),
        }
    }
}

/// Identity provider tokens.
///
/// Implements `Debug` manually to redact the tokens.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthTokens {
    /// Short-lived ID token, sent to the backend as a bearer token.
    pub id_token: String,
    /// Long-lived refresh token.
    pub refresh_token: String,
    /// When `id_token` expires.
    pub expires_at: DateTime<Utc>,
}

impl AuthTokens {
    /// Build tokens from a provider response carrying a lifetime in seconds.
    #[must_use]
    pub fn new(id_token: String, refresh_token: String, expires_in_secs: i64) -> Self {
        Self {
            id_token,
            refresh_token,
            expires_at: Utc::now() + Duration::seconds(expires_in_secs),
        }
    }

    /// Whether the ID token is expired (or about to expire) at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_SKEW_SECONDS) >= self.expires_at
    }
}

impl std::fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthTokens")
            .field("id_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Session state as seen by a route guard.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// The authenticated identity, if any.
    pub identity: Option<CurrentIdentity>,
    /// True while the identity is still being confirmed (token refresh in
    /// flight). No navigation decision is made in this state.
    pub is_resolving: bool,
}

impl SessionState {
    /// No one is signed in.
    #[must_use]
    pub const fn signed_out() -> Self {
        Self {
            identity: None,
            is_resolving: false,
        }
    }

    /// `identity` is signed in and confirmed.
    #[must_use]
    pub const fn signed_in(identity: CurrentIdentity) -> Self {
        Self {
            identity: Some(identity),
            is_resolving: false,
        }
    }

    /// The session is still being confirmed.
    #[must_use]
    pub const fn resolving() -> Self {
        Self {
            identity: None,
            is_resolving: true,
        }
    }
}

/// Session keys for authentication data.
pub mod keys {
    /// Key for storing the current signed-in identity.
    pub const CURRENT_IDENTITY: &str = "current_identity";
}
