//! Firebase Auth REST API client.
//!
//! Email/password accounts only. Endpoint base URLs are configurable so the
//! Firebase Auth emulator can stand in for Google's servers.

use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use url::Url;

use market_pulse_core::Email;

use super::IdentityError;
use crate::config::FirebaseConfig;
use crate::models::AuthTokens;

/// An account as returned by sign-up and sign-in.
#[derive(Debug, Clone)]
pub struct ProviderAccount {
    pub uid: String,
    pub email: Email,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub tokens: AuthTokens,
}

/// Client for the Firebase Auth REST API.
#[derive(Clone)]
pub struct FirebaseAuth {
    client: reqwest::Client,
    api_key: SecretString,
    auth_url: Url,
    token_url: Url,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileUpdateRequest<'a> {
    id_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    photo_url: Option<&'a str>,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
    email: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<String>,
}

/// The secure token endpoint answers in snake case.
#[derive(Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl FirebaseAuth {
    /// Create a new client.
    #[must_use]
    pub fn new(config: &FirebaseConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            auth_url: config.auth_url.clone(),
            token_url: config.token_url.clone(),
        }
    }

    /// Create an email/password account.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::EmailExists` or `IdentityError::WeakPassword`
    /// when the provider refuses the account, or another error if the request
    /// fails.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn sign_up(
        &self,
        email: &Email,
        password: &str,
    ) -> Result<ProviderAccount, IdentityError> {
        let url = self.endpoint(&self.auth_url, "v1/accounts:signUp")?;
        let response: AccountResponse = self
            .post_json(
                url,
                &PasswordRequest {
                    email: email.as_str(),
                    password,
                    return_secure_token: true,
                },
            )
            .await?;
        response.into_account()
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::InvalidCredentials` for a wrong email or
    /// password, or another error if the request fails.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn sign_in(
        &self,
        email: &Email,
        password: &str,
    ) -> Result<ProviderAccount, IdentityError> {
        let url = self.endpoint(&self.auth_url, "v1/accounts:signInWithPassword")?;
        let response: AccountResponse = self
            .post_json(
                url,
                &PasswordRequest {
                    email: email.as_str(),
                    password,
                    return_secure_token: true,
                },
            )
            .await?;
        response.into_account()
    }

    /// Set the display name and photo of a freshly created account.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self, account), fields(email = %account.email))]
    pub async fn update_profile(
        &self,
        account: ProviderAccount,
        display_name: Option<&str>,
        photo_url: Option<&str>,
    ) -> Result<ProviderAccount, IdentityError> {
        let url = self.endpoint(&self.auth_url, "v1/accounts:update")?;
        let response: ProfileResponse = self
            .post_json(
                url,
                &ProfileUpdateRequest {
                    id_token: &account.tokens.id_token,
                    display_name,
                    photo_url,
                    return_secure_token: true,
                },
            )
            .await?;

        let tokens = match (response.id_token, response.refresh_token, response.expires_in) {
            (Some(id_token), Some(refresh_token), Some(expires_in)) => {
                AuthTokens::new(id_token, refresh_token, parse_expires_in(&expires_in)?)
            }
            _ => account.tokens,
        };

        Ok(ProviderAccount {
            display_name: response.display_name.or(account.display_name),
            photo_url: response.photo_url.or(account.photo_url),
            tokens,
            ..account
        })
    }

    /// Exchange a refresh token for a new ID token.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::TokenRevoked` if the refresh token is no
    /// longer valid, or another error if the request fails.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens, IdentityError> {
        let url = self.endpoint(&self.token_url, "v1/token")?;
        let response = self
            .client
            .post(url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;
        let response: RefreshResponse = Self::parse(response).await?;

        Ok(AuthTokens::new(
            response.id_token,
            response.refresh_token,
            parse_expires_in(&response.expires_in)?,
        ))
    }

    /// Resolve `path` against `base` and attach the API key.
    fn endpoint(&self, base: &Url, path: &str) -> Result<Url, IdentityError> {
        let mut url = base
            .join(path)
            .map_err(|e| IdentityError::Provider(format!("invalid endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("key", self.api_key.expose_secret());
        Ok(url)
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<T, IdentityError> {
        let response = self.client.post(url).json(body).send().await?;
        Self::parse(response).await
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, IdentityError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let code = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|envelope| envelope.error.message)
                .unwrap_or_else(|_| format!("HTTP {status}"));
            tracing::warn!(status = %status, code = %code, "Identity provider rejected request");
            return Err(IdentityError::from_provider_code(&code));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(error = %e, "Failed to parse identity provider response");
            IdentityError::Provider(format!("malformed response: {e}"))
        })
    }
}

impl AccountResponse {
    fn into_account(self) -> Result<ProviderAccount, IdentityError> {
        let expires_in = parse_expires_in(&self.expires_in)?;
        Ok(ProviderAccount {
            uid: self.local_id,
            email: Email::parse(&self.email)?,
            display_name: self.display_name.filter(|name| !name.is_empty()),
            photo_url: self.photo_url.filter(|url| !url.is_empty()),
            tokens: AuthTokens::new(self.id_token, self.refresh_token, expires_in),
        })
    }
}

/// Token lifetimes arrive as decimal strings (`"3600"`).
fn parse_expires_in(raw: &str) -> Result<i64, IdentityError> {
    raw.trim()
        .parse()
        .map_err(|_| IdentityError::Provider(format!("invalid token lifetime '{raw}'")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::normalize_base_url;

    fn auth(base: &str) -> FirebaseAuth {
        FirebaseAuth::new(&FirebaseConfig {
            api_key: SecretString::from("AIzaSyD-test-key"),
            auth_url: normalize_base_url(base).unwrap(),
            token_url: normalize_base_url(base).unwrap(),
        })
    }

    #[test]
    fn test_endpoint_keeps_emulator_prefix() {
        let firebase = auth("http://localhost:9099/identitytoolkit.googleapis.com");
        let url = firebase
            .endpoint(&firebase.auth_url, "v1/accounts:signUp")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:9099/identitytoolkit.googleapis.com/v1/accounts:signUp?key=AIzaSyD-test-key"
        );
    }

    #[test]
    fn test_parse_expires_in() {
        assert_eq!(parse_expires_in("3600").unwrap(), 3600);
        assert!(parse_expires_in("soon").is_err());
    }

    #[test]
    fn test_account_response_normalizes_email() {
        let response: AccountResponse = serde_json::from_str(
            r#"{"localId":"u1","email":"Buyer@Market.Example","displayName":"",
                "idToken":"t","refreshToken":"r","expiresIn":"3600"}"#,
        )
        .unwrap();
        let account = response.into_account().unwrap();
        assert_eq!(account.email.as_str(), "buyer@market.example");
        assert_eq!(account.display_name, None);
    }
}
