//! MarketPulse backend REST API client.
//!
//! # Architecture
//!
//! - The backend is the source of truth for users, roles, products, ads,
//!   carts, wishlists, orders and vendor applications - NO local storage
//! - Requests are authorized with the caller's Firebase ID token
//! - Endpoints are grouped by concern: [`accounts`] (roles, users, vendor
//!   applications), [`catalog`] (products, price history, ads) and
//!   [`commerce`] (cart, wishlist, orders, payments)
//!
//! # Example
//!
//! ```rust,ignore
//! use market_pulse_web::api::ApiClient;
//!
//! let client = ApiClient::new(&config.api);
//!
//! let role = client.user_role(&identity.credentials()).await?;
//! let page = client.products(&ProductQuery::approved(1, 9)).await?;
//! ```

pub mod accounts;
pub mod catalog;
pub mod commerce;
pub mod types;

use std::sync::Arc;

use reqwest::{Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

use market_pulse_core::Email;

use crate::config::ApiConfig;

/// Longest slice of a response body kept in errors and logs.
const MAX_BODY_SNIPPET: usize = 300;

/// Errors that can occur when calling the backend API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend rejected the caller's credentials.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other non-success status.
    #[error("Backend returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configured base URL cannot carry path segments.
    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),
}

/// Who a backend call is made on behalf of.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Requester email; most endpoints are keyed by it.
    pub email: Email,
    /// Firebase ID token, sent as a bearer token.
    pub token: SecretString,
}

/// Client for the MarketPulse backend REST API.
///
/// Cheaply cloneable; clones share one connection pool.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client.
    #[must_use]
    pub fn new(config: &ApiConfig) -> Self {
        Self {
            inner: Arc::new(ApiClientInner {
                client: reqwest::Client::new(),
                base_url: config.base_url.clone(),
            }),
        }
    }

    /// Build an endpoint URL from path segments (each segment is escaped).
    fn endpoint<S: AsRef<str>>(&self, segments: &[S]) -> Result<Url, ApiError> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidUrl(self.inner.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Start a request, attaching the bearer token when credentials are given.
    fn request(
        &self,
        method: Method,
        url: Url,
        credentials: Option<&Credentials>,
    ) -> RequestBuilder {
        let builder = self.inner.client.request(method, url);
        match credentials {
            Some(credentials) => builder.bearer_auth(credentials.token.expose_secret()),
            None => builder,
        }
    }

    /// Send a request and parse the JSON response body.
    async fn execute<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let body = self.send(builder).await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %snippet(&body),
                "Failed to parse backend response"
            );
            ApiError::Parse(e)
        })
    }

    /// Send a request whose response body is not needed.
    async fn execute_empty(&self, builder: RequestBuilder) -> Result<(), ApiError> {
        self.send(builder).await.map(drop)
    }

    /// Send a request, map non-success statuses to errors, return the body.
    async fn send(&self, builder: RequestBuilder) -> Result<String, ApiError> {
        let response = builder.send().await?;
        let status = response.status();

        // Get response body as text first for better error diagnostics
        let body = response.text().await?;

        if status.is_success() {
            return Ok(body);
        }

        let message = error_message(&body);
        tracing::warn!(
            status = %status,
            message = %message,
            "Backend API returned non-success status"
        );

        Err(match status {
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                ApiError::Unauthorized(message)
            }
            reqwest::StatusCode::NOT_FOUND => ApiError::NotFound(message),
            _ => ApiError::Status {
                status: status.as_u16(),
                message,
            },
        })
    }
}

/// Pull a human-readable message out of an error body.
///
/// The backend answers errors with `{ "message": "..." }` (or `error`); fall
/// back to a prefix of the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .or_else(|| value.get("error"))
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| snippet(body))
}

fn snippet(body: &str) -> String {
    body.chars().take(MAX_BODY_SNIPPET).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::normalize_base_url;

    fn client(base: &str) -> ApiClient {
        ApiClient::new(&ApiConfig {
            base_url: normalize_base_url(base).unwrap(),
        })
    }

    #[test]
    fn test_endpoint_appends_and_escapes_segments() {
        let api = client("http://localhost:5000/api");
        let url = api.endpoint(&["carts", "a b@market.example", "line/1"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:5000/api/carts/a%20b@market.example/line%2F1"
        );
    }

    #[test]
    fn test_error_message_prefers_json_message() {
        assert_eq!(error_message(r#"{"message":"out of stock"}"#), "out of stock");
        assert_eq!(error_message(r#"{"error":"bad token"}"#), "bad token");
        assert_eq!(error_message("Gateway Timeout"), "Gateway Timeout");
    }

    #[test]
    fn test_error_message_truncates_raw_body() {
        let body = "x".repeat(1000);
        assert_eq!(error_message(&body).len(), MAX_BODY_SNIPPET);
    }
}
