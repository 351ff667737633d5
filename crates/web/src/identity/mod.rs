//! Session provider.
//!
//! Wraps the Firebase identity provider and the per-browser session:
//!
//! - Sign-up, sign-in and sign-out update the session and publish an
//!   [`AuthEvent`] to every subscriber
//! - [`SessionProvider::current`] reads the session, refreshing an expired ID
//!   token first; while the refresh is outstanding the state is "resolving"
//! - [`SessionProvider::subscribe`] returns a [`Subscription`] that removes
//!   the listener when disposed or dropped

mod error;
pub mod firebase;

pub use error::IdentityError;
pub use firebase::{FirebaseAuth, ProviderAccount};

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use tower_sessions::Session;
use tracing::instrument;

use market_pulse_core::Email;

use crate::api::ApiClient;
use crate::api::types::NewUser;
use crate::models::{CurrentIdentity, SessionState, session_keys};

/// A change of who is signed in, delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// The identity signed in (or signed up).
    SignedIn(Email),
    /// The identity signed out.
    SignedOut(Email),
    /// The identity's refresh token was rejected; it is signed out.
    TokenInvalidated(Email),
}

impl AuthEvent {
    /// The identity the event is about.
    #[must_use]
    pub const fn email(&self) -> &Email {
        match self {
            Self::SignedIn(email) | Self::SignedOut(email) | Self::TokenInvalidated(email) => {
                email
            }
        }
    }
}

type Listener = Arc<dyn Fn(AuthEvent) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Listener)>>,
}

impl Listeners {
    fn snapshot(&self) -> Vec<Listener> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }

    fn remove(&self, id: u64) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(entry, _)| *entry != id);
    }
}

/// Handle returned by [`SessionProvider::subscribe`].
///
/// The listener stays registered until the subscription is disposed or
/// dropped.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    listeners: Weak<Listeners>,
}

impl Subscription {
    /// Unsubscribe.
    pub fn dispose(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.remove(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Registration details collected by the sign-up form.
#[derive(Debug, Clone, Default)]
pub struct Profile {
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

/// Identity provider plus per-browser session handling.
///
/// Cheaply cloneable; clones share subscribers.
#[derive(Clone)]
pub struct SessionProvider {
    firebase: FirebaseAuth,
    api: ApiClient,
    listeners: Arc<Listeners>,
}

impl SessionProvider {
    /// Create a new provider.
    #[must_use]
    pub fn new(firebase: FirebaseAuth, api: ApiClient) -> Self {
        Self {
            firebase,
            api,
            listeners: Arc::new(Listeners::default()),
        }
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Register a listener for auth-state changes.
    pub fn subscribe<F, Fut>(&self, listener: F) -> Subscription
    where
        F: Fn(AuthEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.listeners.next_id.fetch_add(1, Ordering::Relaxed);
        let listener: Listener =
            Arc::new(move |event| -> BoxFuture<'static, ()> { Box::pin(listener(event)) });
        self.listeners
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));

        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Deliver an event to every listener and wait for them to finish.
    pub async fn publish(&self, event: AuthEvent) {
        tracing::debug!(event = ?event, "Publishing auth event");
        let pending = self
            .listeners
            .snapshot()
            .into_iter()
            .map(|listener| listener(event.clone()));
        futures::future::join_all(pending).await;
    }

    // =========================================================================
    // Auth actions
    // =========================================================================

    /// Create an account, register it with the backend and sign it in.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider refuses the account or the session
    /// cannot be written.
    #[instrument(skip(self, session, password, profile), fields(email = %email))]
    pub async fn sign_up(
        &self,
        session: &Session,
        email: &Email,
        password: &str,
        profile: Profile,
    ) -> Result<CurrentIdentity, IdentityError> {
        let mut account = self.firebase.sign_up(email, password).await?;

        if profile.display_name.is_some() || profile.photo_url.is_some() {
            account = self
                .firebase
                .update_profile(
                    account,
                    profile.display_name.as_deref(),
                    profile.photo_url.as_deref(),
                )
                .await?;
        }

        let identity = into_identity(account);
        let user = NewUser {
            email: identity.email.clone(),
            name: identity.display_name.clone(),
            photo: identity.photo_url.clone(),
        };
        // The account exists either way; a missing backend record surfaces as
        // a failed role lookup.
        if let Err(e) = self.api.create_user(&identity.credentials(), &user).await {
            tracing::warn!(error = %e, "Failed to register user with backend");
        }

        self.establish(session, &identity).await?;
        Ok(identity)
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::InvalidCredentials` for a wrong email or
    /// password, or another error if the provider or session store fails.
    #[instrument(skip(self, session, password), fields(email = %email))]
    pub async fn sign_in(
        &self,
        session: &Session,
        email: &Email,
        password: &str,
    ) -> Result<CurrentIdentity, IdentityError> {
        let account = self.firebase.sign_in(email, password).await?;
        let identity = into_identity(account);
        self.establish(session, &identity).await?;
        Ok(identity)
    }

    /// Sign out and destroy the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be cleared.
    #[instrument(skip_all)]
    pub async fn sign_out(&self, session: &Session) -> Result<(), IdentityError> {
        let identity: Option<CurrentIdentity> =
            session.remove(session_keys::CURRENT_IDENTITY).await?;
        session.flush().await?;

        if let Some(identity) = identity {
            tracing::info!(email = %identity.email, "Signed out");
            self.publish(AuthEvent::SignedOut(identity.email)).await;
        }
        Ok(())
    }

    /// Store `identity` in a fresh session and announce it.
    async fn establish(
        &self,
        session: &Session,
        identity: &CurrentIdentity,
    ) -> Result<(), IdentityError> {
        let previous: Option<CurrentIdentity> = session.get(session_keys::CURRENT_IDENTITY).await?;

        // New session id on every sign-in
        session.cycle_id().await?;
        session
            .insert(session_keys::CURRENT_IDENTITY, identity)
            .await?;

        if let Some(previous) = previous.filter(|previous| previous.email != identity.email) {
            self.publish(AuthEvent::SignedOut(previous.email)).await;
        }
        tracing::info!(email = %identity.email, "Signed in");
        self.publish(AuthEvent::SignedIn(identity.email.clone()))
            .await;
        Ok(())
    }

    // =========================================================================
    // Session state
    // =========================================================================

    /// Current session state.
    ///
    /// An expired ID token is refreshed on a background task. If the refresh
    /// has not finished within `wait` the state is
    /// [`SessionState::resolving`]; the refresh still completes and is saved
    /// for the next request.
    pub async fn current(&self, session: &Session, wait: Duration) -> SessionState {
        let identity = match session
            .get::<CurrentIdentity>(session_keys::CURRENT_IDENTITY)
            .await
        {
            Ok(Some(identity)) => identity,
            Ok(None) => return SessionState::signed_out(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to read session");
                return SessionState::signed_out();
            }
        };

        if !identity.tokens.is_expired_at(Utc::now()) {
            return SessionState::signed_in(identity);
        }

        let refresh = tokio::spawn(self.clone().refresh_session(session.clone(), identity));
        match tokio::time::timeout(wait, refresh).await {
            Ok(Ok(Some(identity))) => SessionState::signed_in(identity),
            Ok(Ok(None)) => SessionState::signed_out(),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Token refresh task failed");
                SessionState::signed_out()
            }
            Err(_) => {
                tracing::debug!("Token refresh still in flight");
                SessionState::resolving()
            }
        }
    }

    /// Refresh the identity's tokens and persist the result.
    ///
    /// A revoked refresh token ends the session. Other failures keep the
    /// stale identity; the backend then rejects its token.
    async fn refresh_session(
        self,
        session: Session,
        identity: CurrentIdentity,
    ) -> Option<CurrentIdentity> {
        match self.firebase.refresh(&identity.tokens.refresh_token).await {
            Ok(tokens) => {
                let refreshed = CurrentIdentity { tokens, ..identity };
                if let Err(e) = persist(&session, &refreshed).await {
                    tracing::error!(error = %e, "Failed to store refreshed tokens");
                }
                Some(refreshed)
            }
            Err(IdentityError::TokenRevoked) => {
                tracing::info!(email = %identity.email, "Refresh token revoked, signing out");
                if let Err(e) = clear(&session).await {
                    tracing::error!(error = %e, "Failed to clear session");
                }
                self.publish(AuthEvent::TokenInvalidated(identity.email))
                    .await;
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh failed");
                Some(identity)
            }
        }
    }
}

fn into_identity(account: ProviderAccount) -> CurrentIdentity {
    CurrentIdentity {
        uid: account.uid,
        email: account.email,
        display_name: account.display_name,
        photo_url: account.photo_url,
        tokens: account.tokens,
    }
}

/// Write the identity and save immediately; the request that started the
/// refresh may already have been answered.
async fn persist(session: &Session, identity: &CurrentIdentity) -> Result<(), IdentityError> {
    session
        .insert(session_keys::CURRENT_IDENTITY, identity)
        .await?;
    session.save().await?;
    Ok(())
}

async fn clear(session: &Session) -> Result<(), IdentityError> {
    session
        .remove::<CurrentIdentity>(session_keys::CURRENT_IDENTITY)
        .await?;
    session.save().await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use secrecy::SecretString;

    use crate::config::{ApiConfig, FirebaseConfig, normalize_base_url};

    fn provider() -> SessionProvider {
        let firebase = FirebaseAuth::new(&FirebaseConfig {
            api_key: SecretString::from("AIzaSyD-test-key"),
            auth_url: normalize_base_url("http://127.0.0.1:9").unwrap(),
            token_url: normalize_base_url("http://127.0.0.1:9").unwrap(),
        });
        let api = ApiClient::new(&ApiConfig {
            base_url: normalize_base_url("http://127.0.0.1:9").unwrap(),
        });
        SessionProvider::new(firebase, api)
    }

    fn email() -> Email {
        Email::parse("buyer@market.example").unwrap()
    }

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let provider = provider();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&seen);
        let _subscription = provider.subscribe(move |event| {
            let counter = Arc::clone(&counter);
            async move {
                assert_eq!(event.email().as_str(), "buyer@market.example");
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        provider.publish(AuthEvent::SignedIn(email())).await;
        provider.publish(AuthEvent::SignedOut(email())).await;
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dispose_unsubscribes() {
        let provider = provider();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&seen);
        let subscription = provider.subscribe(move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        provider.publish(AuthEvent::SignedIn(email())).await;
        subscription.dispose();
        provider.publish(AuthEvent::SignedOut(email())).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropped_subscription_unsubscribes() {
        let provider = provider();
        let seen = Arc::new(AtomicUsize::new(0));

        {
            let counter = Arc::clone(&seen);
            let _subscription = provider.subscribe(move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            });
        }

        provider.publish(AuthEvent::SignedIn(email())).await;
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_subscription_outliving_provider_is_harmless() {
        let provider = provider();
        let subscription = provider.subscribe(|_| async {});
        drop(provider);
        subscription.dispose();
    }
}
