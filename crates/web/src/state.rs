//! Application state shared across handlers.

use std::sync::{Arc, Mutex, PoisonError};

use crate::api::ApiClient;
use crate::config::MarketPulseConfig;
use crate::identity::{AuthEvent, FirebaseAuth, SessionProvider, Subscription};
use crate::roles::RoleResolver;
use crate::services::{CartService, Notifications, WishlistService};

/// Application state shared across all handlers.
///
/// Constructed once at startup and cheaply cloneable via `Arc`. Owns the
/// session provider, the role cache and the optimistic cart and wishlist
/// caches, and keeps them consistent through auth-state subscriptions.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: MarketPulseConfig,
    api: ApiClient,
    sessions: SessionProvider,
    roles: RoleResolver,
    cart: CartService,
    wishlist: WishlistService,
    notifications: Notifications,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl AppState {
    /// Create a new application state and wire up auth-state listeners.
    #[must_use]
    pub fn new(config: MarketPulseConfig) -> Self {
        let api = ApiClient::new(&config.api);
        let sessions = SessionProvider::new(FirebaseAuth::new(&config.firebase), api.clone());
        let roles = RoleResolver::new(api.clone(), config.role_cache_ttl);
        let notifications = Notifications::new();
        let cart = CartService::new(api.clone(), notifications.clone());
        let wishlist = WishlistService::new(api.clone(), notifications.clone());

        let subscription = {
            let roles = roles.clone();
            let cart = cart.clone();
            let wishlist = wishlist.clone();
            let notifications = notifications.clone();
            sessions.subscribe(move |event: AuthEvent| {
                let roles = roles.clone();
                let cart = cart.clone();
                let wishlist = wishlist.clone();
                let notifications = notifications.clone();
                async move {
                    let email = event.email();
                    roles.invalidate(email).await;
                    cart.forget(email);
                    wishlist.forget(email);
                    if !matches!(event, AuthEvent::SignedIn(_)) {
                        notifications.clear(email).await;
                    }
                }
            })
        };

        Self {
            inner: Arc::new(AppStateInner {
                config,
                api,
                sessions,
                roles,
                cart,
                wishlist,
                notifications,
                subscriptions: Mutex::new(vec![subscription]),
            }),
        }
    }

    /// Get a reference to the application configuration.
    #[must_use]
    pub fn config(&self) -> &MarketPulseConfig {
        &self.inner.config
    }

    /// Get a reference to the backend API client.
    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    /// Get a reference to the session provider.
    #[must_use]
    pub fn sessions(&self) -> &SessionProvider {
        &self.inner.sessions
    }

    /// Get a reference to the role resolver.
    #[must_use]
    pub fn roles(&self) -> &RoleResolver {
        &self.inner.roles
    }

    /// Get a reference to the cart service.
    #[must_use]
    pub fn cart(&self) -> &CartService {
        &self.inner.cart
    }

    /// Get a reference to the wishlist service.
    #[must_use]
    pub fn wishlist(&self) -> &WishlistService {
        &self.inner.wishlist
    }

    /// Get a reference to the notification queues.
    #[must_use]
    pub fn notifications(&self) -> &Notifications {
        &self.inner.notifications
    }

    /// Dispose auth-state subscriptions and drop cached collections.
    ///
    /// Called once the server has stopped accepting requests.
    pub fn shutdown(&self) {
        let subscriptions = std::mem::take(
            &mut *self
                .inner
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let count = subscriptions.len();
        subscriptions.into_iter().for_each(Subscription::dispose);
        self.inner.cart.clear();
        self.inner.wishlist.clear();
        tracing::info!(subscriptions = count, "Application state shut down");
    }
}
