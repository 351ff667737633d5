//! Wishlist service.
//!
//! Removal is optimistic; adding and moving an item to the cart wait for
//! the backend.

use tracing::instrument;

use market_pulse_core::{Email, ProductId, Quantity, WishlistItemId};

use super::cart::CartService;
use super::notifications::{Notice, Notifications};
use crate::api::types::{NewWishlistItem, WishlistItem};
use crate::api::{ApiClient, ApiError, Credentials};
use crate::cache::OptimisticCache;

/// Shown when a speculative wishlist removal is rolled back.
pub const WISHLIST_UPDATE_FAILED: &str = "Could not update your wishlist. Please try again.";

#[derive(Clone)]
pub struct WishlistService {
    api: ApiClient,
    cache: OptimisticCache<Email, Vec<WishlistItem>>,
    notices: Notifications,
}

impl WishlistService {
    #[must_use]
    pub fn new(api: ApiClient, notices: Notifications) -> Self {
        Self {
            api,
            cache: OptimisticCache::new(),
            notices,
        }
    }

    /// The caller's wishlist, fetched if not cached or stale.
    ///
    /// # Errors
    ///
    /// Returns an error if the wishlist has to be fetched and the request
    /// fails.
    pub async fn items(&self, credentials: &Credentials) -> Result<Vec<WishlistItem>, ApiError> {
        self.cache
            .load(&credentials.email, self.api.wishlist(credentials))
            .await
    }

    /// Add a product.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the item.
    #[instrument(skip(self, credentials), fields(email = %credentials.email, product = %product))]
    pub async fn add(&self, credentials: &Credentials, product: &ProductId) -> Result<(), ApiError> {
        self.api
            .add_to_wishlist(
                credentials,
                &NewWishlistItem {
                    product_id: product.clone(),
                },
            )
            .await?;
        self.cache.invalidate(&credentials.email);
        Ok(())
    }

    /// Remove an item, returning the speculative wishlist.
    ///
    /// The request completes on a background task; a failure restores the
    /// wishlist and queues a notice.
    ///
    /// # Errors
    ///
    /// Returns an error only if the wishlist is not cached and fetching it
    /// fails.
    #[instrument(skip(self, credentials), fields(email = %credentials.email, item = %item))]
    pub async fn remove(
        &self,
        credentials: &Credentials,
        item: &WishlistItemId,
    ) -> Result<Vec<WishlistItem>, ApiError> {
        if self.cache.get(&credentials.email).is_none() {
            self.items(credentials).await?;
        }

        let Some(tx) = self.cache.begin(credentials.email.clone(), |items| {
            let before = items.len();
            items.retain(|entry| &entry.id != item);
            items.len() != before
        }) else {
            return self.items(credentials).await;
        };

        let speculative = tx.value().clone();
        let api = self.api.clone();
        let cache = self.cache.clone();
        let notices = self.notices.clone();
        let credentials = credentials.clone();
        let item = item.clone();

        tokio::spawn(async move {
            let outcome = api.remove_from_wishlist(&credentials, &item).await;
            match outcome {
                Ok(()) => {
                    tx.commit();
                    let email = credentials.email.clone();
                    cache.refetch_in_background(email, async move {
                        api.wishlist(&credentials).await
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Wishlist removal failed, rolling back");
                    if !tx.rollback() {
                        let credentials = credentials.clone();
                        cache.refetch_in_background(credentials.email.clone(), async move {
                            api.wishlist(&credentials).await
                        });
                    }
                    notices
                        .push(&credentials.email, Notice::error(WISHLIST_UPDATE_FAILED))
                        .await;
                }
            }
        });

        Ok(speculative)
    }

    /// Put a wishlist item in the cart and drop it from the wishlist.
    ///
    /// # Errors
    ///
    /// Returns an error if either backend request fails. If the cart accepted
    /// the product but the wishlist removal failed, the item stays listed.
    #[instrument(skip(self, credentials, cart), fields(email = %credentials.email, item = %item))]
    pub async fn move_to_cart(
        &self,
        credentials: &Credentials,
        cart: &CartService,
        item: &WishlistItemId,
    ) -> Result<(), ApiError> {
        let entry = self
            .items(credentials)
            .await?
            .into_iter()
            .find(|entry| &entry.id == item)
            .ok_or_else(|| ApiError::NotFound(format!("wishlist item {item}")))?;

        cart.add(credentials, &entry.product_id, Quantity::ONE)
            .await?;
        self.api.remove_from_wishlist(credentials, item).await?;
        self.cache.invalidate(&credentials.email);
        Ok(())
    }

    /// Forget the cached wishlist (sign-out).
    pub fn forget(&self, email: &Email) {
        self.cache.remove(email);
    }

    /// Drop every cached wishlist.
    pub fn clear(&self) {
        self.cache.clear();
    }
}
