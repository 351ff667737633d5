//! Cart, wishlist, order and payment endpoints.
//!
//! Carts and wishlists are keyed by the owner's email, which is always the
//! email of the credentials the call is made with.

use reqwest::Method;
use tracing::instrument;

use market_pulse_core::{CartLineId, Page, Quantity, WishlistItemId};

use super::types::{
    CartLine, NewCartLine, NewOrder, NewWishlistItem, Order, PaymentIntent, PaymentIntentRequest,
    QuantityUpdate, WishlistItem,
};
use super::{ApiClient, ApiError, Credentials};

impl ApiClient {
    // =========================================================================
    // Cart
    // =========================================================================

    /// Fetch the caller's cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn cart(&self, credentials: &Credentials) -> Result<Vec<CartLine>, ApiError> {
        let url = self.endpoint(&["carts", credentials.email.as_str()])?;
        let page: Page<CartLine> = self
            .execute(self.request(Method::GET, url, Some(credentials)))
            .await?;
        Ok(page.items)
    }

    /// Add a product to the caller's cart.
    ///
    /// The backend merges the quantity into an existing line for the same
    /// product.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, credentials, line), fields(email = %credentials.email, product = %line.product_id))]
    pub async fn add_to_cart(
        &self,
        credentials: &Credentials,
        line: &NewCartLine,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&["carts", credentials.email.as_str()])?;
        self.execute_empty(self.request(Method::POST, url, Some(credentials)).json(line))
            .await
    }

    /// Set the quantity of a cart line.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, credentials), fields(email = %credentials.email, line = %line))]
    pub async fn set_cart_quantity(
        &self,
        credentials: &Credentials,
        line: &CartLineId,
        quantity: Quantity,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&["carts", credentials.email.as_str(), line.as_str()])?;
        self.execute_empty(
            self.request(Method::PATCH, url, Some(credentials))
                .json(&QuantityUpdate { quantity }),
        )
        .await
    }

    /// Remove a line from the caller's cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, credentials), fields(email = %credentials.email, line = %line))]
    pub async fn remove_cart_line(
        &self,
        credentials: &Credentials,
        line: &CartLineId,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&["carts", credentials.email.as_str(), line.as_str()])?;
        self.execute_empty(self.request(Method::DELETE, url, Some(credentials)))
            .await
    }

    // =========================================================================
    // Wishlist
    // =========================================================================

    /// Fetch the caller's wishlist.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn wishlist(
        &self,
        credentials: &Credentials,
    ) -> Result<Vec<WishlistItem>, ApiError> {
        let url = self.endpoint(&["wishlists", credentials.email.as_str()])?;
        let page: Page<WishlistItem> = self
            .execute(self.request(Method::GET, url, Some(credentials)))
            .await?;
        Ok(page.items)
    }

    /// Add a product to the caller's wishlist.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, credentials, item), fields(email = %credentials.email, product = %item.product_id))]
    pub async fn add_to_wishlist(
        &self,
        credentials: &Credentials,
        item: &NewWishlistItem,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&["wishlists", credentials.email.as_str()])?;
        self.execute_empty(self.request(Method::POST, url, Some(credentials)).json(item))
            .await
    }

    /// Remove an item from the caller's wishlist.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, credentials), fields(email = %credentials.email, item = %item))]
    pub async fn remove_from_wishlist(
        &self,
        credentials: &Credentials,
        item: &WishlistItemId,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&["wishlists", credentials.email.as_str(), item.as_str()])?;
        self.execute_empty(self.request(Method::DELETE, url, Some(credentials)))
            .await
    }

    // =========================================================================
    // Orders and payments
    // =========================================================================

    /// List the caller's orders.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn orders(&self, credentials: &Credentials) -> Result<Vec<Order>, ApiError> {
        let url = self.endpoint(&["orders", credentials.email.as_str()])?;
        let page: Page<Order> = self
            .execute(self.request(Method::GET, url, Some(credentials)))
            .await?;
        Ok(page.items)
    }

    /// List every order (admin).
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, credentials))]
    pub async fn all_orders(&self, credentials: &Credentials) -> Result<Vec<Order>, ApiError> {
        let url = self.endpoint(&["orders"])?;
        let page: Page<Order> = self
            .execute(self.request(Method::GET, url, Some(credentials)))
            .await?;
        Ok(page.items)
    }

    /// Record an order after the payment has been confirmed.
    ///
    /// The backend clears the cart once the order is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, credentials, order), fields(email = %credentials.email, payment_intent = %order.payment_intent_id))]
    pub async fn create_order(
        &self,
        credentials: &Credentials,
        order: &NewOrder,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&["orders"])?;
        self.execute_empty(self.request(Method::POST, url, Some(credentials)).json(order))
            .await
    }

    /// Create a payment intent for `amount` minor currency units.
    ///
    /// The returned client secret is handed to Stripe.js in the browser.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self, credentials, request), fields(email = %credentials.email, amount = request.amount))]
    pub async fn create_payment_intent(
        &self,
        credentials: &Credentials,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, ApiError> {
        let url = self.endpoint(&["payments", "intent"])?;
        self.execute(
            self.request(Method::POST, url, Some(credentials))
                .json(request),
        )
        .await
    }
}
