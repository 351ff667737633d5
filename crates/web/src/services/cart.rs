//! Cart service.
//!
//! Quantity changes and removals are optimistic: the speculative cart is
//! returned straight away while the backend request runs on its own task.
//! On success the cart is marked stale and refetched; on failure it is
//! restored exactly and an error notice is queued for the owner.
//!
//! Adding a product is confirmed (the backend assigns line ids).

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::instrument;

use market_pulse_core::{CartLineId, Email, ProductId, Quantity};

use super::notifications::{Notice, Notifications};
use crate::api::types::{CartLine, NewCartLine};
use crate::api::{ApiClient, ApiError, Credentials};
use crate::cache::{OptimisticCache, Transaction};
use crate::models::Cart;

/// Shown when a speculative cart update is rolled back.
pub const CART_UPDATE_FAILED: &str = "Could not update your cart. Please try again.";

/// Cart endpoints the service depends on.
pub trait CartBackend: Send + Sync + 'static {
    fn cart(
        &self,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<Vec<CartLine>, ApiError>> + Send;

    fn add_to_cart(
        &self,
        credentials: &Credentials,
        line: &NewCartLine,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn set_cart_quantity(
        &self,
        credentials: &Credentials,
        line: &CartLineId,
        quantity: Quantity,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn remove_cart_line(
        &self,
        credentials: &Credentials,
        line: &CartLineId,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}

impl CartBackend for ApiClient {
    async fn cart(&self, credentials: &Credentials) -> Result<Vec<CartLine>, ApiError> {
        Self::cart(self, credentials).await
    }

    async fn add_to_cart(
        &self,
        credentials: &Credentials,
        line: &NewCartLine,
    ) -> Result<(), ApiError> {
        Self::add_to_cart(self, credentials, line).await
    }

    async fn set_cart_quantity(
        &self,
        credentials: &Credentials,
        line: &CartLineId,
        quantity: Quantity,
    ) -> Result<(), ApiError> {
        Self::set_cart_quantity(self, credentials, line, quantity).await
    }

    async fn remove_cart_line(
        &self,
        credentials: &Credentials,
        line: &CartLineId,
    ) -> Result<(), ApiError> {
        Self::remove_cart_line(self, credentials, line).await
    }
}

/// Result of an optimistic mutation.
#[derive(Debug)]
pub struct Optimistic {
    /// The cart to render now.
    pub cart: Cart,
    /// Completes once the backend has answered and the cache has been
    /// committed or rolled back. `None` when no request was sent.
    pub settled: Option<JoinHandle<()>>,
}

impl Optimistic {
    /// Whether a backend request was issued.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.settled.is_some()
    }
}

/// Cart operations over the optimistic cache.
pub struct CartService<B = ApiClient> {
    backend: Arc<B>,
    cache: OptimisticCache<Email, Cart>,
    notices: Notifications,
}

impl<B> Clone for CartService<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            cache: self.cache.clone(),
            notices: self.notices.clone(),
        }
    }
}

impl<B: CartBackend> CartService<B> {
    pub fn new(backend: B, notices: Notifications) -> Self {
        Self {
            backend: Arc::new(backend),
            cache: OptimisticCache::new(),
            notices,
        }
    }

    /// The caller's cart, fetched if not cached or stale.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart has to be fetched and the request fails.
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn cart(&self, credentials: &Credentials) -> Result<Cart, ApiError> {
        let backend = Arc::clone(&self.backend);
        self.cache
            .load(&credentials.email, async move {
                backend.cart(credentials).await.map(Cart::from)
            })
            .await
    }

    /// Add one more unit of a line.
    ///
    /// # Errors
    ///
    /// Returns an error only if the cart is not cached and fetching it fails;
    /// a failed update is reported through a notice.
    #[instrument(skip(self, credentials), fields(email = %credentials.email, line = %line))]
    pub async fn increment(
        &self,
        credentials: &Credentials,
        line: &CartLineId,
    ) -> Result<Optimistic, ApiError> {
        self.adjust_quantity(credentials, line, Cart::increment)
            .await
    }

    /// Take one unit off a line. At quantity one nothing happens and no
    /// request is sent.
    ///
    /// # Errors
    ///
    /// Returns an error only if the cart is not cached and fetching it fails.
    #[instrument(skip(self, credentials), fields(email = %credentials.email, line = %line))]
    pub async fn decrement(
        &self,
        credentials: &Credentials,
        line: &CartLineId,
    ) -> Result<Optimistic, ApiError> {
        self.adjust_quantity(credentials, line, Cart::decrement)
            .await
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns an error only if the cart is not cached and fetching it fails.
    #[instrument(skip(self, credentials), fields(email = %credentials.email, line = %line))]
    pub async fn remove(
        &self,
        credentials: &Credentials,
        line: &CartLineId,
    ) -> Result<Optimistic, ApiError> {
        self.ensure_cached(credentials).await?;

        let Some(tx) = self
            .cache
            .begin(credentials.email.clone(), |cart| cart.remove(line))
        else {
            return self.unchanged(credentials).await;
        };

        let line = line.clone();
        Ok(self.settle(tx, credentials, move |backend, credentials| async move {
            backend.remove_cart_line(&credentials, &line).await
        }))
    }

    /// Add a product to the cart and wait for the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the line.
    #[instrument(skip(self, credentials), fields(email = %credentials.email, product = %product))]
    pub async fn add(
        &self,
        credentials: &Credentials,
        product: &ProductId,
        quantity: Quantity,
    ) -> Result<(), ApiError> {
        self.backend
            .add_to_cart(
                credentials,
                &NewCartLine {
                    product_id: product.clone(),
                    quantity,
                },
            )
            .await?;
        self.cache.invalidate(&credentials.email);
        Ok(())
    }

    /// Mark the cart stale (e.g. after an order emptied it).
    pub fn invalidate(&self, email: &Email) {
        self.cache.invalidate(email);
    }

    /// Forget the cached cart (sign-out).
    pub fn forget(&self, email: &Email) {
        self.cache.remove(email);
    }

    /// Drop every cached cart.
    pub fn clear(&self) {
        self.cache.clear();
    }

    async fn adjust_quantity(
        &self,
        credentials: &Credentials,
        line: &CartLineId,
        adjust: fn(&mut Cart, &CartLineId) -> Option<Quantity>,
    ) -> Result<Optimistic, ApiError> {
        self.ensure_cached(credentials).await?;

        let mut quantity = None;
        let Some(tx) = self.cache.begin(credentials.email.clone(), |cart| {
            quantity = adjust(cart, line);
            quantity.is_some()
        }) else {
            tracing::debug!("Quantity unchanged, no request sent");
            return self.unchanged(credentials).await;
        };
        let Some(quantity) = quantity else {
            return self.unchanged(credentials).await;
        };

        let line = line.clone();
        Ok(self.settle(tx, credentials, move |backend, credentials| async move {
            backend
                .set_cart_quantity(&credentials, &line, quantity)
                .await
        }))
    }

    /// Fetch the cart only when nothing is cached, so the speculative value
    /// is shown without waiting on the network.
    async fn ensure_cached(&self, credentials: &Credentials) -> Result<(), ApiError> {
        if self.cache.get(&credentials.email).is_none() {
            self.cart(credentials).await?;
        }
        Ok(())
    }

    async fn unchanged(&self, credentials: &Credentials) -> Result<Optimistic, ApiError> {
        let cart = match self.cache.get(&credentials.email) {
            Some(cart) => cart,
            None => self.cart(credentials).await?,
        };
        Ok(Optimistic {
            cart,
            settled: None,
        })
    }

    /// Send the mutating request on its own task and settle the transaction
    /// with its outcome.
    fn settle<F, Fut>(
        &self,
        tx: Transaction<Email, Cart>,
        credentials: &Credentials,
        request: F,
    ) -> Optimistic
    where
        F: FnOnce(Arc<B>, Credentials) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), ApiError>> + Send + 'static,
    {
        let cart = tx.value().clone();
        let backend = Arc::clone(&self.backend);
        let cache = self.cache.clone();
        let notices = self.notices.clone();
        let credentials = credentials.clone();

        let settled = tokio::spawn(async move {
            let outcome = request(Arc::clone(&backend), credentials.clone()).await;
            match outcome {
                Ok(()) => {
                    tx.commit();
                    let email = credentials.email.clone();
                    cache.refetch_in_background(email, async move {
                        backend.cart(&credentials).await.map(Cart::from)
                    });
                }
                Err(e) => {
                    tracing::warn!(email = %credentials.email, error = %e, "Cart update failed, rolling back");
                    if !tx.rollback() {
                        tracing::debug!(email = %credentials.email, "Rollback superseded, refetching cart");
                        let credentials = credentials.clone();
                        cache.refetch_in_background(credentials.email.clone(), async move {
                            backend.cart(&credentials).await.map(Cart::from)
                        });
                    }
                    notices
                        .push(&credentials.email, Notice::error(CART_UPDATE_FAILED))
                        .await;
                }
            }
        });

        Optimistic {
            cart,
            settled: Some(settled),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use secrecy::SecretString;
    use tokio::sync::Notify;

    use crate::models::cart::tests::line;

    /// Backend whose mutations wait for `release` and then succeed unless
    /// `failing` is set.
    #[derive(Default)]
    struct FakeBackend {
        lines: Mutex<Vec<CartLine>>,
        requests: Mutex<Vec<String>>,
        release: Notify,
        gated: AtomicBool,
        failing: AtomicBool,
    }

    impl FakeBackend {
        fn with_lines(lines: Vec<CartLine>) -> Self {
            Self {
                lines: Mutex::new(lines),
                ..Self::default()
            }
        }

        fn record(&self, request: String) {
            self.requests.lock().unwrap().push(request);
        }

        async fn respond(&self) -> Result<(), ApiError> {
            if self.gated.load(Ordering::SeqCst) {
                self.release.notified().await;
            }
            if self.failing.load(Ordering::SeqCst) {
                Err(ApiError::Status {
                    status: 500,
                    message: "boom".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    impl CartBackend for FakeBackend {
        async fn cart(&self, _credentials: &Credentials) -> Result<Vec<CartLine>, ApiError> {
            self.record("GET".to_string());
            Ok(self.lines.lock().unwrap().clone())
        }

        async fn add_to_cart(
            &self,
            _credentials: &Credentials,
            new_line: &NewCartLine,
        ) -> Result<(), ApiError> {
            self.record(format!("POST {}", new_line.product_id));
            self.lines
                .lock()
                .unwrap()
                .push(line("new", new_line.quantity.get(), 100));
            Ok(())
        }

        async fn set_cart_quantity(
            &self,
            _credentials: &Credentials,
            id: &CartLineId,
            quantity: Quantity,
        ) -> Result<(), ApiError> {
            self.record(format!("PATCH {id} {quantity}"));
            self.respond().await?;
            if let Some(line) = self.lines.lock().unwrap().iter_mut().find(|l| &l.id == id) {
                line.quantity = quantity;
            }
            Ok(())
        }

        async fn remove_cart_line(
            &self,
            _credentials: &Credentials,
            id: &CartLineId,
        ) -> Result<(), ApiError> {
            self.record(format!("DELETE {id}"));
            self.respond().await?;
            self.lines.lock().unwrap().retain(|l| &l.id != id);
            Ok(())
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            email: Email::parse("buyer@market.example").unwrap(),
            token: SecretString::from("id-token"),
        }
    }

    fn service(lines: Vec<CartLine>) -> CartService<FakeBackend> {
        CartService::new(FakeBackend::with_lines(lines), Notifications::new())
    }

    fn quantity_of(cart: &Cart, id: &str) -> Option<u32> {
        cart.line(&CartLineId::new(id)).map(|l| l.quantity.get())
    }

    fn requests(service: &CartService<FakeBackend>) -> Vec<String> {
        service.backend.requests.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_increment_shows_new_quantity_before_backend_answers() {
        let service = service(vec![line("a", 2, 100)]);
        let credentials = credentials();
        service.cart(&credentials).await.unwrap();
        service.backend.gated.store(true, Ordering::SeqCst);

        let outcome = service
            .increment(&credentials, &CartLineId::new("a"))
            .await
            .unwrap();

        assert_eq!(quantity_of(&outcome.cart, "a"), Some(3));
        assert_eq!(
            quantity_of(&service.cart(&credentials).await.unwrap(), "a"),
            Some(3)
        );

        service.backend.release.notify_one();
        outcome.settled.unwrap().await.unwrap();
        assert!(requests(&service).contains(&"PATCH a 3".to_string()));
    }

    #[tokio::test]
    async fn test_failed_increment_restores_exact_cart_and_notifies() {
        let service = service(vec![line("a", 2, 100), line("b", 5, 250)]);
        let credentials = credentials();
        let before = service.cart(&credentials).await.unwrap();
        service.backend.failing.store(true, Ordering::SeqCst);

        let outcome = service
            .increment(&credentials, &CartLineId::new("a"))
            .await
            .unwrap();
        assert_eq!(quantity_of(&outcome.cart, "a"), Some(3));
        outcome.settled.unwrap().await.unwrap();

        assert_eq!(service.cart(&credentials).await.unwrap(), before);
        let notices = service.notices.take(&credentials.email).await;
        assert_eq!(notices, vec![Notice::error(CART_UPDATE_FAILED)]);
    }

    #[tokio::test]
    async fn test_decrement_at_one_sends_nothing() {
        let service = service(vec![line("a", 1, 100)]);
        let credentials = credentials();
        service.cart(&credentials).await.unwrap();

        let outcome = service
            .decrement(&credentials, &CartLineId::new("a"))
            .await
            .unwrap();

        assert!(!outcome.is_pending());
        assert_eq!(quantity_of(&outcome.cart, "a"), Some(1));
        assert_eq!(requests(&service), vec!["GET".to_string()]);
    }

    #[tokio::test]
    async fn test_decrement_above_one() {
        let service = service(vec![line("a", 3, 100)]);
        let credentials = credentials();

        let outcome = service
            .decrement(&credentials, &CartLineId::new("a"))
            .await
            .unwrap();
        assert_eq!(quantity_of(&outcome.cart, "a"), Some(2));
        outcome.settled.unwrap().await.unwrap();
        assert!(requests(&service).contains(&"PATCH a 2".to_string()));
    }

    #[tokio::test]
    async fn test_successful_remove_is_refetched() {
        let service = service(vec![line("a", 1, 100), line("b", 1, 100)]);
        let credentials = credentials();
        service.cart(&credentials).await.unwrap();

        let outcome = service
            .remove(&credentials, &CartLineId::new("a"))
            .await
            .unwrap();
        assert_eq!(outcome.cart.lines.len(), 1);
        outcome.settled.unwrap().await.unwrap();

        let cart = service.cart(&credentials).await.unwrap();
        assert_eq!(cart.lines.len(), 1);
        assert_eq!(quantity_of(&cart, "b"), Some(1));
    }

    #[tokio::test]
    async fn test_add_is_confirmed_then_refetched() {
        let service = service(Vec::new());
        let credentials = credentials();
        assert!(service.cart(&credentials).await.unwrap().is_empty());

        service
            .add(&credentials, &ProductId::new("p1"), Quantity::ONE)
            .await
            .unwrap();

        let cart = service.cart(&credentials).await.unwrap();
        assert_eq!(cart.lines.len(), 1);
        assert_eq!(
            requests(&service),
            vec!["GET".to_string(), "POST p1".to_string(), "GET".to_string()]
        );
    }
}
