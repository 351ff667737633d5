//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                          - Home page (approved ads, latest products)
//! GET  /health                    - Health check
//! GET  /forbidden                 - Missing-role page
//!
//! # Products (public)
//! GET  /products                  - Approved product listing (?page, ?sort)
//! GET  /products/{id}             - Product detail with price trend
//!
//! # Auth
//! GET  /login                     - Sign-in page (?redirect)
//! POST /login                     - Sign in
//! GET  /register                  - Sign-up page
//! POST /register                  - Sign up
//! POST /logout                    - Sign out
//!
//! # Shopper (role: user)
//! GET  /cart                      - Cart page
//! GET  /cart/items                - Cart items fragment (HTMX, reconciles)
//! POST /cart/add                  - Add a product (confirmed)
//! POST /cart/{line}/increment     - Optimistic +1 (fragment)
//! POST /cart/{line}/decrement     - Optimistic -1, no-op at 1 (fragment)
//! POST /cart/{line}/remove        - Optimistic removal (fragment)
//! GET  /wishlist                  - Wishlist page
//! POST /wishlist/add              - Add a product (confirmed)
//! POST /wishlist/{item}/remove    - Optimistic removal (fragment)
//! POST /wishlist/{item}/move      - Move to cart
//! GET  /checkout                  - Stripe card form for the cart total
//! POST /checkout/complete         - Record the order after confirmation
//! GET  /orders                    - Order history
//! GET  /become-vendor             - Vendor application form
//! POST /become-vendor             - Submit application
//!
//! # Vendor dashboard (role: vendor)
//! GET  /vendor                    - Redirect to own products
//! GET  /vendor/products           - Own products with status/feedback
//! GET  /vendor/products/new       - New product form
//! POST /vendor/products           - Create product
//! GET  /vendor/products/{id}/edit - Edit product form
//! POST /vendor/products/{id}      - Update product
//! POST /vendor/products/{id}/delete - Delete product
//! GET  /vendor/ads                - Own advertisements
//! GET  /vendor/ads/new            - New advertisement form
//! POST /vendor/ads                - Create advertisement
//!
//! # Admin dashboard (role: admin)
//! GET  /admin                     - Redirect to users
//! GET  /admin/users               - Users and roles
//! POST /admin/users/{email}/role  - Change a role
//! GET  /admin/products            - All products
//! POST /admin/products/{id}/status - Approve/reject product
//! GET  /admin/ads                 - All advertisements
//! POST /admin/ads/{id}/status     - Approve/reject advertisement
//! GET  /admin/vendor-applications - Vendor applications
//! POST /admin/vendor-applications/{id}/status - Approve/reject application
//! GET  /admin/orders              - All orders
//!
//! # JSON API
//! GET  /api/role                  - Current role (401 when signed out)
//! GET  /api/cart                  - Current cart (role: user)
//! ```

pub mod admin;
pub mod api;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod home;
pub mod orders;
pub mod pages;
pub mod products;
pub mod vendor;
pub mod wishlist;

use axum::{
    Router,
    routing::{get, post},
};
use rust_decimal::Decimal;

use market_pulse_core::{CurrencyCode, Price, Role};

use crate::middleware::Viewer;
use crate::models::CurrentIdentity;
use crate::services::Notice;
use crate::state::AppState;
use crate::validation::FieldErrors;

// =============================================================================
// Shared view data
// =============================================================================

/// Signed-in user shown in the navigation bar.
#[derive(Debug, Clone)]
pub struct NavUser {
    pub name: String,
    pub photo_url: Option<String>,
}

/// Data every full page needs: navigation and pending notices.
#[derive(Debug, Clone, Default)]
pub struct Layout {
    pub user: Option<NavUser>,
    pub role: Option<Role>,
    pub notices: Vec<Notice>,
}

impl Layout {
    /// Layout for a guarded page, claiming the identity's pending notices.
    pub async fn for_identity(state: &AppState, identity: &CurrentIdentity, role: Role) -> Self {
        Self {
            user: Some(nav_user(identity)),
            role: Some(role),
            notices: state.notifications().take(&identity.email).await,
        }
    }

    /// Layout for a public page.
    pub async fn for_viewer(state: &AppState, viewer: &Viewer) -> Self {
        match &viewer.identity {
            Some(identity) => Self {
                user: Some(nav_user(identity)),
                role: viewer.role,
                notices: state.notifications().take(&identity.email).await,
            },
            None => Self::default(),
        }
    }

    #[must_use]
    pub fn is_user(&self) -> bool {
        self.role == Some(Role::User)
    }

    #[must_use]
    pub fn is_vendor(&self) -> bool {
        self.role == Some(Role::Vendor)
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Some(Role::Admin)
    }
}

fn nav_user(identity: &CurrentIdentity) -> NavUser {
    NavUser {
        name: identity.greeting_name().to_string(),
        photo_url: identity.photo_url.clone(),
    }
}

/// Format a backend amount in the configured currency.
#[must_use]
pub fn format_price(currency: CurrencyCode, amount: Decimal) -> String {
    Price::new(amount, currency).display()
}

/// A form re-rendered with its values and field errors.
#[derive(Debug, Clone, Default)]
pub struct FormState<F> {
    pub values: F,
    pub errors: FieldErrors,
}

impl<F: Default> FormState<F> {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

impl<F> FormState<F> {
    #[must_use]
    pub const fn with_errors(values: F, errors: FieldErrors) -> Self {
        Self { values, errors }
    }

    /// Error message for `field`, or empty.
    #[must_use]
    pub fn error(&self, field: &str) -> &str {
        self.errors.get(field).unwrap_or_default()
    }
}

// =============================================================================
// Routers
// =============================================================================

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/register", get(auth::register_page).post(auth::register))
        .route("/logout", post(auth::logout))
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/{id}", get(products::show))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/items", get(cart::items))
        .route("/add", post(cart::add))
        .route("/{line}/increment", post(cart::increment))
        .route("/{line}/decrement", post(cart::decrement))
        .route("/{line}/remove", post(cart::remove))
}

/// Create the wishlist routes router.
pub fn wishlist_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(wishlist::show))
        .route("/add", post(wishlist::add))
        .route("/{item}/remove", post(wishlist::remove))
        .route("/{item}/move", post(wishlist::move_to_cart))
}

/// Create the vendor dashboard router.
pub fn vendor_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(vendor::index))
        .route("/products", get(vendor::products).post(vendor::create_product))
        .route("/products/new", get(vendor::new_product))
        .route("/products/{id}", post(vendor::update_product))
        .route("/products/{id}/edit", get(vendor::edit_product))
        .route("/products/{id}/delete", post(vendor::delete_product))
        .route("/ads", get(vendor::ads).post(vendor::create_ad))
        .route("/ads/new", get(vendor::new_ad))
}

/// Create the admin dashboard router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(admin::index))
        .route("/users", get(admin::users))
        .route("/users/{email}/role", post(admin::set_role))
        .route("/products", get(admin::products))
        .route("/products/{id}/status", post(admin::set_product_status))
        .route("/ads", get(admin::ads))
        .route("/ads/{id}/status", post(admin::set_ad_status))
        .route("/vendor-applications", get(admin::vendor_applications))
        .route(
            "/vendor-applications/{id}/status",
            post(admin::set_application_status),
        )
        .route("/orders", get(admin::orders))
}

/// Create the JSON API router.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/role", get(api::role))
        .route("/cart", get(api::cart))
}

/// Create all routes for the web application.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home::home))
        .route("/forbidden", get(pages::forbidden))
        .nest("/products", product_routes())
        .nest("/cart", cart_routes())
        .nest("/wishlist", wishlist_routes())
        .route("/checkout", get(checkout::show))
        .route("/checkout/complete", post(checkout::complete))
        .route("/orders", get(orders::index))
        .route(
            "/become-vendor",
            get(pages::become_vendor_page).post(pages::become_vendor),
        )
        .nest("/vendor", vendor_routes())
        .nest("/admin", admin_routes())
        .nest("/api", api_routes())
        .merge(auth_routes())
}
