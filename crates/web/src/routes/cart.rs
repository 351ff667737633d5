//! Cart route handlers.
//!
//! Quantity changes and removals answer with the speculative cart straight
//! away. The returned fragment polls `/cart/items` once the backend has had
//! a moment, which renders the reconciled cart and any rollback notice.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, State},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::instrument;

use market_pulse_core::{CartLineId, CurrencyCode, ProductId, Quantity};

use super::{Layout, format_price};
use crate::api::types::CartLine;
use crate::error::{AppError, Result};
use crate::middleware::RequireUser;
use crate::models::Cart;
use crate::services::{Notice, Optimistic};
use crate::state::AppState;

/// Milliseconds before a speculative fragment asks for the reconciled cart.
pub const RECONCILE_DELAY_MS: u64 = 800;

/// Cart line display data for templates.
#[derive(Debug, Clone)]
pub struct CartLineView {
    pub id: String,
    pub product_id: String,
    pub name: String,
    pub market: String,
    pub image: Option<String>,
    pub price: String,
    pub quantity: u32,
    pub line_total: String,
}

impl CartLineView {
    fn new(line: &CartLine, currency: CurrencyCode) -> Self {
        Self {
            id: line.id.to_string(),
            product_id: line.product_id.to_string(),
            name: line.item_name.clone(),
            market: line.market_name.clone(),
            image: line.image.clone(),
            price: format_price(currency, line.price_per_unit),
            quantity: line.quantity.get(),
            line_total: format_price(
                currency,
                line.price_per_unit * rust_decimal::Decimal::from(line.quantity.get()),
            ),
        }
    }

    /// Decrement is disabled at one.
    #[must_use]
    pub const fn at_minimum(&self) -> bool {
        self.quantity <= 1
    }
}

/// Cart display data for templates.
#[derive(Debug, Clone)]
pub struct CartView {
    pub lines: Vec<CartLineView>,
    pub subtotal: String,
    pub item_count: u32,
    /// A mutation is still in flight; poll for the reconciled cart.
    pub pending: bool,
    pub reconcile_delay_ms: u64,
}

impl CartView {
    #[must_use]
    pub fn new(cart: &Cart, currency: CurrencyCode, pending: bool) -> Self {
        Self {
            lines: cart
                .lines
                .iter()
                .map(|line| CartLineView::new(line, currency))
                .collect(),
            subtotal: format_price(currency, cart.subtotal()),
            item_count: cart.item_count(),
            pending,
            reconcile_delay_ms: RECONCILE_DELAY_MS,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/show.html")]
pub struct CartShowTemplate {
    pub layout: Layout,
    pub cart: CartView,
}

/// Cart items fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_items.html")]
pub struct CartItemsTemplate {
    pub cart: CartView,
    pub notices: Vec<Notice>,
}

/// Add to cart form data.
#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    pub product_id: String,
    pub quantity: Option<u32>,
}

/// Display the cart page.
#[instrument(skip_all, fields(email = %identity.email))]
pub async fn show(
    State(state): State<AppState>,
    RequireUser { identity, role, .. }: RequireUser,
) -> Result<CartShowTemplate> {
    let cart = state.cart().cart(&identity.credentials()).await?;
    Ok(CartShowTemplate {
        layout: Layout::for_identity(&state, &identity, role).await,
        cart: CartView::new(&cart, state.config().currency, false),
    })
}

/// Cart items fragment, reconciled with the backend (HTMX).
#[instrument(skip_all, fields(email = %identity.email))]
pub async fn items(
    State(state): State<AppState>,
    RequireUser { identity, .. }: RequireUser,
) -> Result<CartItemsTemplate> {
    let cart = state.cart().cart(&identity.credentials()).await?;
    Ok(CartItemsTemplate {
        cart: CartView::new(&cart, state.config().currency, false),
        notices: state.notifications().take(&identity.email).await,
    })
}

/// Add a product to the cart.
///
/// Waits for the backend, which assigns the line id. HTMX callers get an
/// `HX-Trigger` so the cart badge can refresh; plain form posts go to the
/// cart page.
#[instrument(skip_all, fields(email = %identity.email, product = %form.product_id))]
pub async fn add(
    State(state): State<AppState>,
    RequireUser { identity, .. }: RequireUser,
    headers: axum::http::HeaderMap,
    Form(form): Form<AddToCartForm>,
) -> Result<Response> {
    let quantity = Quantity::new(form.quantity.unwrap_or(1))
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    state
        .cart()
        .add(
            &identity.credentials(),
            &ProductId::new(form.product_id),
            quantity,
        )
        .await?;

    if headers.contains_key("hx-request") {
        return Ok((AppendHeaders([("HX-Trigger", "cart-updated")]), "Added to cart").into_response());
    }
    Ok(Redirect::to("/cart").into_response())
}

fn fragment(state: &AppState, optimistic: &Optimistic) -> CartItemsTemplate {
    CartItemsTemplate {
        cart: CartView::new(
            &optimistic.cart,
            state.config().currency,
            optimistic.is_pending(),
        ),
        notices: Vec::new(),
    }
}

/// Increase a line's quantity by one (HTMX, optimistic).
#[instrument(skip_all, fields(email = %identity.email, line = %line))]
pub async fn increment(
    State(state): State<AppState>,
    RequireUser { identity, .. }: RequireUser,
    Path(line): Path<String>,
) -> Result<CartItemsTemplate> {
    let optimistic = state
        .cart()
        .increment(&identity.credentials(), &CartLineId::new(line))
        .await?;
    Ok(fragment(&state, &optimistic))
}

/// Decrease a line's quantity by one (HTMX, optimistic). No-op at one.
#[instrument(skip_all, fields(email = %identity.email, line = %line))]
pub async fn decrement(
    State(state): State<AppState>,
    RequireUser { identity, .. }: RequireUser,
    Path(line): Path<String>,
) -> Result<CartItemsTemplate> {
    let optimistic = state
        .cart()
        .decrement(&identity.credentials(), &CartLineId::new(line))
        .await?;
    Ok(fragment(&state, &optimistic))
}

/// Remove a line (HTMX, optimistic).
#[instrument(skip_all, fields(email = %identity.email, line = %line))]
pub async fn remove(
    State(state): State<AppState>,
    RequireUser { identity, .. }: RequireUser,
    Path(line): Path<String>,
) -> Result<CartItemsTemplate> {
    let optimistic = state
        .cart()
        .remove(&identity.credentials(), &CartLineId::new(line))
        .await?;
    Ok(fragment(&state, &optimistic))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn cart() -> Cart {
        Cart::from(vec![CartLine {
            id: CartLineId::new("l1"),
            product_id: ProductId::new("p1"),
            item_name: "Tomato".to_string(),
            market_name: "Kawran Bazar".to_string(),
            image: None,
            price_per_unit: Decimal::new(125, 2),
            quantity: Quantity::new(2).unwrap(),
        }])
    }

    #[test]
    fn test_cart_view_totals() {
        let view = CartView::new(&cart(), CurrencyCode::USD, false);
        assert_eq!(view.subtotal, "$2.50");
        assert_eq!(view.item_count, 2);
        assert_eq!(view.lines[0].line_total, "$2.50");
        assert!(!view.lines[0].at_minimum());
    }

    #[test]
    fn test_pending_fragment_polls_for_reconciled_cart() {
        let html = CartItemsTemplate {
            cart: CartView::new(&cart(), CurrencyCode::USD, true),
            notices: Vec::new(),
        }
        .render()
        .unwrap();
        assert!(html.contains(r#"hx-get="/cart/items""#));

        let settled = CartItemsTemplate {
            cart: CartView::new(&cart(), CurrencyCode::USD, false),
            notices: vec![Notice::error("Could not update your cart.")],
        }
        .render()
        .unwrap();
        assert!(!settled.contains(r#"hx-get="/cart/items""#));
        assert!(settled.contains("Could not update your cart."));
    }
}
