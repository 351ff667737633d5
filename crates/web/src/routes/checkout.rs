//! Checkout route handlers.
//!
//! Card details never reach this server: Stripe.js confirms the payment in
//! the browser with the intent's client secret, then the page posts the
//! intent id back here so the order can be recorded.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::instrument;

use market_pulse_core::Price;

use super::cart::CartView;
use super::{Layout, format_price};
use crate::api::types::{NewOrder, OrderLine, PaymentIntentRequest};
use crate::error::{AppError, Result};
use crate::middleware::RequireUser;
use crate::models::Cart;
use crate::services::Notice;
use crate::state::AppState;

/// Checkout page template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout.html")]
pub struct CheckoutTemplate {
    pub layout: Layout,
    pub cart: CartView,
    pub total: String,
    pub publishable_key: String,
    pub client_secret: String,
}

/// Completion form posted after Stripe confirms the payment.
#[derive(Debug, Deserialize)]
pub struct CompleteForm {
    pub payment_intent_id: String,
}

fn order_lines(cart: &Cart) -> Vec<OrderLine> {
    cart.lines
        .iter()
        .map(|line| OrderLine {
            product_id: line.product_id.clone(),
            item_name: line.item_name.clone(),
            quantity: line.quantity,
            price_per_unit: line.price_per_unit,
        })
        .collect()
}

/// Whether `id` looks like a Stripe payment intent id.
fn is_payment_intent_id(id: &str) -> bool {
    id.strip_prefix("pi_")
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
}

/// Display the checkout page with a fresh payment intent.
#[instrument(skip_all, fields(email = %identity.email))]
pub async fn show(
    State(state): State<AppState>,
    RequireUser { identity, role, .. }: RequireUser,
) -> Result<Response> {
    let credentials = identity.credentials();
    let cart = state.cart().cart(&credentials).await?;
    if cart.is_empty() {
        return Ok(Redirect::to("/cart").into_response());
    }

    let currency = state.config().currency;
    let total = Price::new(cart.subtotal(), currency);
    let amount = total
        .minor_units()
        .ok_or_else(|| AppError::Internal(format!("cart total out of range: {total}")))?;

    let intent = state
        .api()
        .create_payment_intent(
            &credentials,
            &PaymentIntentRequest {
                amount,
                currency: currency.code(),
            },
        )
        .await?;
    tracing::info!(payment_intent = %intent.id, amount, "Payment intent created");

    Ok(CheckoutTemplate {
        layout: Layout::for_identity(&state, &identity, role).await,
        cart: CartView::new(&cart, currency, false),
        total: format_price(currency, cart.subtotal()),
        publishable_key: state.config().stripe.publishable_key.clone(),
        client_secret: intent.client_secret,
    }
    .into_response())
}

/// Record the order for a confirmed payment.
#[instrument(skip_all, fields(email = %identity.email, payment_intent = %form.payment_intent_id))]
pub async fn complete(
    State(state): State<AppState>,
    RequireUser { identity, .. }: RequireUser,
    Form(form): Form<CompleteForm>,
) -> Result<Redirect> {
    if !is_payment_intent_id(&form.payment_intent_id) {
        return Err(AppError::BadRequest("invalid payment reference".to_string()));
    }

    let credentials = identity.credentials();
    let cart = state.cart().cart(&credentials).await?;
    if cart.is_empty() {
        return Ok(Redirect::to("/orders"));
    }

    let order = NewOrder {
        email: identity.email.clone(),
        lines: order_lines(&cart),
        total: cart.subtotal(),
        payment_intent_id: form.payment_intent_id,
    };
    state.api().create_order(&credentials, &order).await?;
    state.cart().invalidate(&identity.email);

    tracing::info!(total = %order.total, "Order recorded");
    state
        .notifications()
        .push(&identity.email, Notice::info("Thank you! Your order has been placed."))
        .await;
    Ok(Redirect::to("/orders"))
}
