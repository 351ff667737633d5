//! Order history route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::extract::State;
use tracing::instrument;

use market_pulse_core::CurrencyCode;

use super::{Layout, format_price};
use crate::api::types::Order;
use crate::error::Result;
use crate::middleware::RequireUser;
use crate::state::AppState;

/// Order line display data.
#[derive(Debug, Clone)]
pub struct OrderLineView {
    pub name: String,
    pub quantity: u32,
    pub price: String,
}

/// Order display data, shared with the admin order list.
#[derive(Debug, Clone)]
pub struct OrderView {
    pub id: String,
    pub email: String,
    pub placed: String,
    pub lines: Vec<OrderLineView>,
    pub total: String,
    pub status: String,
    pub payment_reference: String,
}

impl OrderView {
    #[must_use]
    pub fn new(order: &Order, currency: CurrencyCode) -> Self {
        Self {
            id: order.id.to_string(),
            email: order.email.to_string(),
            placed: order.created_at.format("%Y-%m-%d %H:%M UTC").to_string(),
            lines: order
                .lines
                .iter()
                .map(|line| OrderLineView {
                    name: line.item_name.clone(),
                    quantity: line.quantity.get(),
                    price: format_price(currency, line.price_per_unit),
                })
                .collect(),
            total: format_price(currency, order.total),
            status: order.status.clone().unwrap_or_else(|| "paid".to_string()),
            payment_reference: order.payment_intent_id.clone(),
        }
    }
}

/// Newest first.
#[must_use]
pub fn order_views(orders: &[Order], currency: CurrencyCode) -> Vec<OrderView> {
    let mut sorted: Vec<&Order> = orders.iter().collect();
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    sorted
        .into_iter()
        .map(|order| OrderView::new(order, currency))
        .collect()
}

/// Order history page template.
#[derive(Template, WebTemplate)]
#[template(path = "orders.html")]
pub struct OrdersTemplate {
    pub layout: Layout,
    pub orders: Vec<OrderView>,
}

/// Display the shopper's orders.
#[instrument(skip_all, fields(email = %identity.email))]
pub async fn index(
    State(state): State<AppState>,
    RequireUser { identity, role, .. }: RequireUser,
) -> Result<OrdersTemplate> {
    let orders = state.api().orders(&identity.credentials()).await?;
    Ok(OrdersTemplate {
        layout: Layout::for_identity(&state, &identity, role).await,
        orders: order_views(&orders, state.config().currency),
    })
}
