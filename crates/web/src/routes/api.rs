//! JSON endpoints.
//!
//! Guarded like the pages, but a missing identity answers 401 and a missing
//! role 403 instead of redirecting.

use axum::{Json, extract::State};
use rust_decimal::Decimal;
use serde::Serialize;

use market_pulse_core::Role;

use crate::error::Result;
use crate::middleware::{RequireSignedIn, RequireUser};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct RoleBody {
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineBody {
    pub id: String,
    pub product_id: String,
    pub quantity: u32,
    pub price_per_unit: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartBody {
    pub lines: Vec<CartLineBody>,
    pub subtotal: Decimal,
    pub item_count: u32,
}

/// The signed-in identity's resolved role.
pub async fn role(RequireSignedIn { identity, role, .. }: RequireSignedIn) -> Json<RoleBody> {
    Json(RoleBody {
        email: identity.email.to_string(),
        role,
    })
}

/// The shopper's cart as currently cached.
pub async fn cart(
    State(state): State<AppState>,
    RequireUser { identity, .. }: RequireUser,
) -> Result<Json<CartBody>> {
    let cart = state.cart().cart(&identity.credentials()).await?;
    Ok(Json(CartBody {
        lines: cart
            .lines
            .iter()
            .map(|line| CartLineBody {
                id: line.id.to_string(),
                product_id: line.product_id.to_string(),
                quantity: line.quantity.get(),
                price_per_unit: line.price_per_unit,
            })
            .collect(),
        subtotal: cart.subtotal(),
        item_count: cart.item_count(),
    }))
}
