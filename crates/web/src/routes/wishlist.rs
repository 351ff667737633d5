//! Wishlist route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, State},
    response::Redirect,
};
use serde::Deserialize;
use tracing::instrument;

use market_pulse_core::{CurrencyCode, ProductId, WishlistItemId};

use super::{Layout, format_price};
use crate::api::types::WishlistItem;
use crate::error::Result;
use crate::middleware::RequireUser;
use crate::services::Notice;
use crate::state::AppState;

/// Wishlist entry display data.
#[derive(Debug, Clone)]
pub struct WishlistItemView {
    pub id: String,
    pub product_id: String,
    pub name: String,
    pub market: String,
    pub price: String,
}

impl WishlistItemView {
    fn new(item: &WishlistItem, currency: CurrencyCode) -> Self {
        Self {
            id: item.id.to_string(),
            product_id: item.product_id.to_string(),
            name: item.item_name.clone(),
            market: item.market_name.clone(),
            price: format_price(currency, item.price_per_unit),
        }
    }
}

fn views(items: &[WishlistItem], currency: CurrencyCode) -> Vec<WishlistItemView> {
    items
        .iter()
        .map(|item| WishlistItemView::new(item, currency))
        .collect()
}

/// Wishlist page template.
#[derive(Template, WebTemplate)]
#[template(path = "wishlist/show.html")]
pub struct WishlistShowTemplate {
    pub layout: Layout,
    pub items: Vec<WishlistItemView>,
}

/// Wishlist items fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/wishlist_items.html")]
pub struct WishlistItemsTemplate {
    pub items: Vec<WishlistItemView>,
    pub notices: Vec<Notice>,
}

/// Add to wishlist form data.
#[derive(Debug, Deserialize)]
pub struct AddToWishlistForm {
    pub product_id: String,
}

/// Display the wishlist.
#[instrument(skip_all, fields(email = %identity.email))]
pub async fn show(
    State(state): State<AppState>,
    RequireUser { identity, role, .. }: RequireUser,
) -> Result<WishlistShowTemplate> {
    let items = state.wishlist().items(&identity.credentials()).await?;
    Ok(WishlistShowTemplate {
        layout: Layout::for_identity(&state, &identity, role).await,
        items: views(&items, state.config().currency),
    })
}

/// Add a product to the wishlist.
#[instrument(skip_all, fields(email = %identity.email, product = %form.product_id))]
pub async fn add(
    State(state): State<AppState>,
    RequireUser { identity, .. }: RequireUser,
    Form(form): Form<AddToWishlistForm>,
) -> Result<Redirect> {
    state
        .wishlist()
        .add(&identity.credentials(), &ProductId::new(form.product_id))
        .await?;
    Ok(Redirect::to("/wishlist"))
}

/// Remove an entry (HTMX, optimistic).
#[instrument(skip_all, fields(email = %identity.email, item = %item))]
pub async fn remove(
    State(state): State<AppState>,
    RequireUser { identity, .. }: RequireUser,
    Path(item): Path<String>,
) -> Result<WishlistItemsTemplate> {
    let items = state
        .wishlist()
        .remove(&identity.credentials(), &WishlistItemId::new(item))
        .await?;
    Ok(WishlistItemsTemplate {
        items: views(&items, state.config().currency),
        notices: state.notifications().take(&identity.email).await,
    })
}

/// Move an entry into the cart.
#[instrument(skip_all, fields(email = %identity.email, item = %item))]
pub async fn move_to_cart(
    State(state): State<AppState>,
    RequireUser { identity, .. }: RequireUser,
    Path(item): Path<String>,
) -> Result<Redirect> {
    state
        .wishlist()
        .move_to_cart(
            &identity.credentials(),
            state.cart(),
            &WishlistItemId::new(item),
        )
        .await?;
    Ok(Redirect::to("/cart"))
}
