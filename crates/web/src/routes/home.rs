//! Home page route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::extract::State;
use tracing::instrument;

use market_pulse_core::ApprovalStatus;

use super::Layout;
use super::products::ProductCard;
use crate::api::types::{Advertisement, ProductQuery};
use crate::middleware::Viewer;
use crate::state::AppState;

/// Products shown on the home page.
const FEATURED_PRODUCTS: u32 = 6;

/// Advertisement banner display data.
#[derive(Debug, Clone)]
pub struct AdView {
    pub title: String,
    pub description: String,
    pub image: Option<String>,
}

impl From<&Advertisement> for AdView {
    fn from(ad: &Advertisement) -> Self {
        Self {
            title: ad.title.clone(),
            description: ad.description.clone(),
            image: ad.image.clone(),
        }
    }
}

/// Home page template.
#[derive(Template, WebTemplate)]
#[template(path = "index.html")]
pub struct HomeTemplate {
    pub layout: Layout,
    pub ads: Vec<AdView>,
    pub products: Vec<ProductCard>,
}

/// Display the home page.
///
/// A backend failure degrades to an empty section rather than an error page.
#[instrument(skip(state, viewer))]
pub async fn home(State(state): State<AppState>, viewer: Viewer) -> HomeTemplate {
    let credentials = viewer.credentials();
    let currency = state.config().currency;

    let featured = ProductQuery::approved(1, FEATURED_PRODUCTS);

    let (ads, products) = tokio::join!(
        state
            .api()
            .ads(credentials.as_ref(), Some(ApprovalStatus::Approved)),
        state.api().products(credentials.as_ref(), &featured),
    );

    let ads = ads.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to fetch advertisements");
        Vec::new()
    });
    let products = products.map(|page| page.items).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to fetch featured products");
        Vec::new()
    });

    HomeTemplate {
        layout: Layout::for_viewer(&state, &viewer).await,
        ads: ads.iter().map(AdView::from).collect(),
        products: products
            .iter()
            .map(|product| ProductCard::new(product, currency))
            .collect(),
    }
}
