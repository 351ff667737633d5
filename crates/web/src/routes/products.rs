//! Product route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use tracing::instrument;

use market_pulse_core::{
    ApprovalStatus, CurrencyCode, Page, PriceTrend, ProductId, TrendDirection,
};

use super::{Layout, format_price};
use crate::api::types::{PriceSort, Product, ProductQuery};
use crate::error::Result;
use crate::middleware::Viewer;
use crate::state::AppState;

/// Product summary for listings and dashboards.
#[derive(Debug, Clone)]
pub struct ProductCard {
    pub id: String,
    pub name: String,
    pub market: String,
    pub vendor: String,
    pub image: Option<String>,
    pub price: String,
    pub date: String,
    pub status: ApprovalStatus,
    pub feedback: Option<String>,
}

impl ProductCard {
    #[must_use]
    pub fn new(product: &Product, currency: CurrencyCode) -> Self {
        Self {
            id: product.id.to_string(),
            name: product.item_name.clone(),
            market: product.market_name.clone(),
            vendor: product
                .vendor_name
                .clone()
                .unwrap_or_else(|| product.vendor_email.to_string()),
            image: product.image.clone(),
            price: format_price(currency, product.price_per_unit),
            date: product
                .date
                .map(|date| date.format("%b %-d, %Y").to_string())
                .unwrap_or_default(),
            status: product.status,
            feedback: product.feedback.clone(),
        }
    }

    #[must_use]
    pub fn status_label(&self) -> &'static str {
        self.status.as_str()
    }

    /// Admin endpoint that approves or rejects this product.
    #[must_use]
    pub fn review_action(&self) -> String {
        format!("/admin/products/{}/status", self.id)
    }
}

/// Price trend display data.
#[derive(Debug, Clone)]
pub struct TrendView {
    pub latest: String,
    pub latest_date: String,
    pub previous: Option<String>,
    pub change: String,
    pub change_percent: Option<String>,
    pub direction: &'static str,
    pub low: String,
    pub high: String,
}

impl TrendView {
    fn new(trend: &PriceTrend, currency: CurrencyCode) -> Self {
        Self {
            latest: format_price(currency, trend.latest.price),
            latest_date: trend.latest.date.format("%b %-d, %Y").to_string(),
            previous: trend
                .previous
                .map(|point| format_price(currency, point.price)),
            change: format_price(currency, trend.change.abs()),
            change_percent: trend.change_percent.map(|pct| format!("{}%", pct.abs())),
            direction: match trend.direction {
                TrendDirection::Up => "up",
                TrendDirection::Down => "down",
                TrendDirection::Flat => "flat",
            },
            low: format_price(currency, trend.low),
            high: format_price(currency, trend.high),
        }
    }
}

/// One row of the price history table.
#[derive(Debug, Clone)]
pub struct PriceRow {
    pub date: String,
    pub price: String,
}

/// Pagination controls.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub current: u32,
    pub pages: Vec<u32>,
    pub sort: Option<&'static str>,
    base: &'static str,
}

impl Pagination {
    fn new<T>(page: &Page<T>, current: u32, sort: Option<PriceSort>) -> Self {
        Self {
            current,
            pages: page.page_numbers().collect(),
            sort: sort.map(PriceSort::as_str),
            base: "/products",
        }
    }

    /// Controls for the admin moderation list.
    #[must_use]
    pub fn admin<T>(page: &Page<T>, current: u32) -> Self {
        Self {
            base: "/admin/products",
            ..Self::new(page, current, None)
        }
    }

    #[must_use]
    pub fn has_previous(&self) -> bool {
        self.current > 1
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        self.pages.last().is_some_and(|last| self.current < *last)
    }

    #[must_use]
    pub fn previous(&self) -> u32 {
        self.current.saturating_sub(1).max(1)
    }

    #[must_use]
    pub const fn next(&self) -> u32 {
        self.current.saturating_add(1)
    }

    #[must_use]
    pub fn is_current(&self, page: &u32) -> bool {
        *page == self.current
    }

    #[must_use]
    pub fn sorted_by(&self, sort: &str) -> bool {
        self.sort == Some(sort)
    }

    #[must_use]
    pub fn previous_href(&self) -> String {
        self.href(&self.previous())
    }

    #[must_use]
    pub fn next_href(&self) -> String {
        self.href(&self.next())
    }

    /// Query string for `page`, keeping the sort order.
    #[must_use]
    pub fn href(&self, page: &u32) -> String {
        match self.sort {
            Some(sort) => format!("{}?page={page}&sort={sort}", self.base),
            None => format!("{}?page={page}", self.base),
        }
    }
}

/// Listing query parameters.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub sort: Option<PriceSort>,
}

/// Product listing page template.
#[derive(Template, WebTemplate)]
#[template(path = "products/index.html")]
pub struct ProductsIndexTemplate {
    pub layout: Layout,
    pub products: Vec<ProductCard>,
    pub pagination: Pagination,
}

/// Product detail page template.
#[derive(Template, WebTemplate)]
#[template(path = "products/show.html")]
pub struct ProductShowTemplate {
    pub layout: Layout,
    pub product: ProductCard,
    pub market_description: Option<String>,
    pub description: Option<String>,
    pub trend: Option<TrendView>,
    pub history: Vec<PriceRow>,
}

/// Display the approved product listing.
#[instrument(skip(state, viewer))]
pub async fn index(
    State(state): State<AppState>,
    viewer: Viewer,
    Query(query): Query<ListQuery>,
) -> Result<ProductsIndexTemplate> {
    let current = query.page.unwrap_or(1).max(1);
    let request = ProductQuery {
        sort: query.sort,
        ..ProductQuery::approved(current, state.config().page_size)
    };

    let credentials = viewer.credentials();
    let page = state.api().products(credentials.as_ref(), &request).await?;
    let currency = state.config().currency;

    Ok(ProductsIndexTemplate {
        layout: Layout::for_viewer(&state, &viewer).await,
        products: page
            .items
            .iter()
            .map(|product| ProductCard::new(product, currency))
            .collect(),
        pagination: Pagination::new(&page, current, query.sort),
    })
}

/// Display a product with its price trend.
#[instrument(skip(state, viewer), fields(product = %id))]
pub async fn show(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<String>,
) -> Result<ProductShowTemplate> {
    let product = state.api().product(&ProductId::new(id)).await?;
    let currency = state.config().currency;

    let mut history = product.prices.clone();
    history.sort_by(|a, b| b.date.cmp(&a.date));

    Ok(ProductShowTemplate {
        layout: Layout::for_viewer(&state, &viewer).await,
        trend: PriceTrend::from_history(&product.prices).map(|trend| TrendView::new(&trend, currency)),
        history: history
            .iter()
            .map(|point| PriceRow {
                date: point.date.format("%Y-%m-%d").to_string(),
                price: format_price(currency, point.price),
            })
            .collect(),
        market_description: product.market_description.clone(),
        description: product.description.clone(),
        product: ProductCard::new(&product, currency),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_links_keep_sort() {
        let page: Page<()> = Page {
            items: Vec::new(),
            total_pages: 3,
        };
        let pagination = Pagination::new(&page, 2, Some(PriceSort::Desc));
        assert_eq!(pagination.pages, vec![1, 2, 3]);
        assert!(pagination.has_previous());
        assert!(pagination.has_next());
        assert_eq!(pagination.href(&3), "/products?page=3&sort=desc");
        assert_eq!(pagination.previous_href(), "/products?page=1&sort=desc");
        assert!(pagination.is_current(&2));
        assert!(pagination.sorted_by("desc"));
    }

    #[test]
    fn test_pagination_bounds() {
        let page: Page<()> = Page::single(Vec::new());
        let pagination = Pagination::new(&page, 1, None);
        assert!(!pagination.has_previous());
        assert!(!pagination.has_next());
        assert_eq!(pagination.previous(), 1);
        assert_eq!(pagination.href(&1), "/products?page=1");
        assert_eq!(Pagination::admin(&page, 1).href(&1), "/admin/products?page=1");
    }
}
