//! Vendor dashboard route handlers.
//!
//! Vendors manage their own products and advertisements. Everything they
//! submit starts out pending until an admin approves it.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use tracing::instrument;

use market_pulse_core::{ApprovalStatus, ProductId};

use super::products::ProductCard;
use super::{FormState, Layout};
use crate::api::types::{Advertisement, Product};
use crate::error::{AppError, Result};
use crate::middleware::RequireVendor;
use crate::models::CurrentIdentity;
use crate::roles::FORBIDDEN_PATH;
use crate::services::Notice;
use crate::state::AppState;
use crate::validation::{AdForm, ProductForm};

/// Advertisement row for the vendor's list.
#[derive(Debug, Clone)]
pub struct VendorAdView {
    pub title: String,
    pub description: String,
    pub image: Option<String>,
    pub status: ApprovalStatus,
}

impl VendorAdView {
    #[must_use]
    pub fn status_label(&self) -> &'static str {
        self.status.as_str()
    }
}

impl From<&Advertisement> for VendorAdView {
    fn from(ad: &Advertisement) -> Self {
        Self {
            title: ad.title.clone(),
            description: ad.description.clone(),
            image: ad.image.clone(),
            status: ad.status,
        }
    }
}

/// Own products template.
#[derive(Template, WebTemplate)]
#[template(path = "vendor/products.html")]
pub struct VendorProductsTemplate {
    pub layout: Layout,
    pub products: Vec<ProductCard>,
}

/// Product create/edit form template.
#[derive(Template, WebTemplate)]
#[template(path = "vendor/product_form.html")]
pub struct ProductFormTemplate {
    pub layout: Layout,
    pub heading: &'static str,
    pub action: String,
    pub form: FormState<ProductForm>,
}

/// Own advertisements template.
#[derive(Template, WebTemplate)]
#[template(path = "vendor/ads.html")]
pub struct VendorAdsTemplate {
    pub layout: Layout,
    pub ads: Vec<VendorAdView>,
}

/// Advertisement form template.
#[derive(Template, WebTemplate)]
#[template(path = "vendor/ad_form.html")]
pub struct AdFormTemplate {
    pub layout: Layout,
    pub form: FormState<AdForm>,
}

/// Fetch a product and make sure `identity` owns it.
async fn owned_product(
    state: &AppState,
    identity: &CurrentIdentity,
    id: &ProductId,
) -> Result<Option<Product>> {
    let product = state.api().product(id).await?;
    if product.vendor_email == identity.email {
        Ok(Some(product))
    } else {
        tracing::warn!(product = %id, owner = %product.vendor_email, "Vendor tried to modify another vendor's product");
        Ok(None)
    }
}

/// Vendor dashboard root.
pub async fn index(_vendor: RequireVendor) -> Redirect {
    Redirect::to("/vendor/products")
}

/// List the vendor's products with their review status.
#[instrument(skip_all, fields(email = %identity.email))]
pub async fn products(
    State(state): State<AppState>,
    RequireVendor { identity, role, .. }: RequireVendor,
) -> Result<VendorProductsTemplate> {
    let products = state.api().vendor_products(&identity.credentials()).await?;
    let currency = state.config().currency;
    Ok(VendorProductsTemplate {
        layout: Layout::for_identity(&state, &identity, role).await,
        products: products
            .iter()
            .map(|product| ProductCard::new(product, currency))
            .collect(),
    })
}

/// New product form.
pub async fn new_product(
    State(state): State<AppState>,
    RequireVendor { identity, role, .. }: RequireVendor,
) -> ProductFormTemplate {
    ProductFormTemplate {
        layout: Layout::for_identity(&state, &identity, role).await,
        heading: "Add product",
        action: "/vendor/products".to_string(),
        form: FormState::empty(),
    }
}

/// Create a product.
#[instrument(skip_all, fields(email = %identity.email))]
pub async fn create_product(
    State(state): State<AppState>,
    RequireVendor { identity, role, .. }: RequireVendor,
    Form(form): Form<ProductForm>,
) -> Result<Response> {
    let input = match form.validate() {
        Ok(input) => input,
        Err(errors) => {
            return Ok((
                StatusCode::UNPROCESSABLE_ENTITY,
                ProductFormTemplate {
                    layout: Layout::for_identity(&state, &identity, role).await,
                    heading: "Add product",
                    action: "/vendor/products".to_string(),
                    form: FormState::with_errors(form, errors),
                },
            )
                .into_response());
        }
    };

    state
        .api()
        .create_product(&identity.credentials(), &input)
        .await?;
    tracing::info!(item = %input.item_name, "Product submitted");
    state
        .notifications()
        .push(
            &identity.email,
            Notice::info("Product submitted. It will be listed once approved."),
        )
        .await;
    Ok(Redirect::to("/vendor/products").into_response())
}

/// Edit product form.
#[instrument(skip_all, fields(email = %identity.email, product = %id))]
pub async fn edit_product(
    State(state): State<AppState>,
    RequireVendor { identity, role, .. }: RequireVendor,
    Path(id): Path<String>,
) -> Result<Response> {
    let id = ProductId::new(id);
    let Some(product) = owned_product(&state, &identity, &id).await? else {
        return Ok(Redirect::to(FORBIDDEN_PATH).into_response());
    };

    Ok(ProductFormTemplate {
        layout: Layout::for_identity(&state, &identity, role).await,
        heading: "Update product",
        action: format!("/vendor/products/{}", urlencoding::encode(id.as_str())),
        form: FormState::with_errors(
            ProductForm::from_product(&product),
            crate::validation::FieldErrors::new(),
        ),
    }
    .into_response())
}

/// Update a product. The backend records the new price in its history.
#[instrument(skip_all, fields(email = %identity.email, product = %id))]
pub async fn update_product(
    State(state): State<AppState>,
    RequireVendor { identity, role, .. }: RequireVendor,
    Path(id): Path<String>,
    Form(form): Form<ProductForm>,
) -> Result<Response> {
    let id = ProductId::new(id);
    let input = match form.validate() {
        Ok(input) => input,
        Err(errors) => {
            return Ok((
                StatusCode::UNPROCESSABLE_ENTITY,
                ProductFormTemplate {
                    layout: Layout::for_identity(&state, &identity, role).await,
                    heading: "Update product",
                    action: format!("/vendor/products/{}", urlencoding::encode(id.as_str())),
                    form: FormState::with_errors(form, errors),
                },
            )
                .into_response());
        }
    };

    if owned_product(&state, &identity, &id).await?.is_none() {
        return Ok(Redirect::to(FORBIDDEN_PATH).into_response());
    }

    state
        .api()
        .update_product(&identity.credentials(), &id, &input)
        .await?;
    state
        .notifications()
        .push(&identity.email, Notice::info("Product updated."))
        .await;
    Ok(Redirect::to("/vendor/products").into_response())
}

/// Delete a product.
#[instrument(skip_all, fields(email = %identity.email, product = %id))]
pub async fn delete_product(
    State(state): State<AppState>,
    RequireVendor { identity, .. }: RequireVendor,
    Path(id): Path<String>,
) -> Result<Redirect> {
    let id = ProductId::new(id);
    if owned_product(&state, &identity, &id).await?.is_none() {
        return Err(AppError::NotFound(format!("product {id}")));
    }

    state
        .api()
        .delete_product(&identity.credentials(), &id)
        .await?;
    state
        .notifications()
        .push(&identity.email, Notice::info("Product deleted."))
        .await;
    Ok(Redirect::to("/vendor/products"))
}

/// List the vendor's advertisements.
#[instrument(skip_all, fields(email = %identity.email))]
pub async fn ads(
    State(state): State<AppState>,
    RequireVendor { identity, role, .. }: RequireVendor,
) -> Result<VendorAdsTemplate> {
    let ads = state.api().vendor_ads(&identity.credentials()).await?;
    Ok(VendorAdsTemplate {
        layout: Layout::for_identity(&state, &identity, role).await,
        ads: ads.iter().map(VendorAdView::from).collect(),
    })
}

/// New advertisement form.
pub async fn new_ad(
    State(state): State<AppState>,
    RequireVendor { identity, role, .. }: RequireVendor,
) -> AdFormTemplate {
    AdFormTemplate {
        layout: Layout::for_identity(&state, &identity, role).await,
        form: FormState::empty(),
    }
}

/// Create an advertisement.
#[instrument(skip_all, fields(email = %identity.email))]
pub async fn create_ad(
    State(state): State<AppState>,
    RequireVendor { identity, role, .. }: RequireVendor,
    Form(form): Form<AdForm>,
) -> Result<Response> {
    let input = match form.validate() {
        Ok(input) => input,
        Err(errors) => {
            return Ok((
                StatusCode::UNPROCESSABLE_ENTITY,
                AdFormTemplate {
                    layout: Layout::for_identity(&state, &identity, role).await,
                    form: FormState::with_errors(form, errors),
                },
            )
                .into_response());
        }
    };

    state.api().create_ad(&identity.credentials(), &input).await?;
    state
        .notifications()
        .push(
            &identity.email,
            Notice::info("Advertisement submitted for review."),
        )
        .await;
    Ok(Redirect::to("/vendor/ads").into_response())
}
