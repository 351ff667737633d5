//! Admin dashboard route handlers.
//!
//! Admins moderate products, advertisements and vendor applications, and
//! manage user roles. Every action that changes someone's role invalidates
//! that identity's cached role so their next navigation sees it.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    response::Redirect,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;

use market_pulse_core::{
    AdvertisementId, ApprovalStatus, Email, ProductId, Role, VendorApplicationId,
};

use super::orders::{OrderView, order_views};
use super::products::{Pagination, ProductCard};
use super::{Layout, format_price};
use crate::api::Credentials;
use crate::api::types::{Advertisement, ProductQuery, UserRecord, VendorApplication};
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::services::Notice;
use crate::state::AppState;
use crate::validation::{FieldErrors, StatusForm};

/// Products per page on the moderation list.
const ADMIN_PAGE_SIZE: u32 = 20;

/// User row display data.
#[derive(Debug, Clone)]
pub struct UserView {
    pub email: String,
    pub name: String,
    pub role: Role,
    pub is_self: bool,
}

impl UserView {
    #[must_use]
    pub fn role_label(&self) -> &'static str {
        self.role.as_str()
    }

    /// Roles this user can be switched to.
    #[must_use]
    pub fn other_roles(&self) -> Vec<&'static str> {
        Role::ALL
            .into_iter()
            .filter(|role| *role != self.role)
            .map(Role::as_str)
            .collect()
    }
}

/// Advertisement row display data.
#[derive(Debug, Clone)]
pub struct AdminAdView {
    pub id: String,
    pub title: String,
    pub description: String,
    pub vendor: String,
    pub image: Option<String>,
    pub status: ApprovalStatus,
}

impl AdminAdView {
    #[must_use]
    pub fn status_label(&self) -> &'static str {
        self.status.as_str()
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }

    #[must_use]
    pub fn review_action(&self) -> String {
        format!("/admin/ads/{}/status", self.id)
    }
}

impl From<&Advertisement> for AdminAdView {
    fn from(ad: &Advertisement) -> Self {
        Self {
            id: ad.id.to_string(),
            title: ad.title.clone(),
            description: ad.description.clone(),
            vendor: ad.vendor_email.to_string(),
            image: ad.image.clone(),
            status: ad.status,
        }
    }
}

/// Vendor application row display data.
#[derive(Debug, Clone)]
pub struct ApplicationView {
    pub id: String,
    pub email: String,
    pub name: String,
    pub market: String,
    pub description: String,
    pub status: ApprovalStatus,
}

impl ApplicationView {
    #[must_use]
    pub fn status_label(&self) -> &'static str {
        self.status.as_str()
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }

    #[must_use]
    pub fn review_action(&self) -> String {
        format!("/admin/vendor-applications/{}/status", self.id)
    }
}

impl From<&VendorApplication> for ApplicationView {
    fn from(application: &VendorApplication) -> Self {
        Self {
            id: application.id.to_string(),
            email: application.email.to_string(),
            name: application.name.clone().unwrap_or_default(),
            market: application.market_name.clone(),
            description: application.description.clone(),
            status: application.status,
        }
    }
}

/// Users page template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/users.html")]
pub struct UsersTemplate {
    pub layout: Layout,
    pub users: Vec<UserView>,
}

/// Product moderation template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/products.html")]
pub struct AdminProductsTemplate {
    pub layout: Layout,
    pub products: Vec<ProductCard>,
    pub pagination: Pagination,
}

/// Advertisement moderation template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/ads.html")]
pub struct AdminAdsTemplate {
    pub layout: Layout,
    pub ads: Vec<AdminAdView>,
}

/// Vendor applications template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/vendor_applications.html")]
pub struct ApplicationsTemplate {
    pub layout: Layout,
    pub applications: Vec<ApplicationView>,
}

/// All orders template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/orders.html")]
pub struct AdminOrdersTemplate {
    pub layout: Layout,
    pub orders: Vec<OrderView>,
    pub revenue: String,
}

/// Role change form data.
#[derive(Debug, Deserialize)]
pub struct RoleForm {
    pub role: String,
}

/// Page query for the moderation list.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
}

/// Queue a notice listing the form's field errors.
async fn reject_form(state: &AppState, admin: &Email, errors: &FieldErrors) {
    let message = ["status", "feedback"]
        .into_iter()
        .filter_map(|field| errors.get(field))
        .collect::<Vec<_>>()
        .join(" ");
    state
        .notifications()
        .push(admin, Notice::error(message))
        .await;
}

/// Admin dashboard root.
pub async fn index(_admin: RequireAdmin) -> Redirect {
    Redirect::to("/admin/users")
}

/// List users and their roles.
#[instrument(skip_all, fields(email = %identity.email))]
pub async fn users(
    State(state): State<AppState>,
    RequireAdmin { identity, role, .. }: RequireAdmin,
) -> Result<UsersTemplate> {
    let records: Vec<UserRecord> = state.api().users(&identity.credentials()).await?;
    Ok(UsersTemplate {
        layout: Layout::for_identity(&state, &identity, role).await,
        users: records
            .into_iter()
            .map(|user| UserView {
                is_self: user.email == identity.email,
                email: user.email.to_string(),
                name: user.name.unwrap_or_default(),
                role: user.role,
            })
            .collect(),
    })
}

/// Change a user's role.
#[instrument(skip_all, fields(email = %identity.email, target = %target))]
pub async fn set_role(
    State(state): State<AppState>,
    RequireAdmin { identity, .. }: RequireAdmin,
    Path(target): Path<String>,
    Form(form): Form<RoleForm>,
) -> Result<Redirect> {
    let target = Email::parse(&target).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let new_role: Role = form
        .role
        .parse()
        .map_err(|_| AppError::BadRequest(format!("unknown role: {}", form.role)))?;

    if target == identity.email {
        state
            .notifications()
            .push(&identity.email, Notice::error("You cannot change your own role."))
            .await;
        return Ok(Redirect::to("/admin/users"));
    }

    state
        .api()
        .set_user_role(&identity.credentials(), &target, new_role)
        .await?;
    state.roles().invalidate(&target).await;

    tracing::info!(role = %new_role, "Role changed");
    state
        .notifications()
        .push(
            &identity.email,
            Notice::info(format!("{target} is now {new_role}.")),
        )
        .await;
    Ok(Redirect::to("/admin/users"))
}

/// List every product for moderation.
#[instrument(skip_all, fields(email = %identity.email))]
pub async fn products(
    State(state): State<AppState>,
    RequireAdmin { identity, role, .. }: RequireAdmin,
    Query(query): Query<PageQuery>,
) -> Result<AdminProductsTemplate> {
    let current = query.page.unwrap_or(1).max(1);
    let request = ProductQuery {
        page: current,
        limit: ADMIN_PAGE_SIZE,
        sort: None,
        status: None,
    };
    let page = state
        .api()
        .products(Some(&identity.credentials()), &request)
        .await?;
    let currency = state.config().currency;

    Ok(AdminProductsTemplate {
        layout: Layout::for_identity(&state, &identity, role).await,
        products: page
            .items
            .iter()
            .map(|product| ProductCard::new(product, currency))
            .collect(),
        pagination: Pagination::admin(&page, current),
    })
}

/// Approve or reject a product. A rejection carries feedback for the vendor.
#[instrument(skip_all, fields(email = %identity.email, product = %id))]
pub async fn set_product_status(
    State(state): State<AppState>,
    RequireAdmin { identity, .. }: RequireAdmin,
    Path(id): Path<String>,
    Form(form): Form<StatusForm>,
) -> Result<Redirect> {
    let update = match form.validate() {
        Ok(update) => update,
        Err(errors) => {
            reject_form(&state, &identity.email, &errors).await;
            return Ok(Redirect::to("/admin/products"));
        }
    };

    state
        .api()
        .set_product_status(&identity.credentials(), &ProductId::new(id), &update)
        .await?;
    tracing::info!(status = %update.status, "Product moderated");
    Ok(Redirect::to("/admin/products"))
}

/// List every advertisement.
#[instrument(skip_all, fields(email = %identity.email))]
pub async fn ads(
    State(state): State<AppState>,
    RequireAdmin { identity, role, .. }: RequireAdmin,
) -> Result<AdminAdsTemplate> {
    let ads = state.api().ads(Some(&identity.credentials()), None).await?;
    Ok(AdminAdsTemplate {
        layout: Layout::for_identity(&state, &identity, role).await,
        ads: ads.iter().map(AdminAdView::from).collect(),
    })
}

/// Approve or reject an advertisement.
#[instrument(skip_all, fields(email = %identity.email, ad = %id))]
pub async fn set_ad_status(
    State(state): State<AppState>,
    RequireAdmin { identity, .. }: RequireAdmin,
    Path(id): Path<String>,
    Form(form): Form<StatusForm>,
) -> Result<Redirect> {
    let update = match form.validate() {
        Ok(update) => update,
        Err(errors) => {
            reject_form(&state, &identity.email, &errors).await;
            return Ok(Redirect::to("/admin/ads"));
        }
    };

    state
        .api()
        .set_ad_status(
            &identity.credentials(),
            &AdvertisementId::new(id),
            update.status,
        )
        .await?;
    tracing::info!(status = %update.status, "Advertisement moderated");
    Ok(Redirect::to("/admin/ads"))
}

/// List vendor applications.
#[instrument(skip_all, fields(email = %identity.email))]
pub async fn vendor_applications(
    State(state): State<AppState>,
    RequireAdmin { identity, role, .. }: RequireAdmin,
) -> Result<ApplicationsTemplate> {
    let applications = state
        .api()
        .vendor_applications(&identity.credentials())
        .await?;
    Ok(ApplicationsTemplate {
        layout: Layout::for_identity(&state, &identity, role).await,
        applications: applications.iter().map(ApplicationView::from).collect(),
    })
}

/// Grant the vendor role to an approved applicant.
async fn promote_to_vendor(
    state: &AppState,
    credentials: &Credentials,
    applicant: &Email,
) -> Result<()> {
    state
        .api()
        .set_user_role(credentials, applicant, Role::Vendor)
        .await?;
    state.roles().invalidate(applicant).await;
    tracing::info!(applicant = %applicant, "Applicant promoted to vendor");
    Ok(())
}

/// Approve or reject a vendor application. Approval makes the applicant a
/// vendor.
#[instrument(skip_all, fields(email = %identity.email, application = %id))]
pub async fn set_application_status(
    State(state): State<AppState>,
    RequireAdmin { identity, .. }: RequireAdmin,
    Path(id): Path<String>,
    Form(form): Form<StatusForm>,
) -> Result<Redirect> {
    let update = match form.validate() {
        Ok(update) => update,
        Err(errors) => {
            reject_form(&state, &identity.email, &errors).await;
            return Ok(Redirect::to("/admin/vendor-applications"));
        }
    };

    let credentials = identity.credentials();
    let id = VendorApplicationId::new(id);
    let application = state
        .api()
        .vendor_applications(&credentials)
        .await?
        .into_iter()
        .find(|application| application.id == id)
        .ok_or_else(|| AppError::NotFound(format!("vendor application {id}")))?;

    state
        .api()
        .set_vendor_application_status(&credentials, &id, update.status)
        .await?;
    if update.status == ApprovalStatus::Approved {
        promote_to_vendor(&state, &credentials, &application.email).await?;
    }

    state
        .notifications()
        .push(
            &identity.email,
            Notice::info(format!(
                "Application from {} {}.",
                application.email, update.status
            )),
        )
        .await;
    Ok(Redirect::to("/admin/vendor-applications"))
}

/// List every order.
#[instrument(skip_all, fields(email = %identity.email))]
pub async fn orders(
    State(state): State<AppState>,
    RequireAdmin { identity, role, .. }: RequireAdmin,
) -> Result<AdminOrdersTemplate> {
    let orders = state.api().all_orders(&identity.credentials()).await?;
    let currency = state.config().currency;
    let revenue: Decimal = orders.iter().map(|order| order.total).sum();

    Ok(AdminOrdersTemplate {
        layout: Layout::for_identity(&state, &identity, role).await,
        orders: order_views(&orders, currency),
        revenue: format_price(currency, revenue),
    })
}
