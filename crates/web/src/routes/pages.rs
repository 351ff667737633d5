//! Informational pages and the vendor application.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use tracing::instrument;

use super::{FormState, Layout};
use crate::api::types::VendorApplicationInput;
use crate::error::Result;
use crate::middleware::{RequireUser, Viewer};
use crate::services::Notice;
use crate::state::AppState;
use crate::validation::VendorApplicationForm;

/// Forbidden page template.
#[derive(Template, WebTemplate)]
#[template(path = "forbidden.html")]
pub struct ForbiddenTemplate {
    pub layout: Layout,
}

/// Vendor application page template.
#[derive(Template, WebTemplate)]
#[template(path = "become_vendor.html")]
pub struct BecomeVendorTemplate {
    pub layout: Layout,
    pub email: String,
    pub form: FormState<VendorApplicationForm>,
}

/// Display the forbidden page.
///
/// Served with 200: the visitor was redirected here, and the page explains
/// which dashboards they can use.
pub async fn forbidden(State(state): State<AppState>, viewer: Viewer) -> ForbiddenTemplate {
    ForbiddenTemplate {
        layout: Layout::for_viewer(&state, &viewer).await,
    }
}

/// Display the vendor application form.
pub async fn become_vendor_page(
    State(state): State<AppState>,
    RequireUser { identity, role, .. }: RequireUser,
) -> BecomeVendorTemplate {
    BecomeVendorTemplate {
        layout: Layout::for_identity(&state, &identity, role).await,
        email: identity.email.to_string(),
        form: FormState::empty(),
    }
}

/// Submit a vendor application.
#[instrument(skip_all, fields(email = %identity.email))]
pub async fn become_vendor(
    State(state): State<AppState>,
    RequireUser { identity, role, .. }: RequireUser,
    Form(form): Form<VendorApplicationForm>,
) -> Result<Response> {
    let (market_name, description) = match form.validate() {
        Ok(valid) => valid,
        Err(errors) => {
            return Ok(BecomeVendorTemplate {
                layout: Layout::for_identity(&state, &identity, role).await,
                email: identity.email.to_string(),
                form: FormState::with_errors(form, errors),
            }
            .into_response());
        }
    };

    let application = VendorApplicationInput {
        email: identity.email.clone(),
        name: identity.display_name.clone(),
        market_name,
        description,
    };
    state
        .api()
        .apply_for_vendor(&identity.credentials(), &application)
        .await?;

    tracing::info!("Vendor application submitted");
    state
        .notifications()
        .push(
            &identity.email,
            Notice::info("Application sent. An admin will review it shortly."),
        )
        .await;
    Ok(Redirect::to("/").into_response())
}
