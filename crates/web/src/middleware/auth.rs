//! Role-guarded extractors.
//!
//! [`RequireRole`] runs the route guard for a [`RolePolicy`] before the
//! handler: it reads the session (refreshing an expired token), resolves the
//! role through the shared cache and turns the guard decision into either the
//! handler's input or a rejection response.
//!
//! ```rust,ignore
//! async fn dashboard(RequireVendor { identity, .. }: RequireVendor) -> impl IntoResponse {
//!     format!("Hello, {}!", identity.greeting_name())
//! }
//! ```

use std::marker::PhantomData;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{FromRequestParts, OriginalUri},
    http::{HeaderMap, Method, StatusCode, header, request::Parts},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};
use tokio::time::Instant;
use tower_sessions::Session;

use market_pulse_core::{Role, RoleSet};

use crate::models::{CurrentIdentity, SessionState};
use crate::roles::{
    FORBIDDEN_PATH, GuardDecision, RoleState, RouteGuard, login_redirect_target, safe_return_path,
};
use crate::services::Notice;
use crate::state::AppState;

/// Seconds the loading page waits before asking again.
const LOADING_REFRESH_SECONDS: u64 = 1;

/// Shown after a form submission arrived before the role was known.
pub const SUBMISSION_DROPPED: &str =
    "Your account was still loading, so that action was not applied. Please try again.";

/// The set of roles a route admits.
pub trait RolePolicy: Send + Sync + 'static {
    const PERMITTED: RoleSet;
}

/// Any signed-in identity with a resolved role.
pub struct AnyRole;
/// Shoppers.
pub struct UserOnly;
/// Vendors.
pub struct VendorOnly;
/// Administrators.
pub struct AdminOnly;

impl RolePolicy for AnyRole {
    const PERMITTED: RoleSet = RoleSet::ALL;
}

impl RolePolicy for UserOnly {
    const PERMITTED: RoleSet = RoleSet::USER;
}

impl RolePolicy for VendorOnly {
    const PERMITTED: RoleSet = RoleSet::VENDOR;
}

impl RolePolicy for AdminOnly {
    const PERMITTED: RoleSet = RoleSet::ADMIN;
}

/// Extractor that admits only identities whose role `P` permits.
pub struct RequireRole<P: RolePolicy> {
    pub identity: CurrentIdentity,
    pub role: Role,
    _policy: PhantomData<P>,
}

pub type RequireSignedIn = RequireRole<AnyRole>;
pub type RequireUser = RequireRole<UserOnly>;
pub type RequireVendor = RequireRole<VendorOnly>;
pub type RequireAdmin = RequireRole<AdminOnly>;

/// Rejection produced by [`RequireRole`].
#[derive(Debug)]
pub enum GuardRejection {
    /// Session or role still resolving; render the loading page for `path`.
    Loading { path: String, htmx: bool },
    /// Redirect to sign-in, returning to `return_to` afterwards.
    RedirectToLogin { return_to: String, htmx: bool },
    /// Redirect to the forbidden page.
    Forbidden { htmx: bool },
    /// Unauthenticated API request.
    Unauthorized,
    /// Authenticated API request without a permitted role.
    ApiForbidden,
    /// The session layer is not installed.
    MissingSession,
}

/// Page shown while the guard is still waiting on the session or role.
#[derive(Template, WebTemplate)]
#[template(path = "loading.html")]
pub struct LoadingTemplate {
    pub path: String,
    pub refresh_seconds: u64,
}

/// Redirect that also works for HTMX requests, which follow `HX-Redirect`
/// instead of a 3xx.
fn redirect(target: &str, htmx: bool) -> Response {
    if htmx {
        (AppendHeaders([("HX-Redirect", target.to_string())]), StatusCode::OK).into_response()
    } else {
        Redirect::to(target).into_response()
    }
}

impl IntoResponse for GuardRejection {
    fn into_response(self) -> Response {
        match self {
            Self::Loading { path, htmx } => {
                if htmx {
                    return redirect(&path, true);
                }
                LoadingTemplate {
                    path,
                    refresh_seconds: LOADING_REFRESH_SECONDS,
                }
                .into_response()
            }
            Self::RedirectToLogin { return_to, htmx } => {
                redirect(&login_redirect_target(&return_to), htmx)
            }
            Self::Forbidden { htmx } => redirect(FORBIDDEN_PATH, htmx),
            Self::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
            Self::ApiForbidden => StatusCode::FORBIDDEN.into_response(),
            Self::MissingSession => {
                tracing::error!("Session layer missing from request extensions");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

fn is_htmx(headers: &HeaderMap) -> bool {
    headers.contains_key("hx-request")
}

/// Path to come back to after sign-in.
///
/// For a page load that is the request itself. A form post or HTMX action
/// returns to the page it was made from (`HX-Current-URL`, else `Referer`).
fn return_path(method: &Method, uri_path_and_query: &str, headers: &HeaderMap) -> String {
    if method == Method::GET {
        return safe_return_path(Some(uri_path_and_query)).to_string();
    }
    let origin = headers
        .get("hx-current-url")
        .or_else(|| headers.get(header::REFERER))
        .and_then(|value| value.to_str().ok())
        .and_then(|url| url::Url::parse(url).ok())
        .map(|url| match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_string(),
        });
    safe_return_path(origin.as_deref()).to_string()
}

impl<P: RolePolicy> FromRequestParts<AppState> for RequireRole<P> {
    type Rejection = GuardRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or(GuardRejection::MissingSession)?;

        let wait = state.config().role_resolution_wait;
        let deadline = Instant::now() + wait;

        let session_state = state.sessions().current(&session, wait).await;
        let role_state = match &session_state.identity {
            Some(identity) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                state
                    .roles()
                    .resolve_within(&identity.credentials(), remaining)
                    .await
            }
            None => RoleState::Pending,
        };

        // Nested routers strip their prefix from `parts.uri`.
        let uri = parts
            .extensions
            .get::<OriginalUri>()
            .map_or(&parts.uri, |original| &original.0);
        let path = uri
            .path_and_query()
            .map_or_else(|| uri.path(), |pq| pq.as_str());
        let is_api = uri.path().starts_with("/api/");
        let htmx = is_htmx(&parts.headers);

        let decision = RouteGuard::new(P::PERMITTED).evaluate(&session_state, role_state, path);
        tracing::debug!(path, decision = ?decision, "Route guard");

        match (decision, session_state.identity) {
            (GuardDecision::Render(role), Some(identity)) => {
                crate::error::set_sentry_user(&identity.uid, identity.email.as_str());
                Ok(Self {
                    identity,
                    role,
                    _policy: PhantomData,
                })
            }
            (GuardDecision::Loading, identity) => {
                if parts.method != Method::GET
                    && let Some(identity) = identity
                {
                    tracing::info!(path, "Submission arrived before role was resolved");
                    state
                        .notifications()
                        .push(&identity.email, Notice::error(SUBMISSION_DROPPED))
                        .await;
                }
                Err(GuardRejection::Loading {
                    path: return_path(&parts.method, path, &parts.headers),
                    htmx,
                })
            }
            (GuardDecision::RedirectToLogin { .. }, _) if is_api => {
                Err(GuardRejection::Unauthorized)
            }
            (GuardDecision::RedirectToLogin { .. }, _) => Err(GuardRejection::RedirectToLogin {
                return_to: return_path(&parts.method, path, &parts.headers),
                htmx,
            }),
            (GuardDecision::Forbidden | GuardDecision::Render(_), _) if is_api => {
                Err(GuardRejection::ApiForbidden)
            }
            (GuardDecision::Forbidden | GuardDecision::Render(_), _) => {
                Err(GuardRejection::Forbidden { htmx })
            }
        }
    }
}

/// The visitor on a public page.
///
/// Never blocks on role resolution: the role comes from the cache, and a
/// missing role is looked up in the background for the next page.
pub struct Viewer {
    pub identity: Option<CurrentIdentity>,
    pub role: Option<Role>,
}

impl Viewer {
    /// Credentials for the signed-in visitor, if any.
    #[must_use]
    pub fn credentials(&self) -> Option<crate::api::Credentials> {
        self.identity.as_ref().map(CurrentIdentity::credentials)
    }
}

impl FromRequestParts<AppState> for Viewer {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session_state = match parts.extensions.get::<Session>() {
            Some(session) => {
                state
                    .sessions()
                    .current(session, state.config().role_resolution_wait)
                    .await
            }
            None => SessionState::signed_out(),
        };

        let Some(identity) = session_state.identity else {
            return Ok(Self {
                identity: None,
                role: None,
            });
        };

        let role = state.roles().cached(&identity.email).await;
        if role.is_none() {
            drop(state.roles().spawn_resolve(identity.credentials()));
        }

        Ok(Self {
            identity: Some(identity),
            role,
        })
    }
}
