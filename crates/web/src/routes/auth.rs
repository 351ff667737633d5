//! Authentication route handlers.
//!
//! Sign-in and sign-up go through the identity provider; the resulting
//! identity lives in the session. Role lookup is left to the guards.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use super::{FormState, Layout};
use crate::error::{AppError, Result, clear_sentry_user};
use crate::identity::{IdentityError, Profile};
use crate::middleware::Viewer;
use crate::roles::safe_return_path;
use crate::state::AppState;
use crate::validation::{LoginForm, RegisterForm};

/// Query parameters for the auth pages.
#[derive(Debug, Default, Deserialize)]
pub struct RedirectQuery {
    pub redirect: Option<String>,
}

/// Sign-in page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub layout: Layout,
    pub form: FormState<LoginForm>,
    pub error: Option<String>,
    pub redirect: String,
}

/// Sign-up page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/register.html")]
pub struct RegisterTemplate {
    pub layout: Layout,
    pub form: FormState<RegisterForm>,
    pub error: Option<String>,
    pub redirect: String,
}

/// Display the sign-in page.
pub async fn login_page(
    State(state): State<AppState>,
    viewer: Viewer,
    Query(query): Query<RedirectQuery>,
) -> Response {
    let redirect = safe_return_path(query.redirect.as_deref()).to_string();
    if viewer.identity.is_some() {
        return Redirect::to(&redirect).into_response();
    }

    LoginTemplate {
        layout: Layout::for_viewer(&state, &viewer).await,
        form: FormState::empty(),
        error: None,
        redirect,
    }
    .into_response()
}

/// Identity errors the user can fix by editing the form.
const fn is_user_facing(err: &IdentityError) -> bool {
    matches!(
        err,
        IdentityError::InvalidCredentials
            | IdentityError::EmailExists
            | IdentityError::WeakPassword(_)
            | IdentityError::InvalidEmail(_)
    )
}

/// Handle sign-in.
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    let redirect = safe_return_path(form.redirect.as_deref()).to_string();

    let login = match form.validate() {
        Ok(login) => login,
        Err(errors) => {
            return Ok((
                StatusCode::UNPROCESSABLE_ENTITY,
                LoginTemplate {
                    layout: Layout::default(),
                    form: FormState::with_errors(form, errors),
                    error: None,
                    redirect,
                },
            )
                .into_response());
        }
    };

    match state
        .sessions()
        .sign_in(&session, &login.email, &login.password)
        .await
    {
        Ok(identity) => {
            tracing::info!(email = %identity.email, "Sign-in succeeded");
            Ok(Redirect::to(&redirect).into_response())
        }
        Err(e) if is_user_facing(&e) => {
            tracing::info!(email = %login.email, error = %e, "Sign-in rejected");
            Ok((
                StatusCode::UNAUTHORIZED,
                LoginTemplate {
                    layout: Layout::default(),
                    form: FormState::with_errors(
                        LoginForm {
                            password: String::new(),
                            ..form
                        },
                        crate::validation::FieldErrors::new(),
                    ),
                    error: Some(e.user_message().to_string()),
                    redirect,
                },
            )
                .into_response())
        }
        Err(e) => Err(AppError::Identity(e)),
    }
}

/// Display the sign-up page.
pub async fn register_page(
    State(state): State<AppState>,
    viewer: Viewer,
    Query(query): Query<RedirectQuery>,
) -> Response {
    let redirect = safe_return_path(query.redirect.as_deref()).to_string();
    if viewer.identity.is_some() {
        return Redirect::to(&redirect).into_response();
    }

    RegisterTemplate {
        layout: Layout::for_viewer(&state, &viewer).await,
        form: FormState::empty(),
        error: None,
        redirect,
    }
    .into_response()
}

/// Handle sign-up.
#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RegisterForm>,
) -> Result<Response> {
    let redirect = safe_return_path(form.redirect.as_deref()).to_string();

    let registration = match form.validate() {
        Ok(registration) => registration,
        Err(errors) => {
            return Ok((
                StatusCode::UNPROCESSABLE_ENTITY,
                RegisterTemplate {
                    layout: Layout::default(),
                    form: FormState::with_errors(
                        RegisterForm {
                            password: String::new(),
                            ..form
                        },
                        errors,
                    ),
                    error: None,
                    redirect,
                },
            )
                .into_response());
        }
    };

    let profile = Profile {
        display_name: Some(registration.name),
        photo_url: registration.photo_url,
    };

    match state
        .sessions()
        .sign_up(
            &session,
            &registration.email,
            &registration.password,
            profile,
        )
        .await
    {
        Ok(identity) => {
            tracing::info!(email = %identity.email, "Sign-up succeeded");
            Ok(Redirect::to(&redirect).into_response())
        }
        Err(e) if is_user_facing(&e) => {
            tracing::info!(email = %registration.email, error = %e, "Sign-up rejected");
            Ok((
                StatusCode::UNPROCESSABLE_ENTITY,
                RegisterTemplate {
                    layout: Layout::default(),
                    form: FormState::with_errors(
                        RegisterForm {
                            password: String::new(),
                            ..form
                        },
                        crate::validation::FieldErrors::new(),
                    ),
                    error: Some(e.user_message().to_string()),
                    redirect,
                },
            )
                .into_response())
        }
        Err(e) => Err(AppError::Identity(e)),
    }
}

/// Handle sign-out.
#[instrument(skip_all)]
pub async fn logout(State(state): State<AppState>, session: Session) -> Result<Redirect> {
    state.sessions().sign_out(&session).await?;
    clear_sentry_user();
    Ok(Redirect::to("/"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_user_facing_errors() {
        assert!(is_user_facing(&IdentityError::InvalidCredentials));
        assert!(is_user_facing(&IdentityError::WeakPassword("short".to_string())));
        assert!(!is_user_facing(&IdentityError::Provider("QUOTA".to_string())));
        assert!(!is_user_facing(&IdentityError::TokenRevoked));
    }

    #[test]
    fn test_login_page_keeps_redirect() {
        let html = LoginTemplate {
            layout: Layout::default(),
            form: FormState::empty(),
            error: Some("Invalid email or password.".to_string()),
            redirect: "/cart".to_string(),
        }
        .render()
        .unwrap();
        assert!(html.contains(r#"name="redirect" value="/cart""#));
        assert!(html.contains("Invalid email or password."));
    }
}
