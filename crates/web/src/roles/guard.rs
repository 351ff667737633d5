//! Route guard decisions.
//!
//! [`RouteGuard::evaluate`] is a pure function of the session state, the
//! role resolution state and the requested path. The axum extractors in
//! `middleware::auth` turn its decision into a response.

use market_pulse_core::{Role, RoleSet};

use crate::models::SessionState;

/// Sign-in page.
pub const LOGIN_PATH: &str = "/login";

/// Page shown when the signed-in identity lacks the required role.
pub const FORBIDDEN_PATH: &str = "/forbidden";

/// Where role resolution stands for the current identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleState {
    /// The lookup has not finished. Never treated as any particular role.
    Pending,
    /// The backend answered.
    Resolved(Role),
    /// The lookup failed.
    Failed,
}

/// What to do with a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Session or role still resolving; show a loading indicator.
    Loading,
    /// No one is signed in; send them to sign-in, then back to `return_to`.
    RedirectToLogin {
        /// The originally requested path.
        return_to: String,
    },
    /// Signed in without a permitted role, or the role lookup failed.
    Forbidden,
    /// Render the guarded page.
    Render(Role),
}

/// Guard for a set of permitted roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteGuard {
    permitted: RoleSet,
}

impl RouteGuard {
    #[must_use]
    pub const fn new(permitted: RoleSet) -> Self {
        Self { permitted }
    }

    #[must_use]
    pub const fn permitted(self) -> RoleSet {
        self.permitted
    }

    /// Decide what a navigation to `path` should do.
    #[must_use]
    pub fn evaluate(self, session: &SessionState, role: RoleState, path: &str) -> GuardDecision {
        if session.is_resolving {
            return GuardDecision::Loading;
        }
        if session.identity.is_none() {
            return GuardDecision::RedirectToLogin {
                return_to: path.to_string(),
            };
        }
        match role {
            RoleState::Pending => GuardDecision::Loading,
            RoleState::Failed => GuardDecision::Forbidden,
            RoleState::Resolved(role) if self.permitted.contains(role) => {
                GuardDecision::Render(role)
            }
            RoleState::Resolved(_) => GuardDecision::Forbidden,
        }
    }
}

/// Sign-in URL that returns to `path` afterwards.
#[must_use]
pub fn login_redirect_target(path: &str) -> String {
    format!("{LOGIN_PATH}?redirect={}", urlencoding::encode(path))
}

/// Accept a post-sign-in return path only if it stays on this site.
#[must_use]
pub fn safe_return_path(candidate: Option<&str>) -> &str {
    match candidate {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path
        }
        _ => "/",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use market_pulse_core::Email;

    use crate::models::{AuthTokens, CurrentIdentity};

    fn signed_in() -> SessionState {
        SessionState::signed_in(CurrentIdentity {
            uid: "uid-1".to_string(),
            email: Email::parse("someone@market.example").unwrap(),
            display_name: None,
            photo_url: None,
            tokens: AuthTokens::new("id".into(), "refresh".into(), 3600),
        })
    }

    /// Every subset of {admin, vendor, user}.
    fn all_role_sets() -> Vec<RoleSet> {
        (0u8..8)
            .map(|bits| {
                Role::ALL
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| bits & (1 << i) != 0)
                    .map(|(_, role)| *role)
                    .collect()
            })
            .collect()
    }

    fn all_role_states() -> Vec<RoleState> {
        let mut states = vec![RoleState::Pending, RoleState::Failed];
        states.extend(Role::ALL.iter().copied().map(RoleState::Resolved));
        states
    }

    #[test]
    fn test_unauthenticated_always_redirects_to_login() {
        for permitted in all_role_sets() {
            for role in all_role_states() {
                let decision =
                    RouteGuard::new(permitted).evaluate(&SessionState::signed_out(), role, "/cart");
                assert_eq!(
                    decision,
                    GuardDecision::RedirectToLogin {
                        return_to: "/cart".to_string()
                    }
                );
            }
        }
    }

    #[test]
    fn test_resolving_session_is_loading() {
        for permitted in all_role_sets() {
            for role in all_role_states() {
                let decision = RouteGuard::new(permitted).evaluate(
                    &SessionState::resolving(),
                    role,
                    "/admin/users",
                );
                assert_eq!(decision, GuardDecision::Loading);
            }
        }
    }

    #[test]
    fn test_pending_role_is_loading_never_forbidden_or_rendered() {
        for permitted in all_role_sets() {
            let decision =
                RouteGuard::new(permitted).evaluate(&signed_in(), RoleState::Pending, "/wishlist");
            assert_eq!(decision, GuardDecision::Loading);
        }
    }

    #[test]
    fn test_failed_role_lookup_is_forbidden() {
        for permitted in all_role_sets() {
            let decision =
                RouteGuard::new(permitted).evaluate(&signed_in(), RoleState::Failed, "/wishlist");
            assert_eq!(decision, GuardDecision::Forbidden);
        }
    }

    #[test]
    fn test_membership_decides_render_or_forbidden() {
        for permitted in all_role_sets() {
            for role in Role::ALL {
                let decision = RouteGuard::new(permitted).evaluate(
                    &signed_in(),
                    RoleState::Resolved(role),
                    "/dashboard",
                );
                if permitted.contains(role) {
                    assert_eq!(decision, GuardDecision::Render(role));
                } else {
                    assert_eq!(decision, GuardDecision::Forbidden);
                }
            }
        }
    }

    #[test]
    fn test_vendor_on_admin_route_is_forbidden() {
        let admin_only = RouteGuard::new(RoleSet::ADMIN);
        let vendor_only = RouteGuard::new(RoleSet::VENDOR);
        let vendor = RoleState::Resolved(Role::Vendor);

        assert_eq!(
            admin_only.evaluate(&signed_in(), vendor, "/admin/users"),
            GuardDecision::Forbidden
        );
        assert_eq!(
            vendor_only.evaluate(&signed_in(), vendor, "/vendor/products"),
            GuardDecision::Render(Role::Vendor)
        );
    }

    #[test]
    fn test_login_redirect_target_encodes_path() {
        assert_eq!(login_redirect_target("/cart"), "/login?redirect=%2Fcart");
        assert_eq!(
            login_redirect_target("/products?page=2"),
            "/login?redirect=%2Fproducts%3Fpage%3D2"
        );
    }

    #[test]
    fn test_safe_return_path() {
        assert_eq!(safe_return_path(Some("/cart")), "/cart");
        assert_eq!(safe_return_path(Some("//evil.example")), "/");
        assert_eq!(safe_return_path(Some("https://evil.example")), "/");
        assert_eq!(safe_return_path(Some("/\\evil.example")), "/");
        assert_eq!(safe_return_path(None), "/");
    }
}
