//! Role resolution and route guarding.
//!
//! - [`resolver`] - Cached, coalesced role lookups against the backend
//! - [`guard`] - Pure navigation decisions for a set of permitted roles

pub mod guard;
pub mod resolver;

pub use guard::{
    FORBIDDEN_PATH, GuardDecision, LOGIN_PATH, RoleState, RouteGuard, login_redirect_target,
    safe_return_path,
};
pub use resolver::{RoleError, RoleResolver, RoleSource};
