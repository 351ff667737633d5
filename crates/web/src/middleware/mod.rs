//! HTTP middleware stack.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layers (capture errors, transactions)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Session layer (tower-sessions with in-memory store)
//! 5. Security headers (CSP, frame options, caching)
//!
//! Route guarding is done per handler by the [`auth`] extractors.

pub mod auth;
pub mod request_id;
pub mod security_headers;
pub mod session;

pub use auth::{
    AdminOnly, AnyRole, GuardRejection, RequireAdmin, RequireRole, RequireSignedIn, RequireUser,
    RequireVendor, RolePolicy, UserOnly, VendorOnly, Viewer,
};
pub use request_id::request_id_middleware;
pub use security_headers::security_headers_middleware;
pub use session::create_session_layer;
