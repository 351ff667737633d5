//! Request ID middleware for request tracing and correlation.
//!
//! Uses the upstream `x-request-id` header when present, otherwise generates
//! a UUID v4. The ID is recorded on the tracing span, tagged on the Sentry
//! scope and echoed in the response.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::Span;
use uuid::Uuid;

/// The HTTP header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Middleware that ensures every request has a unique request ID.
pub async fn request_id_middleware(request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .filter(|id| !id.is_empty() && id.len() <= 128)
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    Span::current().record("request_id", &request_id);
    sentry::configure_scope(|scope| {
        scope.set_tag("request_id", &request_id);
    });

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}
