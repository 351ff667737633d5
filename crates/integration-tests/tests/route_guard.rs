//! Route guard behavior end to end: redirects, forbidden pages, the loading
//! page and role caching.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use market_pulse_integration_tests::{FakeBackend, TestApp, location};
use market_pulse_web::middleware::auth::SUBMISSION_DROPPED;
use reqwest::StatusCode;

const BUYER: &str = "buyer@market.example";
const VENDOR: &str = "vendor@market.example";
const ADMIN: &str = "admin@market.example";

// =============================================================================
// Signed-out visitors
// =============================================================================

#[tokio::test]
async fn test_signed_out_visitor_is_sent_to_login_with_return_path() {
    let app = TestApp::spawn(FakeBackend::new()).await;

    let response = app.get("/cart").await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/login?redirect=%2Fcart"));
}

#[tokio::test]
async fn test_htmx_request_gets_client_side_redirect() {
    let app = TestApp::spawn(FakeBackend::new()).await;

    let response = app.htmx_get("/cart/items").await;

    assert_eq!(response.status(), StatusCode::OK);
    let target = response
        .headers()
        .get("HX-Redirect")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    assert_eq!(target.as_deref(), Some("/login?redirect=%2Fcart%2Fitems"));
}

#[tokio::test]
async fn test_public_pages_need_no_session() {
    let app = TestApp::spawn(FakeBackend::new()).await;

    assert_eq!(app.get("/health").await.status(), StatusCode::OK);
    assert_eq!(app.get("/").await.status(), StatusCode::OK);
    assert_eq!(app.get("/products").await.status(), StatusCode::OK);
    assert_eq!(app.get("/login").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_login_round_trips_redirect_target() {
    let app = TestApp::spawn(FakeBackend::new().with_user(BUYER, "user")).await;

    let page = app.get("/login?redirect=%2Fcart").await.text().await.unwrap();
    assert!(page.contains(r#"name="redirect" value="/cart""#));

    let response = app
        .client
        .post(app.url("/login"))
        .form(&[
            ("email", BUYER),
            ("password", market_pulse_integration_tests::PASSWORD),
            ("redirect", "/cart"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/cart"));
}

#[tokio::test]
async fn test_wrong_password_rerenders_login() {
    let app = TestApp::spawn(FakeBackend::new().with_user(BUYER, "user")).await;

    let response = app
        .client
        .post(app.url("/login"))
        .form(&[("email", BUYER), ("password", "Wrong-password-1")])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.text().await.unwrap().contains("Sign in"));
}

// =============================================================================
// Role checks
// =============================================================================

#[tokio::test]
async fn test_vendor_is_forbidden_from_admin_pages() {
    let app = TestApp::spawn(FakeBackend::new().with_user(VENDOR, "vendor")).await;
    app.sign_in(VENDOR).await;

    let response = app.get("/admin/users").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/forbidden"));

    let response = app.get("/vendor/products").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.text().await.unwrap().contains("My products"));
}

#[tokio::test]
async fn test_vendor_cannot_use_buyer_cart() {
    let app = TestApp::spawn(FakeBackend::new().with_user(VENDOR, "vendor")).await;
    app.sign_in(VENDOR).await;

    let response = app.get("/cart").await;
    assert_eq!(location(&response), Some("/forbidden"));
}

#[tokio::test]
async fn test_admin_sees_user_list() {
    let backend = FakeBackend::new()
        .with_user(ADMIN, "admin")
        .with_user(BUYER, "user");
    let app = TestApp::spawn(backend).await;
    app.sign_in(ADMIN).await;

    let response = app.get("/admin/users").await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = response.text().await.unwrap();
    assert!(page.contains(BUYER));
}

#[tokio::test]
async fn test_role_is_fetched_once_across_pages() {
    let backend = FakeBackend::new().with_user(BUYER, "user");
    let app = TestApp::spawn(backend.clone()).await;
    app.sign_in(BUYER).await;

    assert_eq!(app.get("/cart").await.status(), StatusCode::OK);
    assert_eq!(app.get("/wishlist").await.status(), StatusCode::OK);

    assert_eq!(backend.role_lookups(), 1);
}

#[tokio::test]
async fn test_slow_role_lookup_renders_loading_page() {
    let backend = FakeBackend::new().with_slow_user(VENDOR, "vendor", Duration::from_millis(800));
    let app = TestApp::spawn_with_role_wait(backend, Duration::from_millis(100)).await;
    app.sign_in(VENDOR).await;

    let response = app.get("/vendor/products").await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = response.text().await.unwrap();
    assert!(page.contains("Checking your access"));
    assert!(page.contains("url=/vendor/products"));

    // The lookup keeps running and fills the cache for the reload.
    tokio::time::sleep(Duration::from_millis(1000)).await;
    let response = app.get("/vendor/products").await;
    assert!(response.text().await.unwrap().contains("My products"));
}

#[tokio::test]
async fn test_form_post_during_role_lookup_returns_to_page_with_notice() {
    let backend = FakeBackend::new()
        .with_slow_user(BUYER, "user", Duration::from_millis(800))
        .with_cart_line(BUYER, "a", 2, "1.50");
    let app = TestApp::spawn_with_role_wait(backend, Duration::from_millis(100)).await;
    app.sign_in(BUYER).await;

    let response = app
        .client
        .post(app.url("/cart/a/increment"))
        .header(reqwest::header::REFERER, app.url("/cart"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page = response.text().await.unwrap();
    assert!(page.contains("Checking your access"));
    assert!(page.contains("url=/cart"));
    assert_eq!(app.backend.quantity_updates(), 0);

    tokio::time::sleep(Duration::from_millis(1000)).await;
    let page = app.get("/cart").await.text().await.unwrap();
    assert!(page.contains(SUBMISSION_DROPPED));
}

#[tokio::test]
async fn test_sign_out_ends_session() {
    let app = TestApp::spawn(FakeBackend::new().with_user(BUYER, "user")).await;
    app.sign_in(BUYER).await;
    assert_eq!(app.get("/cart").await.status(), StatusCode::OK);

    let response = app.client.post(app.url("/logout")).send().await.unwrap();
    assert_eq!(location(&response), Some("/"));

    let response = app.get("/cart").await;
    assert_eq!(location(&response), Some("/login?redirect=%2Fcart"));
}

// =============================================================================
// JSON API
// =============================================================================

#[tokio::test]
async fn test_api_role_requires_session() {
    let app = TestApp::spawn(FakeBackend::new()).await;

    let response = app.get("/api/role").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_api_role_reports_resolved_role() {
    let app = TestApp::spawn(FakeBackend::new().with_user(ADMIN, "admin")).await;
    app.sign_in(ADMIN).await;

    let response = app.get("/api/role").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["email"], ADMIN);
    assert_eq!(body["role"], "admin");
}

#[tokio::test]
async fn test_api_cart_is_forbidden_for_vendor() {
    let app = TestApp::spawn(FakeBackend::new().with_user(VENDOR, "vendor")).await;
    app.sign_in(VENDOR).await;

    let response = app.get("/api/cart").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
