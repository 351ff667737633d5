//! Vendor dashboard end to end: form validation, ownership checks and
//! product writes reaching the backend.

#![allow(clippy::unwrap_used)]

use market_pulse_integration_tests::{FakeBackend, TestApp, location};
use reqwest::StatusCode;

const VENDOR: &str = "vendor@market.example";
const RIVAL: &str = "rival@market.example";

fn product_form(price: &str, date: &str) -> Vec<(&'static str, String)> {
    vec![
        ("item_name", "Red onion".to_string()),
        ("market_name", "Kawran Bazar".to_string()),
        ("market_description", String::new()),
        ("image", "https://img.example/onion.jpg".to_string()),
        ("price_per_unit", price.to_string()),
        ("date", date.to_string()),
        ("description", String::new()),
    ]
}

async fn vendor_app(backend: FakeBackend) -> TestApp {
    let app = TestApp::spawn(backend.with_user(VENDOR, "vendor")).await;
    app.sign_in(VENDOR).await;
    app
}

#[tokio::test]
async fn test_vendor_sees_only_own_products() {
    let backend = FakeBackend::new()
        .with_product("mine", VENDOR, "2.50")
        .with_product("theirs", RIVAL, "9.00");
    let app = vendor_app(backend).await;

    let page = app.get("/vendor/products").await.text().await.unwrap();

    assert!(page.contains("Product mine"));
    assert!(!page.contains("Product theirs"));
}

#[tokio::test]
async fn test_invalid_product_form_is_rejected_without_backend_call() {
    let app = vendor_app(FakeBackend::new()).await;

    let response = app
        .client
        .post(app.url("/vendor/products"))
        .form(&product_form("free", "yesterday"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let page = response.text().await.unwrap();
    assert!(page.contains("Enter a price such as 42.50."));
    assert!(page.contains("Enter a date as YYYY-MM-DD."));
    assert!(page.contains(r#"value="Red onion""#));
    assert!(app.backend.product_writes().is_empty());
}

#[tokio::test]
async fn test_valid_product_is_submitted_as_pending() {
    let app = vendor_app(FakeBackend::new()).await;

    let response = app
        .client
        .post(app.url("/vendor/products"))
        .form(&product_form("42.50", "2024-05-02"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/vendor/products"));
    assert_eq!(app.backend.product_writes(), vec!["POST".to_string()]);

    let page = app.get("/vendor/products").await.text().await.unwrap();
    assert!(page.contains("Red onion"));
    assert!(page.contains("pending"));
    assert!(page.contains("Product submitted. It will be listed once approved."));
}

#[tokio::test]
async fn test_valid_update_reaches_backend() {
    let app = vendor_app(FakeBackend::new().with_product("mine", VENDOR, "2.50")).await;

    let edit = app.get("/vendor/products/mine/edit").await;
    assert_eq!(edit.status(), StatusCode::OK);
    assert!(edit.text().await.unwrap().contains(r#"value="2.50""#));

    let response = app
        .client
        .post(app.url("/vendor/products/mine"))
        .form(&product_form("3.75", "2024-05-02"))
        .send()
        .await
        .unwrap();

    assert_eq!(location(&response), Some("/vendor/products"));
    assert_eq!(app.backend.product_writes(), vec!["PUT mine".to_string()]);
    assert_eq!(app.backend.product_price("mine").as_deref(), Some("3.75"));
}

#[tokio::test]
async fn test_vendor_cannot_edit_another_vendors_product() {
    let app = vendor_app(FakeBackend::new().with_product("theirs", RIVAL, "9.00")).await;

    let edit = app.get("/vendor/products/theirs/edit").await;
    assert_eq!(location(&edit), Some("/forbidden"));

    let response = app
        .client
        .post(app.url("/vendor/products/theirs"))
        .form(&product_form("0.01", "2024-05-02"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/forbidden"));
    assert!(app.backend.product_writes().is_empty());
    assert_eq!(app.backend.product_price("theirs").as_deref(), Some("9.00"));
}

#[tokio::test]
async fn test_vendor_cannot_delete_another_vendors_product() {
    let app = vendor_app(FakeBackend::new().with_product("theirs", RIVAL, "9.00")).await;

    let response = app
        .client
        .post(app.url("/vendor/products/theirs/delete"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(app.backend.product_writes().is_empty());
}

#[tokio::test]
async fn test_vendor_deletes_own_product() {
    let app = vendor_app(FakeBackend::new().with_product("mine", VENDOR, "2.50")).await;

    let response = app
        .client
        .post(app.url("/vendor/products/mine/delete"))
        .send()
        .await
        .unwrap();

    assert_eq!(location(&response), Some("/vendor/products"));
    assert_eq!(app.backend.product_writes(), vec!["DELETE mine".to_string()]);
}
