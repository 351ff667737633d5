//! In-process stand-in for the MarketPulse backend and Firebase Auth.
//!
//! Only the endpoints the end-to-end tests exercise are served. Counters let
//! tests assert how often the web application called out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
};
use serde::Deserialize;
use serde_json::{Value, json};

/// The only password the fake identity provider accepts.
pub const PASSWORD: &str = "Market-Pulse-2024";

#[derive(Debug, Clone)]
struct Account {
    role: String,
    role_delay: Duration,
}

#[derive(Default)]
struct Inner {
    accounts: Mutex<HashMap<String, Account>>,
    carts: Mutex<HashMap<String, Vec<Value>>>,
    wishlists: Mutex<HashMap<String, Vec<Value>>>,
    products: Mutex<Vec<Value>>,
    product_writes: Mutex<Vec<String>>,
    role_lookups: AtomicUsize,
    quantity_updates: AtomicUsize,
    fail_mutations: AtomicBool,
}

/// Fake backend state, shared between the test and the server task.
#[derive(Clone, Default)]
pub struct FakeBackend {
    inner: Arc<Inner>,
}

impl FakeBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account with `role` (`user`, `vendor` or `admin`).
    #[must_use]
    pub fn with_user(self, email: &str, role: &str) -> Self {
        self.with_slow_user(email, role, Duration::ZERO)
    }

    /// Register an account whose role lookup takes `delay`.
    #[must_use]
    pub fn with_slow_user(self, email: &str, role: &str, delay: Duration) -> Self {
        lock(&self.inner.accounts).insert(
            email.to_string(),
            Account {
                role: role.to_string(),
                role_delay: delay,
            },
        );
        self
    }

    /// Put a line in `email`'s cart.
    #[must_use]
    pub fn with_cart_line(self, email: &str, line: &str, quantity: u32, price: &str) -> Self {
        lock(&self.inner.carts)
            .entry(email.to_string())
            .or_default()
            .push(json!({
                "_id": line,
                "productId": format!("product-{line}"),
                "itemName": format!("Item {line}"),
                "marketName": "Kawran Bazar",
                "pricePerUnit": price,
                "quantity": quantity,
            }));
        self
    }

    /// Put an entry in `email`'s wishlist.
    #[must_use]
    pub fn with_wishlist_item(self, email: &str, item: &str, price: &str) -> Self {
        lock(&self.inner.wishlists)
            .entry(email.to_string())
            .or_default()
            .push(json!({
                "_id": item,
                "productId": format!("product-{item}"),
                "itemName": format!("Saved {item}"),
                "marketName": "Karwan Bazar",
                "pricePerUnit": price,
            }));
        self
    }

    /// List a product `id` owned by `vendor`.
    #[must_use]
    pub fn with_product(self, id: &str, vendor: &str, price: &str) -> Self {
        lock(&self.inner.products).push(json!({
            "_id": id,
            "itemName": format!("Product {id}"),
            "marketName": "Kawran Bazar",
            "vendorEmail": vendor,
            "image": format!("https://img.example/{id}.jpg"),
            "pricePerUnit": price,
            "prices": [{ "date": "2024-05-01", "price": price }],
            "date": "2024-05-01",
            "status": "approved",
        }));
        self
    }

    /// Product writes received, in order, as `POST`, `PUT <id>` or
    /// `DELETE <id>`.
    #[must_use]
    pub fn product_writes(&self) -> Vec<String> {
        lock(&self.inner.product_writes).clone()
    }

    /// Current unit price of product `id`.
    #[must_use]
    pub fn product_price(&self, id: &str) -> Option<String> {
        lock(&self.inner.products)
            .iter()
            .find(|product| product["_id"] == id)
            .and_then(|product| product["pricePerUnit"].as_str().map(str::to_string))
    }

    /// Make every cart and wishlist removal or update answer 500 from now on.
    pub fn fail_mutations(&self) {
        self.inner.fail_mutations.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn role_lookups(&self) -> usize {
        self.inner.role_lookups.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn quantity_updates(&self) -> usize {
        self.inner.quantity_updates.load(Ordering::SeqCst)
    }

    /// Number of lines in `email`'s cart.
    #[must_use]
    pub fn cart_len(&self, email: &str) -> usize {
        lock(&self.inner.carts).get(email).map_or(0, Vec::len)
    }

    /// Number of entries in `email`'s wishlist.
    #[must_use]
    pub fn wishlist_len(&self, email: &str) -> usize {
        lock(&self.inner.wishlists).get(email).map_or(0, Vec::len)
    }

    /// Quantity of `line` as the backend currently stores it.
    #[must_use]
    pub fn cart_quantity(&self, email: &str, line: &str) -> Option<u64> {
        lock(&self.inner.carts)
            .get(email)?
            .iter()
            .find(|entry| entry["_id"] == line)
            .and_then(|entry| entry["quantity"].as_u64())
    }

    /// Router serving the Firebase endpoints at the root and the backend
    /// under `/api`.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/v1/accounts:signInWithPassword", post(sign_in))
            .route("/v1/accounts:signUp", post(sign_up))
            .route("/api/users", get(users).post(create_user))
            .route("/api/users/{email}/role", get(user_role))
            .route("/api/products", get(empty_list).post(create_product))
            .route(
                "/api/products/{id}",
                get(product).put(update_product).delete(delete_product),
            )
            .route("/api/ads", get(empty_list))
            .route("/api/vendors/{email}/products", get(vendor_products))
            .route("/api/vendors/{email}/ads", get(empty_list))
            .route("/api/wishlists/{email}", get(wishlist))
            .route("/api/wishlists/{email}/{item}", delete(remove_wishlist_item))
            .route("/api/carts/{email}", get(cart).post(add_line))
            .route(
                "/api/carts/{email}/{line}",
                patch(set_quantity).delete(remove_line),
            )
            .with_state(self.clone())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn provider_error(code: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": { "code": 400, "message": code } })),
    )
        .into_response()
}

fn account_body(email: &str) -> Value {
    json!({
        "localId": format!("uid-{email}"),
        "email": email,
        "displayName": email.split('@').next().unwrap_or(email),
        "idToken": format!("token-{email}"),
        "refreshToken": format!("refresh-{email}"),
        "expiresIn": "3600",
    })
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("Bearer token-"))
}

/// Email encoded in a fake ID token (`token-<email>`).
fn bearer_email(headers: &HeaderMap) -> &str {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer token-"))
        .unwrap_or_default()
}

#[derive(Deserialize)]
struct PasswordRequest {
    email: String,
    password: String,
}

async fn sign_in(State(backend): State<FakeBackend>, Json(body): Json<PasswordRequest>) -> Response {
    let known = lock(&backend.inner.accounts).contains_key(&body.email);
    if !known || body.password != PASSWORD {
        return provider_error("INVALID_LOGIN_CREDENTIALS");
    }
    Json(account_body(&body.email)).into_response()
}

async fn sign_up(State(backend): State<FakeBackend>, Json(body): Json<PasswordRequest>) -> Response {
    let mut accounts = lock(&backend.inner.accounts);
    if accounts.contains_key(&body.email) {
        return provider_error("EMAIL_EXISTS");
    }
    accounts.insert(
        body.email.clone(),
        Account {
            role: "user".to_string(),
            role_delay: Duration::ZERO,
        },
    );
    Json(account_body(&body.email)).into_response()
}

async fn users(State(backend): State<FakeBackend>) -> Json<Value> {
    let accounts = lock(&backend.inner.accounts);
    Json(
        accounts
            .iter()
            .map(|(email, account)| json!({ "email": email, "role": account.role }))
            .collect(),
    )
}

async fn create_user() -> StatusCode {
    StatusCode::CREATED
}

async fn user_role(
    State(backend): State<FakeBackend>,
    headers: HeaderMap,
    Path(email): Path<String>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    backend.inner.role_lookups.fetch_add(1, Ordering::SeqCst);

    let account = lock(&backend.inner.accounts).get(&email).cloned();
    let Some(account) = account else {
        return (StatusCode::NOT_FOUND, Json(json!({ "message": "user not found" })))
            .into_response();
    };
    tokio::time::sleep(account.role_delay).await;
    Json(json!({ "role": account.role })).into_response()
}

async fn empty_list() -> Json<Value> {
    Json(json!([]))
}

async fn cart(
    State(backend): State<FakeBackend>,
    headers: HeaderMap,
    Path(email): Path<String>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let lines = lock(&backend.inner.carts)
        .get(&email)
        .cloned()
        .unwrap_or_default();
    Json(Value::Array(lines)).into_response()
}

fn mutation_failed() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": "store unavailable" })),
    )
        .into_response()
}

async fn set_quantity(
    State(backend): State<FakeBackend>,
    Path((email, line)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    backend.inner.quantity_updates.fetch_add(1, Ordering::SeqCst);
    if backend.inner.fail_mutations.load(Ordering::SeqCst) {
        return mutation_failed();
    }

    let mut carts = lock(&backend.inner.carts);
    let entry = carts
        .get_mut(&email)
        .and_then(|lines| lines.iter_mut().find(|entry| entry["_id"] == line.as_str()));
    match entry {
        Some(entry) => {
            entry["quantity"] = body["quantity"].clone();
            StatusCode::NO_CONTENT.into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn remove_line(
    State(backend): State<FakeBackend>,
    Path((email, line)): Path<(String, String)>,
) -> Response {
    if backend.inner.fail_mutations.load(Ordering::SeqCst) {
        return mutation_failed();
    }
    if let Some(lines) = lock(&backend.inner.carts).get_mut(&email) {
        lines.retain(|entry| entry["_id"] != line.as_str());
    }
    StatusCode::NO_CONTENT.into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewLine {
    product_id: String,
    quantity: u32,
}

async fn add_line(
    State(backend): State<FakeBackend>,
    Path(email): Path<String>,
    Json(body): Json<NewLine>,
) -> StatusCode {
    let mut carts = lock(&backend.inner.carts);
    let lines = carts.entry(email).or_default();
    match lines
        .iter_mut()
        .find(|entry| entry["productId"] == body.product_id.as_str())
    {
        Some(entry) => {
            let quantity = entry["quantity"].as_u64().unwrap_or(0) + u64::from(body.quantity);
            entry["quantity"] = json!(quantity);
        }
        None => lines.push(json!({
            "_id": format!("line-{}", body.product_id),
            "productId": body.product_id,
            "itemName": "Added item",
            "pricePerUnit": "2.00",
            "quantity": body.quantity,
        })),
    }
    StatusCode::CREATED
}

async fn wishlist(State(backend): State<FakeBackend>, Path(email): Path<String>) -> Json<Value> {
    let items = lock(&backend.inner.wishlists)
        .get(&email)
        .cloned()
        .unwrap_or_default();
    Json(Value::Array(items))
}

async fn remove_wishlist_item(
    State(backend): State<FakeBackend>,
    Path((email, item)): Path<(String, String)>,
) -> Response {
    if backend.inner.fail_mutations.load(Ordering::SeqCst) {
        return mutation_failed();
    }
    if let Some(items) = lock(&backend.inner.wishlists).get_mut(&email) {
        items.retain(|entry| entry["_id"] != item.as_str());
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn product(State(backend): State<FakeBackend>, Path(id): Path<String>) -> Response {
    lock(&backend.inner.products)
        .iter()
        .find(|product| product["_id"] == id.as_str())
        .cloned()
        .map_or_else(
            || (StatusCode::NOT_FOUND, Json(json!({ "message": "product not found" }))).into_response(),
            |product| Json(product).into_response(),
        )
}

async fn vendor_products(State(backend): State<FakeBackend>, Path(email): Path<String>) -> Json<Value> {
    Json(
        lock(&backend.inner.products)
            .iter()
            .filter(|product| product["vendorEmail"] == email.as_str())
            .cloned()
            .collect(),
    )
}

async fn create_product(
    State(backend): State<FakeBackend>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    lock(&backend.inner.product_writes).push("POST".to_string());
    let mut products = lock(&backend.inner.products);
    let mut product = body;
    product["_id"] = json!(format!("created-{}", products.len()));
    product["vendorEmail"] = json!(bearer_email(&headers));
    product["status"] = json!("pending");
    products.push(product);
    StatusCode::CREATED
}

async fn update_product(
    State(backend): State<FakeBackend>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    lock(&backend.inner.product_writes).push(format!("PUT {id}"));
    let mut products = lock(&backend.inner.products);
    match products.iter_mut().find(|product| product["_id"] == id.as_str()) {
        Some(product) => {
            product["pricePerUnit"] = body["pricePerUnit"].clone();
            product["itemName"] = body["itemName"].clone();
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

async fn delete_product(
    State(backend): State<FakeBackend>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    lock(&backend.inner.product_writes).push(format!("DELETE {id}"));
    lock(&backend.inner.products).retain(|product| product["_id"] != id.as_str());
    StatusCode::NO_CONTENT
}
