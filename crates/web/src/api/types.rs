//! Wire types for the MarketPulse backend REST API.
//!
//! The backend speaks camelCase JSON and names document ids `_id`.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use market_pulse_core::{
    AdvertisementId, ApprovalStatus, CartLineId, Email, OrderId, PricePoint, ProductId, Quantity,
    Role, VendorApplicationId, WishlistItemId,
};

// =============================================================================
// Accounts
// =============================================================================

/// Response of the role lookup endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RoleResponse {
    pub role: Role,
}

/// A registered user as the backend knows them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub email: Email,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub photo: Option<String>,
    pub role: Role,
}

/// Registration payload sent after a successful sign-up.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub email: Email,
    pub name: Option<String>,
    pub photo: Option<String>,
}

/// Role change payload (admin only).
#[derive(Debug, Clone, Serialize)]
pub struct RoleUpdate {
    pub role: Role,
}

/// A request from a user to become a vendor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorApplication {
    #[serde(rename = "_id", alias = "id")]
    pub id: VendorApplicationId,
    pub email: Email,
    #[serde(default)]
    pub name: Option<String>,
    pub market_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: ApprovalStatus,
}

/// Vendor application payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorApplicationInput {
    pub email: Email,
    pub name: Option<String>,
    pub market_name: String,
    pub description: String,
}

// =============================================================================
// Catalog
// =============================================================================

/// A market product listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(rename = "_id", alias = "id")]
    pub id: ProductId,
    pub item_name: String,
    pub market_name: String,
    #[serde(default)]
    pub market_description: Option<String>,
    pub vendor_email: Email,
    #[serde(default)]
    pub vendor_name: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    pub price_per_unit: Decimal,
    /// Dated price observations, oldest first (not guaranteed).
    #[serde(default)]
    pub prices: Vec<PricePoint>,
    #[serde(default)]
    pub description: Option<String>,
    /// Market day the listing was last updated for.
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub status: ApprovalStatus,
    /// Admin feedback on rejection.
    #[serde(default)]
    pub feedback: Option<String>,
}

/// Product create/update payload (vendor).
///
/// The backend appends `(date, price_per_unit)` to the price history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInput {
    pub item_name: String,
    pub market_name: String,
    pub market_description: Option<String>,
    pub image: String,
    pub price_per_unit: Decimal,
    pub date: NaiveDate,
    pub description: Option<String>,
}

/// Moderation decision payload (admin).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusUpdate {
    pub status: ApprovalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

/// Sort order for product listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSort {
    Asc,
    Desc,
}

impl PriceSort {
    /// Query-string value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Product listing query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductQuery {
    /// 1-based page number.
    pub page: u32,
    pub limit: u32,
    pub sort: Option<PriceSort>,
    /// `None` lists every status (admin).
    pub status: Option<ApprovalStatus>,
}

impl ProductQuery {
    /// Approved products only, as the public listing shows them.
    #[must_use]
    pub const fn approved(page: u32, limit: u32) -> Self {
        Self {
            page,
            limit,
            sort: None,
            status: Some(ApprovalStatus::Approved),
        }
    }
}

/// An advertisement a vendor wants shown on the home page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Advertisement {
    #[serde(rename = "_id", alias = "id")]
    pub id: AdvertisementId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: Option<String>,
    pub vendor_email: Email,
    #[serde(default)]
    pub status: ApprovalStatus,
}

/// Advertisement payload (vendor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvertisementInput {
    pub title: String,
    pub description: String,
    pub image: String,
}

// =============================================================================
// Commerce
// =============================================================================

/// A cart line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    #[serde(rename = "_id", alias = "id")]
    pub id: CartLineId,
    pub product_id: ProductId,
    pub item_name: String,
    #[serde(default)]
    pub market_name: String,
    #[serde(default)]
    pub image: Option<String>,
    pub price_per_unit: Decimal,
    pub quantity: Quantity,
}

/// Add-to-cart payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCartLine {
    pub product_id: ProductId,
    pub quantity: Quantity,
}

/// Quantity change payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuantityUpdate {
    pub quantity: Quantity,
}

/// A wishlist entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistItem {
    #[serde(rename = "_id", alias = "id")]
    pub id: WishlistItemId,
    pub product_id: ProductId,
    pub item_name: String,
    #[serde(default)]
    pub market_name: String,
    pub price_per_unit: Decimal,
}

/// Add-to-wishlist payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWishlistItem {
    pub product_id: ProductId,
}

/// A line of a placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: ProductId,
    pub item_name: String,
    pub quantity: Quantity,
    pub price_per_unit: Decimal,
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "_id", alias = "id")]
    pub id: OrderId,
    pub email: Email,
    pub lines: Vec<OrderLine>,
    pub total: Decimal,
    pub payment_intent_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Order payload, sent once the payment has been confirmed in the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub email: Email,
    pub lines: Vec<OrderLine>,
    pub total: Decimal,
    pub payment_intent_id: String,
}

/// Payment intent request (amount in minor units).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentRequest {
    pub amount: i64,
    pub currency: &'static str,
}

/// Payment intent created by the backend with the payment gateway.
///
/// Implements `Debug` manually to redact the client secret.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for PaymentIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentIntent")
            .field("id", &self.id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_product_deserializes_backend_shape() {
        let json = r#"{
            "_id": "p1",
            "itemName": "Onion",
            "marketName": "Kawran Bazar",
            "vendorEmail": "vendor@market.example",
            "pricePerUnit": 42.5,
            "prices": [{"date": "2025-03-01", "price": 40}, {"date": "2025-03-02", "price": "42.5"}],
            "status": "approved"
        }"#;
        let product: Product = serde_json::from_str(json).unwrap();
        assert_eq!(product.id, ProductId::new("p1"));
        assert_eq!(product.price_per_unit, Decimal::new(425, 1));
        assert_eq!(product.prices.len(), 2);
        assert_eq!(product.status, ApprovalStatus::Approved);
        assert_eq!(product.feedback, None);
    }

    #[test]
    fn test_cart_line_accepts_plain_id() {
        let json = r#"{"id": "l1", "productId": "p1", "itemName": "Rice",
                       "pricePerUnit": 1.25, "quantity": 2}"#;
        let line: CartLine = serde_json::from_str(json).unwrap();
        assert_eq!(line.id, CartLineId::new("l1"));
        assert_eq!(line.quantity.get(), 2);
    }

    #[test]
    fn test_cart_line_rejects_zero_quantity() {
        let json = r#"{"_id": "l1", "productId": "p1", "itemName": "Rice",
                       "pricePerUnit": 1.25, "quantity": 0}"#;
        assert!(serde_json::from_str::<CartLine>(json).is_err());
    }

    #[test]
    fn test_status_update_omits_empty_feedback() {
        let body = serde_json::to_value(StatusUpdate {
            status: ApprovalStatus::Approved,
            feedback: None,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"status": "approved"}));
    }

    #[test]
    fn test_payment_intent_debug_redacts_secret() {
        let intent = PaymentIntent {
            id: "pi_123".to_string(),
            client_secret: "pi_123_secret_abc".to_string(),
        };
        let debug_output = format!("{intent:?}");
        assert!(debug_output.contains("pi_123"));
        assert!(!debug_output.contains("secret_abc"));
    }
}
