//! Form validation.
//!
//! Every form is validated before any network call. Failures are reported
//! per field and rendered inline next to the offending input.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use url::Url;

use market_pulse_core::{ApprovalStatus, Email};

use crate::api::types::{AdvertisementInput, ProductInput, StatusUpdate};

/// Minimum password length accepted at sign-up.
pub const MIN_PASSWORD_LENGTH: usize = 6;

const MAX_NAME_LENGTH: usize = 120;
const MAX_TEXT_LENGTH: usize = 2_000;

/// Field name to message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<&'static str, String>);

impl FieldErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error for `field`; the first error per field wins.
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_insert_with(|| message.into());
    }

    /// The error for `field`, if any.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `Ok(value)` if no errors were recorded.
    ///
    /// # Errors
    ///
    /// Returns `self` when any field failed.
    pub fn into_result<T>(self, value: impl FnOnce() -> T) -> Result<T, Self> {
        if self.is_empty() { Ok(value()) } else { Err(self) }
    }
}

// =============================================================================
// Forms
// =============================================================================

/// Sign-in form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    /// Where to go after signing in.
    pub redirect: Option<String>,
}

/// Sign-up form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterForm {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub photo_url: String,
    pub password: String,
    pub redirect: Option<String>,
}

/// Product create/update form (vendor).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductForm {
    pub item_name: String,
    pub market_name: String,
    #[serde(default)]
    pub market_description: String,
    pub image: String,
    pub price_per_unit: String,
    pub date: String,
    #[serde(default)]
    pub description: String,
}

/// Advertisement form (vendor).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdForm {
    pub title: String,
    pub description: String,
    pub image: String,
}

/// Become-a-vendor form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VendorApplicationForm {
    pub market_name: String,
    #[serde(default)]
    pub description: String,
}

/// Moderation decision form (admin).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusForm {
    pub status: String,
    #[serde(default)]
    pub feedback: String,
}

/// Validated sign-in details.
#[derive(Debug, Clone)]
pub struct Login {
    pub email: Email,
    pub password: String,
}

/// Validated sign-up details.
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub email: Email,
    pub photo_url: Option<String>,
    pub password: String,
}

// =============================================================================
// Validators
// =============================================================================

impl LoginForm {
    /// # Errors
    ///
    /// Returns the field errors if the form is incomplete.
    pub fn validate(&self) -> Result<Login, FieldErrors> {
        let mut errors = FieldErrors::new();
        let email = parse_email(&mut errors, &self.email);
        if self.password.is_empty() {
            errors.add("password", "Password is required.");
        }
        match email {
            Some(email) if errors.is_empty() => Ok(Login {
                email,
                password: self.password.clone(),
            }),
            _ => Err(errors),
        }
    }
}

impl RegisterForm {
    /// # Errors
    ///
    /// Returns the field errors if the form is incomplete or the password is
    /// too weak.
    pub fn validate(&self) -> Result<Registration, FieldErrors> {
        let mut errors = FieldErrors::new();
        let name = required(&mut errors, "name", &self.name, MAX_NAME_LENGTH);
        let email = parse_email(&mut errors, &self.email);
        let photo_url = optional_url(&mut errors, "photo_url", &self.photo_url);
        check_password(&mut errors, &self.password);

        match email {
            Some(email) if errors.is_empty() => Ok(Registration {
                name,
                email,
                photo_url,
                password: self.password.clone(),
            }),
            _ => Err(errors),
        }
    }
}

impl ProductForm {
    /// # Errors
    ///
    /// Returns the field errors if a required field is missing, the price is
    /// not a positive amount, or the date is not `YYYY-MM-DD`.
    pub fn validate(&self) -> Result<ProductInput, FieldErrors> {
        let mut errors = FieldErrors::new();
        let item_name = required(&mut errors, "item_name", &self.item_name, MAX_NAME_LENGTH);
        let market_name = required(
            &mut errors,
            "market_name",
            &self.market_name,
            MAX_NAME_LENGTH,
        );
        let image = required_url(&mut errors, "image", &self.image);
        let price_per_unit = parse_price(&mut errors, "price_per_unit", &self.price_per_unit);
        let date = parse_date(&mut errors, "date", &self.date);
        let description = optional_text(&mut errors, "description", &self.description);
        let market_description = optional_text(
            &mut errors,
            "market_description",
            &self.market_description,
        );

        match (price_per_unit, date) {
            (Some(price_per_unit), Some(date)) if errors.is_empty() => Ok(ProductInput {
                item_name,
                market_name,
                market_description,
                image,
                price_per_unit,
                date,
                description,
            }),
            _ => Err(errors),
        }
    }

    /// Prefill the form from an existing product.
    #[must_use]
    pub fn from_product(product: &crate::api::types::Product) -> Self {
        Self {
            item_name: product.item_name.clone(),
            market_name: product.market_name.clone(),
            market_description: product.market_description.clone().unwrap_or_default(),
            image: product.image.clone().unwrap_or_default(),
            price_per_unit: product.price_per_unit.to_string(),
            date: product
                .date
                .map(|date| date.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            description: product.description.clone().unwrap_or_default(),
        }
    }
}

impl AdForm {
    /// # Errors
    ///
    /// Returns the field errors if a field is missing.
    pub fn validate(&self) -> Result<AdvertisementInput, FieldErrors> {
        let mut errors = FieldErrors::new();
        let title = required(&mut errors, "title", &self.title, MAX_NAME_LENGTH);
        let description = required(
            &mut errors,
            "description",
            &self.description,
            MAX_TEXT_LENGTH,
        );
        let image = required_url(&mut errors, "image", &self.image);

        errors.into_result(|| AdvertisementInput {
            title,
            description,
            image,
        })
    }
}

impl VendorApplicationForm {
    /// Returns the validated market name and description.
    ///
    /// # Errors
    ///
    /// Returns the field errors if the market name is missing.
    pub fn validate(&self) -> Result<(String, String), FieldErrors> {
        let mut errors = FieldErrors::new();
        let market_name = required(
            &mut errors,
            "market_name",
            &self.market_name,
            MAX_NAME_LENGTH,
        );
        let description =
            optional_text(&mut errors, "description", &self.description).unwrap_or_default();
        errors.into_result(|| (market_name, description))
    }
}

impl StatusForm {
    /// # Errors
    ///
    /// Returns the field errors if the status is unknown, or a rejection has
    /// no feedback.
    pub fn validate(&self) -> Result<StatusUpdate, FieldErrors> {
        let mut errors = FieldErrors::new();
        let status = match ApprovalStatus::from_str(self.status.trim()) {
            Ok(ApprovalStatus::Pending) | Err(_) => {
                errors.add("status", "Choose approve or reject.");
                ApprovalStatus::Pending
            }
            Ok(status) => status,
        };
        let feedback = optional_text(&mut errors, "feedback", &self.feedback);
        if status == ApprovalStatus::Rejected && feedback.is_none() {
            errors.add("feedback", "Tell the vendor why the listing was rejected.");
        }

        errors.into_result(|| StatusUpdate {
            status,
            feedback: feedback.filter(|_| status == ApprovalStatus::Rejected),
        })
    }
}

// =============================================================================
// Field helpers
// =============================================================================

fn parse_email(errors: &mut FieldErrors, raw: &str) -> Option<Email> {
    if raw.trim().is_empty() {
        errors.add("email", "Email is required.");
        return None;
    }
    Email::parse(raw)
        .map_err(|_| errors.add("email", "Please enter a valid email address."))
        .ok()
}

fn required(errors: &mut FieldErrors, field: &'static str, raw: &str, max: usize) -> String {
    let value = raw.trim();
    if value.is_empty() {
        errors.add(field, "This field is required.");
    } else if value.chars().count() > max {
        errors.add(field, format!("Must be at most {max} characters."));
    }
    value.to_string()
}

fn optional_text(errors: &mut FieldErrors, field: &'static str, raw: &str) -> Option<String> {
    let value = raw.trim();
    if value.chars().count() > MAX_TEXT_LENGTH {
        errors.add(field, format!("Must be at most {MAX_TEXT_LENGTH} characters."));
    }
    (!value.is_empty()).then(|| value.to_string())
}

fn is_web_url(value: &str) -> bool {
    Url::parse(value).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

fn required_url(errors: &mut FieldErrors, field: &'static str, raw: &str) -> String {
    let value = raw.trim();
    if value.is_empty() {
        errors.add(field, "An image URL is required.");
    } else if !is_web_url(value) {
        errors.add(field, "Must be an http(s) URL.");
    }
    value.to_string()
}

fn optional_url(errors: &mut FieldErrors, field: &'static str, raw: &str) -> Option<String> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    if !is_web_url(value) {
        errors.add(field, "Must be an http(s) URL.");
    }
    Some(value.to_string())
}

fn parse_price(errors: &mut FieldErrors, field: &'static str, raw: &str) -> Option<Decimal> {
    match Decimal::from_str(raw.trim()) {
        Ok(price) if price > Decimal::ZERO => Some(price),
        Ok(_) => {
            errors.add(field, "Price must be greater than zero.");
            None
        }
        Err(_) => {
            errors.add(field, "Enter a price such as 42.50.");
            None
        }
    }
}

fn parse_date(errors: &mut FieldErrors, field: &'static str, raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| errors.add(field, "Enter a date as YYYY-MM-DD."))
        .ok()
}

/// Password policy: at least [`MIN_PASSWORD_LENGTH`] characters with both an
/// uppercase and a lowercase letter.
fn check_password(errors: &mut FieldErrors, password: &str) {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.add(
            "password",
            format!("Password must be at least {MIN_PASSWORD_LENGTH} characters."),
        );
    } else if !password.chars().any(char::is_uppercase) {
        errors.add("password", "Password must contain an uppercase letter.");
    } else if !password.chars().any(char::is_lowercase) {
        errors.add("password", "Password must contain a lowercase letter.");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn product_form() -> ProductForm {
        ProductForm {
            item_name: "Onion".to_string(),
            market_name: "Kawran Bazar".to_string(),
            market_description: String::new(),
            image: "https://img.example/onion.jpg".to_string(),
            price_per_unit: "42.50".to_string(),
            date: "2025-03-02".to_string(),
            description: "Fresh red onions".to_string(),
        }
    }

    #[test]
    fn test_valid_product() {
        let input = product_form().validate().unwrap();
        assert_eq!(input.price_per_unit, Decimal::new(4250, 2));
        assert_eq!(input.date, NaiveDate::from_ymd_opt(2025, 3, 2).unwrap());
        assert_eq!(input.market_description, None);
    }

    #[test]
    fn test_product_field_errors() {
        let form = ProductForm {
            item_name: "  ".to_string(),
            price_per_unit: "-1".to_string(),
            date: "02/03/2025".to_string(),
            image: "ftp://img.example/onion.jpg".to_string(),
            ..product_form()
        };
        let errors = form.validate().unwrap_err();
        assert!(errors.get("item_name").is_some());
        assert_eq!(
            errors.get("price_per_unit"),
            Some("Price must be greater than zero.")
        );
        assert!(errors.get("date").is_some());
        assert!(errors.get("image").is_some());
        assert!(errors.get("market_name").is_none());
    }

    #[test]
    fn test_password_policy() {
        let form = |password: &str| RegisterForm {
            name: "Rahim".to_string(),
            email: "rahim@market.example".to_string(),
            photo_url: String::new(),
            password: password.to_string(),
            redirect: None,
        };

        assert!(form("Abcdef").validate().is_ok());
        assert!(form("Abc").validate().unwrap_err().get("password").is_some());
        assert_eq!(
            form("abcdefg").validate().unwrap_err().get("password"),
            Some("Password must contain an uppercase letter.")
        );
        assert_eq!(
            form("ABCDEFG").validate().unwrap_err().get("password"),
            Some("Password must contain a lowercase letter.")
        );
    }

    #[test]
    fn test_login_requires_valid_email() {
        let form = LoginForm {
            email: "not-an-email".to_string(),
            password: "x".to_string(),
            redirect: None,
        };
        assert!(form.validate().unwrap_err().get("email").is_some());
    }

    #[test]
    fn test_rejection_requires_feedback() {
        let reject = StatusForm {
            status: "rejected".to_string(),
            feedback: String::new(),
        };
        assert!(reject.validate().unwrap_err().get("feedback").is_some());

        let approve = StatusForm {
            status: "approved".to_string(),
            feedback: "ignored".to_string(),
        };
        let update = approve.validate().unwrap();
        assert_eq!(update.status, ApprovalStatus::Approved);
        assert_eq!(update.feedback, None);
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let form = StatusForm {
            status: "maybe".to_string(),
            feedback: String::new(),
        };
        assert!(form.validate().unwrap_err().get("status").is_some());
    }
}
