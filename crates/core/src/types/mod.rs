//! Core types for MarketPulse.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod page;
pub mod price;
pub mod quantity;
pub mod role;
pub mod status;
pub mod trend;

pub use email::{Email, EmailError};
pub use id::*;
pub use page::Page;
pub use price::{CurrencyCode, Price};
pub use quantity::{Quantity, QuantityError};
pub use role::{Role, RoleParseError, RoleSet};
pub use status::{ApprovalStatus, StatusParseError};
pub use trend::{PricePoint, PriceTrend, TrendDirection};
